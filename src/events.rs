//! Interrupt-driven event queue.
//!
//! Events are produced by GPIO ISRs (PIR rising edge, fuel-gauge alert)
//! and consumed by the PIR sensor driver on the main task, which is the
//! only consumer.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ PIR ISR     │────▶│  Event Queue │────▶│  Main Task   │
//! │ ALRT ISR    │────▶│  (lock-free) │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of pending events.
const EVENT_QUEUE_CAP: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    /// PIR output went high.
    MotionDetected = 0,
    /// MAX17048 pulled its ALRT line low.
    FuelAlert      = 1,
}

impl Event {
    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::MotionDetected),
            1 => Some(Self::FuelAlert),
            _ => None,
        }
    }
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// One producer (ISR context), one consumer (main task).  Slots are
// atomics so neither side needs `unsafe`.  One slot stays empty to tell
// full from empty.

pub struct EventQueue {
    head: AtomicU8,
    tail: AtomicU8,
    slots: [AtomicU8; EVENT_QUEUE_CAP],
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
            slots: [const { AtomicU8::new(0) }; EVENT_QUEUE_CAP],
        }
    }

    /// Safe to call from ISR context.
    /// Returns `false` if the queue is full (event dropped).
    pub fn push(&self, event: Event) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let next = (head + 1) % EVENT_QUEUE_CAP as u8;
        if next == tail {
            return false;
        }
        self.slots[head as usize].store(event as u8, Ordering::Relaxed);
        self.head.store(next, Ordering::Release);
        true
    }

    pub fn pop(&self) -> Option<Event> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let raw = self.slots[tail as usize].load(Ordering::Relaxed);
        self.tail
            .store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);
        Event::from_u8(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Relaxed) == self.head.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed) as usize;
        let tail = self.tail.load(Ordering::Relaxed) as usize;
        (head + EVENT_QUEUE_CAP - tail) % EVENT_QUEUE_CAP
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ── Global queue ──────────────────────────────────────────────

/// The queue the GPIO ISRs feed.
pub static EVENTS: EventQueue = EventQueue::new();

/// Push from an ISR callback.
pub fn push_event(event: Event) -> bool {
    EVENTS.push(event)
}
