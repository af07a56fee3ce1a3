//! Mock hardware for integration tests.
//!
//! Records every lid command and frame hand-off so tests can assert on the
//! full history against a virtual clock, without touching real GPIO, LEDC
//! or camera registers.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use image::{ImageFormat, Rgb, RgbImage};
use lidguard::app::events::AppEvent;
use lidguard::app::ports::{ClockPort, EventSink, FramePort, LidPort, MotionPort, MotionWait};
use lidguard::drivers::fram::FRAM_CAPACITY;
use lidguard::error::{ActuatorError, CaptureError};
use lidguard::frame::{CapturedFrame, FrameView};
use lidguard::pins;

// ── Test images ───────────────────────────────────────────────

/// Encode a single-colour JPEG, the way the camera delivers frames.
pub fn solid_jpeg(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

// ── Lid call record ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LidCall {
    Seal { at_ms: u64, ok: bool },
    Expose { at_ms: u64, ok: bool },
}

// ── MockFrame ─────────────────────────────────────────────────

pub struct MockFrame {
    data: Vec<u8>,
    width: u16,
    height: u16,
}

impl CapturedFrame for MockFrame {
    fn view(&self) -> FrameView<'_> {
        FrameView::jpeg(&self.data, self.width, self.height)
    }
}

// ── MockHardware ──────────────────────────────────────────────

/// Virtual clock, scripted camera, recording lid and a trigger counter.
pub struct MockHardware {
    pub now: u64,
    pub frames: VecDeque<Result<Vec<u8>, CaptureError>>,
    /// Returned once `frames` runs dry.
    pub steady: Vec<u8>,
    pub frame_size: (u16, u16),
    pub lid: Vec<LidCall>,
    /// Number of upcoming seal commands that fail.
    pub failing_seals: u32,
    pub failing_exposes: u32,
    pub acquired: u32,
    pub released: u32,
    pub outstanding: u32,
    pub max_outstanding: u32,
    pub pending_triggers: usize,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new(steady: Vec<u8>) -> Self {
        Self {
            now: 0,
            frames: VecDeque::new(),
            steady,
            frame_size: (160, 120),
            lid: Vec::new(),
            failing_seals: 0,
            failing_exposes: 0,
            acquired: 0,
            released: 0,
            outstanding: 0,
            max_outstanding: 0,
            pending_triggers: 0,
        }
    }

    pub fn seals(&self) -> Vec<u64> {
        self.lid
            .iter()
            .filter_map(|c| match c {
                LidCall::Seal { at_ms, ok: true } => Some(*at_ms),
                _ => None,
            })
            .collect()
    }

    pub fn exposes(&self) -> Vec<u64> {
        self.lid
            .iter()
            .filter_map(|c| match c {
                LidCall::Expose { at_ms, ok: true } => Some(*at_ms),
                _ => None,
            })
            .collect()
    }
}

impl FramePort for MockHardware {
    type Frame = MockFrame;

    fn acquire(&mut self) -> Result<MockFrame, CaptureError> {
        let data = match self.frames.pop_front() {
            Some(next) => next?,
            None => self.steady.clone(),
        };
        self.acquired += 1;
        self.outstanding += 1;
        self.max_outstanding = self.max_outstanding.max(self.outstanding);
        Ok(MockFrame {
            data,
            width: self.frame_size.0,
            height: self.frame_size.1,
        })
    }

    fn release(&mut self, _frame: MockFrame) {
        self.released += 1;
        self.outstanding -= 1;
    }
}

impl LidPort for MockHardware {
    fn actuate(&mut self, seal: bool) -> Result<(), ActuatorError> {
        let failing = if seal { &mut self.failing_seals } else { &mut self.failing_exposes };
        let ok = *failing == 0;
        *failing = failing.saturating_sub(1);
        let at_ms = self.now;
        self.lid.push(if seal { LidCall::Seal { at_ms, ok } } else { LidCall::Expose { at_ms, ok } });
        if ok { Ok(()) } else { Err(ActuatorError::PwmWriteFailed(-1)) }
    }
}

impl ClockPort for MockHardware {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn sleep_ms(&mut self, ms: u32) {
        self.now += u64::from(ms);
    }
}

impl MotionPort for MockHardware {
    fn wait_for_motion(&mut self, _timeout_ms: Option<u32>) -> MotionWait {
        MotionWait::Detected
    }

    fn discard_pending(&mut self) -> usize {
        std::mem::take(&mut self.pending_triggers)
    }
}

// ── RecordingSink ─────────────────────────────────────────────

/// Event sink that records all emitted events for later assertion.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── FakeBus ───────────────────────────────────────────────────

/// In-memory I²C bus carrying the FRAM and the fuel gauge.
pub struct FakeBus {
    pub fram: Vec<u8>,
    pub gauge: HashMap<u8, u16>,
    pub gauge_present: bool,
    /// Fail every FRAM access with a bus error.
    pub fram_broken: bool,
}

#[allow(dead_code)]
impl FakeBus {
    /// Factory-fresh FRAM reads all zeroes.
    pub fn new() -> Self {
        let gauge = HashMap::from([(0x02, 0xD000), (0x04, 0x5480), (0x08, 0x0012)]);
        Self {
            fram: vec![0; FRAM_CAPACITY],
            gauge,
            gauge_present: true,
            fram_broken: false,
        }
    }
}

impl ErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c for FakeBus {
    fn transaction(&mut self, address: u8, ops: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
        let nack = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);
        match address {
            pins::FRAM_ADDR if self.fram_broken => Err(ErrorKind::Bus),
            pins::FRAM_ADDR => {
                let mut cursor: Option<usize> = None;
                for op in ops {
                    match op {
                        Operation::Write(bytes) => {
                            let data = match cursor {
                                None => {
                                    cursor = Some(usize::from(u16::from_be_bytes([bytes[0], bytes[1]])));
                                    &bytes[2..]
                                }
                                Some(_) => &bytes[..],
                            };
                            let at = cursor.unwrap_or(0);
                            self.fram[at..at + data.len()].copy_from_slice(data);
                            cursor = Some(at + data.len());
                        }
                        Operation::Read(buf) => {
                            let at = cursor.ok_or(ErrorKind::Other)?;
                            buf.copy_from_slice(&self.fram[at..at + buf.len()]);
                        }
                    }
                }
                Ok(())
            }
            pins::FUEL_GAUGE_ADDR if self.gauge_present => {
                let mut reg = 0u8;
                for op in ops {
                    match op {
                        Operation::Write(bytes) => {
                            reg = bytes[0];
                            if bytes.len() == 3 {
                                self.gauge.insert(reg, u16::from_be_bytes([bytes[1], bytes[2]]));
                            }
                        }
                        Operation::Read(buf) => {
                            let value = self.gauge.get(&reg).copied().unwrap_or(0);
                            buf.copy_from_slice(&value.to_be_bytes()[..buf.len()]);
                        }
                    }
                }
                Ok(())
            }
            _ => Err(nack),
        }
    }
}
