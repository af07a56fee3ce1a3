//! Concrete state handler functions and table builder.
//!
//! Each state is defined by plain `fn` pointers — no closures, no dynamic
//! dispatch, no heap.
//!
//! ```text
//!  IDLE ──[motion]──▶ SAMPLING ──[window elapsed, lid open]──▶ IDLE
//!                        │
//!              [window elapsed, lid sealed]
//!                        ▼
//!                  DEFERRED_REOPEN ──[cool-down over / expose]──▶ IDLE
//! ```

use super::context::{EpisodeContext, LidCommand, SampleOutcome, Verdict};
use super::{StateDescriptor, StateId};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0 — Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 1 — Sampling
        StateDescriptor {
            id: StateId::Sampling,
            name: "Sampling",
            on_enter: Some(sampling_enter),
            on_exit: None,
            on_update: sampling_update,
        },
        // Index 2 — DeferredReopen
        StateDescriptor {
            id: StateId::DeferredReopen,
            name: "DeferredReopen",
            on_enter: Some(reopen_enter),
            on_exit: None,
            on_update: reopen_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE state
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut EpisodeContext) {
    // A pending expose command from DeferredReopen must survive this.
    ctx.delay_ms = 0;
    ctx.sample = SampleOutcome::None;
}

/// Episodes are opened from outside by a motion trigger.
fn idle_update(_ctx: &mut EpisodeContext) -> Option<StateId> {
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SAMPLING state
// ═══════════════════════════════════════════════════════════════════════════

fn sampling_enter(ctx: &mut EpisodeContext) {
    ctx.deadline_ms = ctx.now_ms + u64::from(ctx.config.window_ms);
    ctx.counter.reset();
    ctx.lid_closed = false;
    ctx.discard_first = true;
    ctx.command = None;
    ctx.verdict = None;
    ctx.delay_ms = 0;
}

fn sampling_update(ctx: &mut EpisodeContext) -> Option<StateId> {
    ctx.verdict = None;
    if ctx.window_elapsed() {
        return Some(if ctx.lid_closed {
            StateId::DeferredReopen
        } else {
            StateId::Idle
        });
    }

    let cfg = &ctx.config;
    ctx.delay_ms = match ctx.sample {
        SampleOutcome::None => 0,
        // Failures are not evidence of absence: the counter stays put.
        SampleOutcome::CaptureFailed => cfg.capture_backoff_ms,
        SampleOutcome::ClassifyFailed => cfg.classify_backoff_ms,
        SampleOutcome::Settling => cfg.settle_delay_ms,
        SampleOutcome::Classified(classification) => {
            let threat = cfg.is_threat(classification.label, classification.confidence);
            let consecutive = ctx.counter.record(threat);
            if threat && consecutive >= cfg.consecutive_needed && !ctx.lid_closed {
                ctx.command = Some(LidCommand::Seal);
            }
            ctx.verdict = Some(Verdict {
                classification,
                threat,
                consecutive,
            });
            cfg.sample_interval_ms
        }
    };
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  DEFERRED_REOPEN state
// ═══════════════════════════════════════════════════════════════════════════

fn reopen_enter(ctx: &mut EpisodeContext) {
    ctx.reopen_at_ms = ctx.now_ms + u64::from(ctx.config.reopen_cooldown_ms);
    ctx.delay_ms = ctx.config.reopen_cooldown_ms;
}

fn reopen_update(ctx: &mut EpisodeContext) -> Option<StateId> {
    if ctx.now_ms < ctx.reopen_at_ms {
        ctx.delay_ms = (ctx.reopen_at_ms - ctx.now_ms) as u32;
        return None;
    }
    ctx.command = Some(LidCommand::Expose);
    Some(StateId::Idle)
}
