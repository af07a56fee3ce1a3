//! Detection service — the hexagonal core.
//!
//! [`DetectionService`] owns the episode FSM and its context.  All I/O
//! flows through port traits injected at call sites, making the whole
//! episode protocol testable with mock adapters and a virtual clock.
//!
//! ```text
//!  FramePort ──▶ ┌────────────────────────┐ ──▶ EventSink
//! MotionPort ──▶ │   DetectionService      │
//!  ClockPort ──▶ │  FSM · hysteresis       │ ──▶ LidPort
//! Classifier ──▶ └────────────────────────┘
//! ```

use log::{info, warn};

use crate::config::SystemConfig;
use crate::frame::CapturedFrame;
use crate::fsm::context::{EpisodeContext, LidCommand, SampleOutcome};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};

use super::events::{AppEvent, EpisodeSummary};
use super::ports::{ClassifierPort, ClockPort, EventSink, FramePort, LidPort, MotionPort};

// ───────────────────────────────────────────────────────────────
// DetectionService
// ───────────────────────────────────────────────────────────────

pub struct DetectionService {
    fsm: Fsm,
    ctx: EpisodeContext,
    episodes: u32,
    /// A reopen failed (or the boot open did); expose again before the
    /// next episode samples.
    reopen_pending: bool,
}

impl DetectionService {
    /// Construct the service from configuration.
    ///
    /// Does **not** touch hardware — call [`start`](Self::start) next.
    pub fn new(config: SystemConfig) -> Self {
        let mut ctx = EpisodeContext::new(config);
        let mut fsm = Fsm::new(build_state_table(), StateId::Idle);
        fsm.start(&mut ctx);
        Self {
            fsm,
            ctx,
            episodes: 0,
            reopen_pending: false,
        }
    }

    pub fn config(&self) -> &SystemConfig {
        &self.ctx.config
    }

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn reopen_pending(&self) -> bool {
        self.reopen_pending
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Open the lid at boot. A failure is reported and remembered so the
    /// next episode retries it.
    pub fn start(&mut self, lid: &mut impl LidPort, sink: &mut impl EventSink) -> bool {
        let lid_open = match lid.actuate(false) {
            Ok(()) => true,
            Err(error) => {
                warn!("boot lid open failed: {}", error);
                sink.emit(&AppEvent::ActuationFailed { seal: false, error });
                self.reopen_pending = true;
                false
            }
        };
        sink.emit(&AppEvent::Started { lid_open });
        info!("DetectionService started (lid_open={})", lid_open);
        lid_open
    }

    // ── Episode ───────────────────────────────────────────────

    /// Run one complete episode: sampling window, optional seal, optional
    /// deferred reopen.  Returns when the FSM is back in Idle.
    ///
    /// `hw` satisfies every hardware port at once, which avoids a double
    /// mutable borrow while keeping the port boundary explicit.
    pub fn run_episode<H>(
        &mut self,
        hw: &mut H,
        classifier: &mut impl ClassifierPort,
        sink: &mut impl EventSink,
    ) -> EpisodeSummary
    where
        H: FramePort + LidPort + ClockPort + MotionPort,
    {
        self.episodes = self.episodes.wrapping_add(1);
        let mut summary = EpisodeSummary {
            episode: self.episodes,
            started_ms: hw.now_ms(),
            ..EpisodeSummary::default()
        };

        if self.reopen_pending {
            self.retry_reopen(hw, sink);
        }

        self.ctx.now_ms = hw.now_ms();
        self.transition(StateId::Sampling, sink);
        sink.emit(&AppEvent::EpisodeOpened {
            episode: self.episodes,
            deadline_ms: self.ctx.deadline_ms,
        });

        loop {
            self.ctx.now_ms = hw.now_ms();
            self.ctx.sample = if self.fsm.current_state() == StateId::Sampling && !self.ctx.window_elapsed() {
                self.take_sample(hw, classifier, sink, &mut summary)
            } else {
                SampleOutcome::None
            };

            let before = self.fsm.current_state();
            self.fsm.tick(&mut self.ctx);
            self.emit_verdict(sink, &mut summary);
            self.apply_command(hw, sink, &mut summary);

            let after = self.fsm.current_state();
            if after != before {
                sink.emit(&AppEvent::StateChanged {
                    from: before,
                    to: after,
                });
            }
            if after == StateId::Idle {
                break;
            }
            if self.ctx.delay_ms > 0 {
                hw.sleep_ms(self.ctx.delay_ms);
            }
        }

        summary.ignored_triggers = hw.discard_pending() as u32;
        summary.ended_ms = hw.now_ms();
        sink.emit(&AppEvent::EpisodeClosed(summary.clone()));
        summary
    }

    // ── Internal ──────────────────────────────────────────────

    fn transition(&mut self, to: StateId, sink: &mut impl EventSink) {
        let from = self.fsm.current_state();
        self.fsm.force_transition(to, &mut self.ctx);
        if from != to {
            sink.emit(&AppEvent::StateChanged { from, to });
        }
    }

    /// Acquire, classify and release one frame.  The frame never outlives
    /// this call.
    fn take_sample<H>(
        &mut self,
        hw: &mut H,
        classifier: &mut impl ClassifierPort,
        sink: &mut impl EventSink,
        summary: &mut EpisodeSummary,
    ) -> SampleOutcome
    where
        H: FramePort,
    {
        let frame = match hw.acquire() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("frame capture failed: {}", e);
                summary.capture_failures += 1;
                sink.emit(&AppEvent::CaptureFailed(e));
                return SampleOutcome::CaptureFailed;
            }
        };
        summary.frames_acquired += 1;

        if self.ctx.discard_first {
            self.ctx.discard_first = false;
            hw.release(frame);
            summary.frames_released += 1;
            sink.emit(&AppEvent::FrameDiscarded);
            return SampleOutcome::Settling;
        }

        let result = classifier.classify(&frame.view());
        hw.release(frame);
        summary.frames_released += 1;

        match result {
            Ok(classification) => {
                summary.frames_classified += 1;
                SampleOutcome::Classified(classification)
            }
            Err(e) => {
                warn!("classification failed: {}", e);
                summary.classify_failures += 1;
                sink.emit(&AppEvent::ClassifyFailed(e));
                SampleOutcome::ClassifyFailed
            }
        }
    }

    fn emit_verdict(&mut self, sink: &mut impl EventSink, summary: &mut EpisodeSummary) {
        if let Some(v) = self.ctx.verdict.take() {
            if v.threat {
                summary.threat_samples += 1;
            }
            summary.max_consecutive = summary.max_consecutive.max(v.consecutive);
            sink.emit(&AppEvent::Classified {
                classification: v.classification,
                threat: v.threat,
                consecutive: v.consecutive,
            });
        }
    }

    fn apply_command(&mut self, hw: &mut (impl LidPort + ClockPort), sink: &mut impl EventSink, summary: &mut EpisodeSummary) {
        let Some(command) = self.ctx.command.take() else {
            return;
        };
        let seal = command == LidCommand::Seal;
        if seal {
            summary.seal_attempts += 1;
        }
        match hw.actuate(seal) {
            Ok(()) if seal => {
                self.ctx.lid_closed = true;
                summary.sealed_at_ms = Some(self.ctx.now_ms);
                info!("lid sealed at {} ms", self.ctx.now_ms);
                sink.emit(&AppEvent::LidSealed { at_ms: self.ctx.now_ms });
            }
            Ok(()) => {
                self.ctx.lid_closed = false;
                summary.reopened_at_ms = Some(self.ctx.now_ms);
                info!("lid reopened at {} ms", self.ctx.now_ms);
                sink.emit(&AppEvent::LidReopened { at_ms: self.ctx.now_ms });
            }
            Err(error) => {
                warn!("lid {} failed: {}", if seal { "seal" } else { "reopen" }, error);
                if !seal {
                    summary.reopen_failed = true;
                    self.reopen_pending = true;
                }
                sink.emit(&AppEvent::ActuationFailed { seal, error });
            }
        }
    }

    fn retry_reopen(&mut self, hw: &mut (impl LidPort + ClockPort), sink: &mut impl EventSink) {
        match hw.actuate(false) {
            Ok(()) => {
                self.reopen_pending = false;
                let at_ms = hw.now_ms();
                info!("pending reopen completed at {} ms", at_ms);
                sink.emit(&AppEvent::LidReopened { at_ms });
            }
            Err(error) => {
                warn!("pending reopen failed again: {}", error);
                sink.emit(&AppEvent::ActuationFailed { seal: false, error });
            }
        }
    }
}
