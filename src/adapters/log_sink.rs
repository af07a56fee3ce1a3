//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! Every line starts with a fixed tag so a serial capture can be grepped;
//! the end-of-episode summary is one JSON object.

use log::{info, warn};

use crate::app::events::{AppEvent, EpisodeSummary};
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

/// One-line JSON rendering of an episode summary.
pub fn summary_json(summary: &EpisodeSummary) -> String {
    serde_json::to_string(summary).unwrap_or_else(|_| String::from("{}"))
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { lid_open } => {
                info!("START | lid_open={}", lid_open);
            }
            AppEvent::EpisodeOpened { episode, deadline_ms } => {
                info!("EPISODE | #{} opened, deadline={}ms", episode, deadline_ms);
            }
            AppEvent::FrameDiscarded => {
                info!("SAMPLE | settling frame discarded");
            }
            AppEvent::CaptureFailed(e) => {
                warn!("SAMPLE | capture failed: {}", e);
            }
            AppEvent::ClassifyFailed(e) => {
                warn!("SAMPLE | classify failed: {}", e);
            }
            AppEvent::Classified {
                classification,
                threat,
                consecutive,
            } => {
                info!(
                    "SAMPLE | {} conf={:.2} threat={} run={}",
                    classification.label, classification.confidence, threat, consecutive
                );
            }
            AppEvent::LidSealed { at_ms } => {
                info!("LID | sealed at {}ms", at_ms);
            }
            AppEvent::LidReopened { at_ms } => {
                info!("LID | reopened at {}ms", at_ms);
            }
            AppEvent::ActuationFailed { seal, error } => {
                warn!("LID | {} failed: {}", if *seal { "seal" } else { "open" }, error);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::EpisodeClosed(summary) => {
                info!("EPISODE | {}", summary_json(summary));
            }
            AppEvent::Battery(reading) => {
                info!("POWER | {:.2}% {}mV", reading.percent, reading.millivolts);
            }
        }
    }
}
