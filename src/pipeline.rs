use serde::Serialize;
use tracing::{error, info};

use crate::critical::{evaluate_message, CriticalAlert, ThresholdTable};
use crate::export::{DestinationFormat, ExportedRecord};

/// How much of a failed input to keep for operator triage
const PREVIEW_CHARS: usize = 100;

/// Per-message processing result
#[derive(Debug, Clone, Serialize)]
pub enum Outcome {
    Success {
        message_id: String,
        record: ExportedRecord,
        has_critical: bool,
        critical_count: usize,
        alerts: Vec<CriticalAlert>,
    },
    Error {
        reason: String,
        input_preview: String,
    },
}

/// Running counters over one pipeline's lifetime
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Statistics {
    pub processed: u64,
    pub errored: u64,
    pub critical: u64,
    /// `None` until at least one message has been attempted
    pub success_rate: Option<f64>,
}

/// Sequences tokenize -> build -> evaluate -> export over messages and
/// accumulates processing counters.
///
/// Counter updates are unsynchronized; callers running messages on several
/// workers must wrap the pipeline in their own lock or keep one pipeline
/// per worker.
pub struct Pipeline {
    thresholds: ThresholdTable,
    processed: u64,
    errored: u64,
    critical: u64,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_thresholds(ThresholdTable::default())
    }

    pub fn with_thresholds(thresholds: ThresholdTable) -> Self {
        Self {
            thresholds,
            processed: 0,
            errored: 0,
            critical: 0,
        }
    }

    /// Process one raw message for the given destination
    pub fn process(&mut self, text: &str, destination: DestinationFormat) -> Outcome {
        let mut message = match crate::parse(text) {
            Ok(message) => message,
            Err(e) => {
                self.errored += 1;
                error!("Error processing message: {}", e);
                return Outcome::Error {
                    reason: e.to_string(),
                    input_preview: preview(text),
                };
            }
        };

        let alerts = evaluate_message(&self.thresholds, &mut message);
        let record = crate::export(&message, destination);

        self.processed += 1;
        self.critical += alerts.len() as u64;
        info!("Successfully processed message {}", message.message_id);

        Outcome::Success {
            message_id: message.message_id,
            record,
            has_critical: !alerts.is_empty(),
            critical_count: alerts.len(),
            alerts,
        }
    }

    pub fn statistics(&self) -> Statistics {
        let attempted = self.processed + self.errored;
        Statistics {
            processed: self.processed,
            errored: self.errored,
            critical: self.critical,
            success_rate: (attempted > 0).then(|| self.processed as f64 / attempted as f64),
        }
    }
}

fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().nth(PREVIEW_CHARS).is_some() {
        preview.push_str("...");
    }
    preview
}
