//! Side effects fired when the store records a fall.
//!
//! Sinks are notified synchronously from `DetectionStore::ingest`, so every
//! implementation must hand its real work to a background thread and return
//! immediately. An `Err` from `on_fall` is logged by the store and dropped.

use anyhow::Result;
use serde_json::{Map, Value};

use crate::store::{HistoryRecord, RecordId};

pub mod tone;
pub mod training;

pub use tone::ToneAlert;
pub use training::TrainingUploader;

/// Receiver for fall notifications.
pub trait FallSink: Send {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    fn on_fall(&self, event: &FallEvent) -> Result<()>;
}

/// Owned copy of a fall record, safe to move onto another thread.
#[derive(Clone, Debug, PartialEq)]
pub struct FallEvent {
    pub record_id: RecordId,
    pub object_id: Option<i64>,
    pub fall_score: f64,
    pub confidence: f64,
    pub timestamp: String,
    pub details: Map<String, Value>,
    pub result_image: Option<String>,
}

impl From<&HistoryRecord> for FallEvent {
    fn from(record: &HistoryRecord) -> Self {
        Self {
            record_id: record.id,
            object_id: record.object_id,
            fall_score: record.score,
            confidence: record.confidence,
            timestamp: record.timestamp.clone(),
            details: record.details.clone(),
            result_image: record.result_image.clone(),
        }
    }
}
