//! Detection history and running statistics.
//!
//! `DetectionStore` folds a stream of [`DetectionResult`]s into an
//! [`AggregateState`]: a bounded newest-first history, per-call and running
//! counters, and a latched fall alert. The state changes only through
//! `ingest`, `acknowledge_alert` and `reset`.
//!
//! `total_detection_count` is a running sum of every call's detected count.
//! The running maximum lives separately in `max_detected_people`.

use chrono::Timelike;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::alert::{FallEvent, FallSink};
use crate::detect::{BoundingBox, DetectionResult};

pub const DEFAULT_HISTORY_CAP: usize = 100;
pub const DEFAULT_RECENT_WINDOW: usize = 20;

/// Store-local record identifier. Never reused by the same store, even across `reset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One detection as remembered by the store.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub id: RecordId,
    pub object_id: Option<i64>,
    pub is_fall: bool,
    pub score: f64,
    pub confidence: f64,
    pub bbox: Option<BoundingBox>,
    pub details: Map<String, Value>,
    /// Local wall-clock time of ingestion, `HH:MM:SS`.
    pub timestamp: String,
    #[serde(skip)]
    pub result_image: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateState {
    pub history: VecDeque<HistoryRecord>,
    pub current_fall_detected: bool,
    pub total_detection_count: u64,
    pub total_fall_count: u64,
    pub current_detection_count: u32,
    pub max_detected_people: u32,
    pub show_fall_alert: bool,
}

/// What a single `ingest` call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub records_added: usize,
    pub falls: usize,
}

/// Counters plus the recent window, for printing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoreSnapshot {
    pub current_fall_detected: bool,
    pub total_detection_count: u64,
    pub total_fall_count: u64,
    pub current_detection_count: u32,
    pub max_detected_people: u32,
    pub show_fall_alert: bool,
    pub history_len: usize,
    pub recent: Vec<HistoryRecord>,
}

pub struct DetectionStore {
    state: AggregateState,
    history_cap: usize,
    recent_window: usize,
    next_record_id: u64,
    sinks: Vec<Box<dyn FallSink>>,
}

impl Default for DetectionStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP, DEFAULT_RECENT_WINDOW)
    }
}

impl DetectionStore {
    /// A zero cap is treated as a cap of one.
    pub fn new(history_cap: usize, recent_window: usize) -> Self {
        Self {
            state: AggregateState::default(),
            history_cap: history_cap.max(1),
            recent_window,
            next_record_id: 1,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: impl FallSink + 'static) -> Self {
        self.add_sink(Box::new(sink));
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn FallSink>) {
        log::debug!("fall sink '{}' registered", sink.name());
        self.sinks.push(sink);
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    /// Fold one backend result into the state. Never fails: absent fields
    /// were already defaulted at decode time and sink errors are logged.
    pub fn ingest(&mut self, result: &DetectionResult) -> IngestSummary {
        let timestamp = format_timestamp(&chrono::Local::now());
        let detected = result.detected_count();

        self.state.current_fall_detected = result.fall_detected;
        self.state.current_detection_count = detected;
        self.state.max_detected_people = self.state.max_detected_people.max(detected);
        self.state.total_detection_count += u64::from(detected);

        let mut summary = IngestSummary::default();
        for detection in &result.detections {
            let record = HistoryRecord {
                id: self.next_id(),
                object_id: detection.id,
                is_fall: detection.is_fall,
                score: detection.fall_score,
                confidence: detection.confidence,
                bbox: detection.bbox,
                details: detection.details.clone(),
                timestamp: timestamp.clone(),
                result_image: result.result_image.clone(),
            };
            if record.is_fall {
                self.state.total_fall_count += 1;
                self.state.show_fall_alert = true;
                summary.falls += 1;
                self.notify_fall(&record);
            }
            self.state.history.push_front(record);
            summary.records_added += 1;
        }
        self.state.history.truncate(self.history_cap);

        if summary.falls > 0 {
            log::info!(
                "fall detected: {} of {} people (total falls {})",
                summary.falls,
                detected,
                self.state.total_fall_count
            );
        }
        summary
    }

    /// Clear the alert latch. Counters and history are untouched.
    pub fn acknowledge_alert(&mut self) {
        self.state.show_fall_alert = false;
    }

    /// Back to the empty initial state. Record ids keep counting.
    pub fn reset(&mut self) {
        self.state = AggregateState::default();
        log::info!("detection statistics reset");
    }

    /// The newest `recent_window` records, newest first.
    pub fn recent_history(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.state.history.iter().take(self.recent_window)
    }

    pub fn history(&self) -> &VecDeque<HistoryRecord> {
        &self.state.history
    }

    pub fn state(&self) -> &AggregateState {
        &self.state
    }

    pub fn current_fall_detected(&self) -> bool {
        self.state.current_fall_detected
    }

    pub fn total_detection_count(&self) -> u64 {
        self.state.total_detection_count
    }

    pub fn total_fall_count(&self) -> u64 {
        self.state.total_fall_count
    }

    pub fn current_detection_count(&self) -> u32 {
        self.state.current_detection_count
    }

    pub fn max_detected_people(&self) -> u32 {
        self.state.max_detected_people
    }

    pub fn show_fall_alert(&self) -> bool {
        self.state.show_fall_alert
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            current_fall_detected: self.state.current_fall_detected,
            total_detection_count: self.state.total_detection_count,
            total_fall_count: self.state.total_fall_count,
            current_detection_count: self.state.current_detection_count,
            max_detected_people: self.state.max_detected_people,
            show_fall_alert: self.state.show_fall_alert,
            history_len: self.state.history.len(),
            recent: self.recent_history().cloned().collect(),
        }
    }

    fn next_id(&mut self) -> RecordId {
        let id = RecordId(self.next_record_id);
        self.next_record_id += 1;
        id
    }

    fn notify_fall(&self, record: &HistoryRecord) {
        if self.sinks.is_empty() {
            return;
        }
        let event = FallEvent::from(record);
        for sink in &self.sinks {
            if let Err(err) = sink.on_fall(&event) {
                log::warn!("fall sink '{}' failed for {}: {:#}", sink.name(), record.id, err);
            }
        }
    }
}

/// `DetectionStore` behind a single mutex, for hosts that ingest from one
/// thread and read or reset from another. Every operation holds the lock for
/// its full duration, so readers never see a half-applied ingest or reset.
#[derive(Clone)]
pub struct SharedDetectionStore {
    inner: Arc<Mutex<DetectionStore>>,
}

impl SharedDetectionStore {
    pub fn new(store: DetectionStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn ingest(&self, result: &DetectionResult) -> IngestSummary {
        self.lock().ingest(result)
    }

    pub fn acknowledge_alert(&self) {
        self.lock().acknowledge_alert();
    }

    pub fn reset(&self) {
        self.lock().reset();
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.lock().snapshot()
    }

    /// Run `f` against the store while holding the lock.
    pub fn read<R>(&self, f: impl FnOnce(&DetectionStore) -> R) -> R {
        f(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, DetectionStore> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `HH:MM:SS`, zero padded.
pub fn format_timestamp<T: Timelike>(time: &T) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        time.hour(),
        time.minute(),
        time.second()
    )
}
