//! Fallwatch
//!
//! Client-side companion for a remote fall-detection service.
//!
//! # Architecture
//!
//! The backend runs pose estimation and fall classification. This crate:
//!
//! 1. **Talks to it**: `client::DetectionClient` wraps every HTTP endpoint.
//! 2. **Remembers**: `store::DetectionStore` folds results into a bounded
//!    history, running counters and a latched fall alert.
//! 3. **Reacts**: `alert` sinks play a tone and upload fall frames for
//!    retraining, off the ingest path.
//! 4. **Prepares images**: `imaging` converts, validates and compresses files.
//!
//! # Module Structure
//!
//! - `detect`: wire types for detection results
//! - `store`: detection history and statistics
//! - `alert`: fall side effects (tone, training upload)
//! - `client`: HTTP API wrappers
//! - `imaging`: data URLs, validation, compression
//! - `config`: file + environment configuration

pub mod alert;
pub mod client;
pub mod config;
pub mod detect;
pub mod imaging;
pub mod store;

pub use alert::{FallEvent, FallSink, ToneAlert, TrainingUploader};
pub use client::{ApiError, ApiErrorKind, ClientConfig, DetectionClient};
pub use config::FallwatchConfig;
pub use detect::{BoundingBox, Detection, DetectionResult};
pub use store::{
    AggregateState, DetectionStore, HistoryRecord, IngestSummary, RecordId,
    SharedDetectionStore, StoreSnapshot,
};
