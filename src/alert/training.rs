//! Best-effort upload of fall frames for model retraining.

use anyhow::{Context, Result};

use super::{FallEvent, FallSink};
use crate::client::{DetectionClient, TrainingSample};

pub struct TrainingUploader {
    client: DetectionClient,
    url: String,
}

impl TrainingUploader {
    pub fn new(client: DetectionClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Build the upload body, or `None` when the fall came without an image.
pub fn training_sample(event: &FallEvent) -> Option<TrainingSample> {
    let image = event.result_image.clone()?;
    Some(TrainingSample {
        image,
        object_id: event.object_id,
        fall_score: event.fall_score,
        confidence: event.confidence,
        timestamp: event.timestamp.clone(),
        details: event.details.clone(),
    })
}

impl FallSink for TrainingUploader {
    fn name(&self) -> &str {
        "training-upload"
    }

    fn on_fall(&self, event: &FallEvent) -> Result<()> {
        let Some(sample) = training_sample(event) else {
            log::debug!(
                "record {} has no result image; skipping training upload",
                event.record_id
            );
            return Ok(());
        };
        let client = self.client.clone();
        let url = self.url.clone();
        let record_id = event.record_id;
        std::thread::Builder::new()
            .name("training-upload".to_string())
            .spawn(move || match client.save_fall_image(&url, &sample) {
                Ok(response) if response.success => {
                    log::info!("uploaded fall frame for record {} to {}", record_id, url);
                }
                Ok(response) => log::warn!(
                    "training endpoint declined record {}: {}",
                    record_id,
                    response.message.as_deref().unwrap_or("no reason given")
                ),
                Err(err) => log::warn!("training upload for record {} failed: {}", record_id, err),
            })
            .context("spawn training upload thread")?;
        Ok(())
    }
}
