//! fallwatch - command-line front end for the fall-detection backend.
//!
//! This tool:
//! 1. Reports backend health, host status and detector configuration
//! 2. Submits a still image, or a directory of video frames, for detection
//! 3. Keeps detection history and statistics for the session
//! 4. Sounds an alert, and optionally uploads the frame, when a fall is seen

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fallwatch::imaging::{self, DEFAULT_ALLOWED_TYPES};
use fallwatch::{
    ApiError, ApiErrorKind, DetectionClient, DetectionStore, FallwatchConfig, ToneAlert,
    TrainingUploader,
};

/// Give detached alert threads time to finish before a one-shot command exits.
const ALERT_EXIT_GRACE: Duration = Duration::from_secs(2);
const MAX_CONSECUTIVE_UNREACHABLE: u32 = 5;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fall-detection client and alerting console")]
struct Args {
    /// Backend API base URL. Overrides FALLWATCH_API_URL and the config file.
    #[arg(long)]
    api_url: Option<String>,

    /// Do not play the alert tone on falls.
    #[arg(long, env = "FALLWATCH_NO_ALERT")]
    no_alert: bool,

    /// Print results as JSON instead of text.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Backend liveness and model info.
    Health,
    /// Backend host CPU, memory and disk usage.
    Status,
    /// Detector configuration reported by the backend.
    Config,
    /// Run detection on one image.
    Detect {
        image: PathBuf,

        /// Write the annotated result image here.
        #[arg(long)]
        save_result: Option<PathBuf>,

        /// Send the file as-is instead of resizing and re-encoding it.
        #[arg(long)]
        raw: bool,
    },
    /// Feed a directory of frames to the video endpoint, in file name order.
    Watch {
        dir: PathBuf,

        /// Delay between frames in milliseconds.
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,

        /// Start over at the first frame after the last one.
        #[arg(long = "loop")]
        repeat: bool,
    },
    /// Clear the backend's pose history for one object, or for all.
    Reset {
        #[arg(long)]
        object_id: Option<i64>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Args {
        api_url,
        no_alert,
        json,
        command,
    } = Args::parse();

    let mut config = FallwatchConfig::load()?;
    if let Some(url) = api_url {
        config.api_base_url = url;
    }
    if no_alert {
        config.alert.enabled = false;
    }
    let client = DetectionClient::new(config.client_config())?;
    log::debug!("using detection backend at {}", client.base_url());

    match command {
        Command::Health => {
            let health = client.health()?;
            if !health.is_ok() {
                log::warn!("backend reports status '{}'", health.status);
            }
            print_json(&health)
        }
        Command::Status => print_json(&client.system_status()?),
        Command::Config => print_json(&client.detector_config()?),
        Command::Reset { object_id } => {
            let response = client.reset_detector(object_id)?;
            if !response.success {
                bail!(
                    "backend refused reset: {}",
                    response.message.as_deref().unwrap_or("no reason given")
                );
            }
            match object_id {
                Some(id) => log::info!("detector history cleared for object {}", id),
                None => log::info!("detector history cleared for all objects"),
            }
            Ok(())
        }
        Command::Detect {
            image,
            save_result,
            raw,
        } => {
            let mut store = build_store(&config, &client);
            let payload = if raw {
                check_upload(&image, &config)?;
                imaging::file_to_data_url(&image)?
            } else {
                prepare_upload(&image, &config)?
            };
            let result = client.detect_image(&payload)?;
            let summary = store.ingest(&result);
            if let Some(path) = save_result {
                match result.result_image.as_deref() {
                    Some(annotated) => {
                        imaging::save_data_url(annotated, &path)?;
                        log::info!("annotated image written to {}", path.display());
                    }
                    None => log::warn!("backend returned no annotated image"),
                }
            }
            report(&store, json)?;
            if summary.falls > 0 {
                std::thread::sleep(ALERT_EXIT_GRACE);
            }
            Ok(())
        }
        Command::Watch {
            dir,
            interval_ms,
            repeat,
        } => {
            let mut store = build_store(&config, &client);
            run_watch(
                &client,
                &config,
                &mut store,
                &dir,
                Duration::from_millis(interval_ms),
                repeat,
            )?;
            report(&store, json)
        }
    }
}

fn build_store(config: &FallwatchConfig, client: &DetectionClient) -> DetectionStore {
    let mut store = DetectionStore::new(config.history_cap, config.recent_window);
    if config.alert.enabled {
        store.add_sink(Box::new(ToneAlert::new(config.alert.player.as_deref())));
    }
    if let Some(url) = &config.training_upload_url {
        store.add_sink(Box::new(TrainingUploader::new(client.clone(), url.clone())));
        log::info!("fall frames will be uploaded to {}", url);
    }
    store
}

/// Type and size checks shared by every upload path.
fn check_upload(path: &Path, config: &FallwatchConfig) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mime = imaging::mime_type(&bytes, path).unwrap_or("");
    if !imaging::validate_file_type(mime, DEFAULT_ALLOWED_TYPES) {
        bail!(
            "{} is not a supported image (expected one of {})",
            path.display(),
            DEFAULT_ALLOWED_TYPES.join(", ")
        );
    }
    let size = bytes.len() as u64;
    if !imaging::validate_file_size(size, config.imaging.max_upload_bytes) {
        bail!(
            "{} is {}; uploads must be non-empty and at most {}",
            path.display(),
            imaging::format_file_size(size),
            imaging::format_file_size(config.imaging.max_upload_bytes)
        );
    }
    Ok(bytes)
}

fn prepare_upload(path: &Path, config: &FallwatchConfig) -> Result<String> {
    let bytes = check_upload(path, config)?;
    let data_url = imaging::compress_image(&bytes, config.imaging.compress)
        .with_context(|| format!("compress {}", path.display()))?;
    log::debug!(
        "prepared {} ({} -> {} encoded)",
        path.display(),
        imaging::format_file_size(bytes.len() as u64),
        imaging::format_file_size(data_url.len() as u64)
    );
    Ok(data_url)
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        let supported = imaging::mime_from_extension(&path)
            .map(|mime| imaging::validate_file_type(mime, DEFAULT_ALLOWED_TYPES))
            .unwrap_or(false);
        if path.is_file() && supported {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

fn run_watch(
    client: &DetectionClient,
    config: &FallwatchConfig,
    store: &mut DetectionStore,
    dir: &Path,
    interval: Duration,
    repeat: bool,
) -> Result<()> {
    let frames = list_frames(dir)?;
    if frames.is_empty() {
        bail!("no jpeg or png frames found in {}", dir.display());
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;

    log::info!(
        "watching {} frames from {} every {:?}",
        frames.len(),
        dir.display(),
        interval
    );

    let mut processed = 0u64;
    let mut skipped = 0u64;
    let mut unreachable_streak = 0u32;
    'frames: loop {
        for frame in &frames {
            if !running.load(Ordering::SeqCst) {
                log::info!("stop requested");
                break 'frames;
            }
            let started = Instant::now();
            let outcome = prepare_upload(frame, config).and_then(|payload| {
                client
                    .detect_video_frame(&payload)
                    .map_err(anyhow::Error::from)
            });
            match outcome {
                Ok(result) => {
                    unreachable_streak = 0;
                    processed += 1;
                    let summary = store.ingest(&result);
                    log::debug!(
                        "{}: {} people, {} falls",
                        frame.display(),
                        store.current_detection_count(),
                        summary.falls
                    );
                    if store.show_fall_alert() {
                        log::warn!(
                            "FALL ALERT at {} (session falls: {})",
                            frame.display(),
                            store.total_fall_count()
                        );
                        store.acknowledge_alert();
                    }
                }
                Err(err) => {
                    skipped += 1;
                    let unreachable = err
                        .downcast_ref::<ApiError>()
                        .map(|api| api.kind == ApiErrorKind::Unreachable)
                        .unwrap_or(false);
                    if unreachable {
                        unreachable_streak += 1;
                        if unreachable_streak >= MAX_CONSECUTIVE_UNREACHABLE {
                            return Err(anyhow!(
                                "backend unreachable for {} frames in a row: {}",
                                unreachable_streak,
                                err
                            ));
                        }
                    }
                    log::warn!("skipped {}: {:#}", frame.display(), err);
                }
            }
            if let Some(remaining) = interval.checked_sub(started.elapsed()) {
                std::thread::sleep(remaining);
            }
        }
        if !repeat {
            break;
        }
    }

    log::info!(
        "watch finished: {} frames processed, {} skipped",
        processed,
        skipped
    );
    Ok(())
}

fn report(store: &DetectionStore, json: bool) -> Result<()> {
    if json {
        return print_json(&store.snapshot());
    }
    println!(
        "people now: {}  max: {}  detections total: {}  falls total: {}",
        store.current_detection_count(),
        store.max_detected_people(),
        store.total_detection_count(),
        store.total_fall_count()
    );
    if store.current_fall_detected() {
        println!("!! fall detected in the latest result");
    }
    for record in store.recent_history() {
        let object = record
            .object_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {}  {:<6} object {:<4} {:<6} score {:.2}  conf {:.2}",
            record.timestamp,
            record.id.to_string(),
            object,
            if record.is_fall { "FALL" } else { "ok" },
            record.score,
            record.confidence
        );
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
