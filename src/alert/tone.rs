//! Audible fall alert.
//!
//! The tone is a short 800 Hz sine beep whose gain decays exponentially, rendered
//! once to a mono 16-bit WAV. Playback pipes the WAV into an external player
//! (for example `aplay -q`). Without a player the terminal bell is rung instead.

use anyhow::{anyhow, bail, Context, Result};
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use super::{FallEvent, FallSink};

pub const TONE_FREQUENCY_HZ: f64 = 800.0;
pub const TONE_DURATION: Duration = Duration::from_millis(500);
pub const TONE_START_GAIN: f64 = 0.3;
pub const TONE_END_GAIN: f64 = 0.01;
pub const SAMPLE_RATE_HZ: u32 = 22_050;

const WAV_HEADER_BYTES: usize = 44;

/// Render the alert beep as signed 16-bit samples.
pub fn synthesize_tone(sample_rate: u32) -> Vec<i16> {
    let count = (f64::from(sample_rate) * TONE_DURATION.as_secs_f64()).round() as usize;
    let duration = TONE_DURATION.as_secs_f64();
    let decay = TONE_END_GAIN / TONE_START_GAIN;
    (0..count)
        .map(|n| {
            let t = n as f64 / f64::from(sample_rate);
            let gain = TONE_START_GAIN * decay.powf(t / duration);
            let sample = (2.0 * std::f64::consts::PI * TONE_FREQUENCY_HZ * t).sin() * gain;
            (sample * f64::from(i16::MAX)).round() as i16
        })
        .collect()
}

/// Wrap mono PCM samples in a RIFF/WAVE container.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(WAV_HEADER_BYTES + samples.len() * 2);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Fall sink that plays the alert tone on a detached thread.
pub struct ToneAlert {
    player: Option<Vec<String>>,
    wav: Arc<Vec<u8>>,
}

impl ToneAlert {
    /// `player` is a shell-style command line that reads a WAV from stdin.
    pub fn new(player: Option<&str>) -> Self {
        let player = player
            .map(|cmd| cmd.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|parts| !parts.is_empty());
        Self {
            player,
            wav: Arc::new(encode_wav(&synthesize_tone(SAMPLE_RATE_HZ), SAMPLE_RATE_HZ)),
        }
    }

    pub fn player(&self) -> Option<&[String]> {
        self.player.as_deref()
    }
}

impl FallSink for ToneAlert {
    fn name(&self) -> &str {
        "tone"
    }

    fn on_fall(&self, event: &FallEvent) -> Result<()> {
        let player = self.player.clone();
        let wav = Arc::clone(&self.wav);
        let record_id = event.record_id;
        std::thread::Builder::new()
            .name("fall-tone".to_string())
            .spawn(move || {
                let played = match player {
                    Some(command) => play_with(&command, &wav),
                    None => ring_bell(),
                };
                if let Err(err) = played {
                    log::warn!("alert tone for record {} failed: {:#}", record_id, err);
                }
            })
            .context("spawn alert tone thread")?;
        Ok(())
    }
}

fn play_with(command: &[String], wav: &[u8]) -> Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("alert player command is empty"))?;
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("start alert player '{}'", program))?;
    feed_player(child, program, wav)
}

/// Write the WAV to the player and reap it, even when the write fails.
fn feed_player(mut child: Child, program: &str, wav: &[u8]) -> Result<()> {
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(wav),
        None => Ok(()),
    };
    let status = child.wait().context("wait for alert player")?;
    written.context("write tone to alert player")?;
    if !status.success() {
        bail!("alert player '{}' exited with {}", program, status);
    }
    Ok(())
}

fn ring_bell() -> Result<()> {
    let mut stderr = std::io::stderr();
    stderr.write_all(b"\x07").context("ring terminal bell")?;
    stderr.flush().context("flush terminal bell")?;
    Ok(())
}
