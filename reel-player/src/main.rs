//! # Reel Player
//!
//! Headless playback harness: loads a synthetic test-pattern clip, runs the
//! decode worker, consumes frames against the playback clock, and prints a
//! JSON stats summary.

mod pattern;

use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;

use reel_core::audio::{AudioPacket, AudioSink, AudioSinkError};
use reel_core::clip::{Clip, ClipSettings};
use reel_core::formats::FormatRegistry;
use reel_core::media::Framerate;
use reel_core::worker::DecodeWorker;

use pattern::{PatternFactory, PatternParams};

// ============================================================================
// Options
// ============================================================================

struct HarnessOptions {
    /// Frames in the synthetic clip.
    length: u64,
    /// Frames to display before stopping.
    frames: u64,
    fps: u32,
    width: u32,
    height: u32,
    /// Seek to this frame halfway through the run.
    seek: Option<u64>,
    loop_playback: bool,
    audio: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            length: 30,
            frames: 30,
            fps: 30,
            width: 320,
            height: 240,
            seek: None,
            loop_playback: false,
            audio: false,
        }
    }
}

fn parse_args(args: &[String]) -> Result<HarnessOptions> {
    let mut options = HarnessOptions::default();
    let mut frames_set = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--length" | "-l" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --length"))?;
                options.length = value.parse()?;
                i += 2;
            }
            "--frames" | "-n" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --frames"))?;
                options.frames = value.parse()?;
                frames_set = true;
                i += 2;
            }
            "--fps" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --fps"))?;
                options.fps = value.parse()?;
                i += 2;
            }
            "--size" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --size"))?;
                let (w, h) = value
                    .split_once('x')
                    .ok_or_else(|| anyhow::anyhow!("Expected WIDTHxHEIGHT, got {value}"))?;
                options.width = w.parse()?;
                options.height = h.parse()?;
                i += 2;
            }
            "--seek" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --seek"))?;
                options.seek = Some(value.parse()?);
                i += 2;
            }
            "--loop" => {
                options.loop_playback = true;
                i += 1;
            }
            "--audio" => {
                options.audio = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                anyhow::bail!("Unknown argument: {other}");
            }
        }
    }

    if !frames_set {
        options.frames = options.length;
    }
    if options.fps == 0 {
        anyhow::bail!("--fps must be nonzero");
    }
    Ok(options)
}

fn print_usage() {
    eprintln!(
        "\nUsage:\n  reel [--length <n>] [--frames <n>] [--fps <n>] [--size WxH] \
         [--seek <frame>] [--loop] [--audio]\n"
    );
}

// ============================================================================
// Audio Sink
// ============================================================================

/// Counts delivered sample frames; stands in for a device stream.
struct CountingSink {
    frames: Arc<AtomicU64>,
}

impl AudioSink for CountingSink {
    fn insert(&mut self, packet: &AudioPacket) -> Result<(), AudioSinkError> {
        self.frames
            .fetch_add(packet.frame_count() as u64, Ordering::Relaxed);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

#[derive(Serialize)]
struct PlaybackStats {
    frames_displayed: u64,
    last_frame_number: Option<u64>,
    iterations: u64,
    clip_duration_secs: f64,
    clip_fps: f64,
    audio_frames_delivered: u64,
    elapsed_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("reel_core=info,reel=info")
        .init();

    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;

    tracing::info!("Reel Player v{}", reel_core::VERSION);
    run(options)
}

fn run(options: HarnessOptions) -> Result<()> {
    let source = pattern::encode(&PatternParams {
        fps: Framerate {
            numerator: options.fps,
            denominator: 1,
        },
        width: options.width,
        height: options.height,
        num_frames: options.length,
        audio_rate: if options.audio { 48_000 } else { 0 },
    });

    let mut registry = FormatRegistry::new();
    registry.register(Box::new(PatternFactory));

    let settings = ClipSettings {
        loop_playback: options.loop_playback,
        ..Default::default()
    };
    let clip = Arc::new(Clip::new(settings));
    clip.load(Box::new(Cursor::new(source)), &registry)?;

    tracing::info!(
        width = clip.width(),
        height = clip.height(),
        fps = clip.fps(),
        duration = clip.duration(),
        "clip loaded"
    );

    let audio_frames = Arc::new(AtomicU64::new(0));
    if options.audio {
        clip.attach_audio_sink(Box::new(CountingSink {
            frames: audio_frames.clone(),
        }));
    }

    clip.play();
    let worker = DecodeWorker::spawn(clip.clone());

    let started = Instant::now();
    let run_secs = options.frames as f64 / options.fps as f64;
    let deadline = started + Duration::from_secs_f64(run_secs + 3.0);

    let mut displayed: u64 = 0;
    let mut seek_pending = options.seek;

    while displayed < options.frames {
        if Instant::now() > deadline {
            tracing::warn!(displayed, "deadline reached before frame target");
            break;
        }

        if let Some(target) = seek_pending {
            if displayed >= options.frames / 2 {
                tracing::info!(target, "requesting seek");
                clip.request_seek(target);
                seek_pending = None;
            }
        }

        match clip.next_frame() {
            Some(frame) => {
                tracing::debug!(
                    number = frame.number,
                    time = frame.display_time,
                    iteration = frame.iteration,
                    "frame displayed"
                );
                frame.pop();
                displayed += 1;
            }
            None => thread::sleep(Duration::from_millis(1)),
        }
    }

    worker.stop();

    let stats = PlaybackStats {
        frames_displayed: displayed,
        last_frame_number: clip.frame_number(),
        iterations: clip.iteration(),
        clip_duration_secs: clip.duration(),
        clip_fps: clip.fps(),
        audio_frames_delivered: audio_frames.load(Ordering::Relaxed),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
