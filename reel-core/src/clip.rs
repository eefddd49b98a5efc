//! # Clip Controller - Decode Pipeline and Seek/Restart State Machine
//!
//! Owns one open stream's playback state: the frame queue, the playback
//! timer, the audio packet queue, and the demuxer/decoder collaborators.
//! The decode producer advances `service()`; the host reads due frames and
//! drives play/pause/seek.
//!
//! Failure policy:
//! - Load-time failures (`LoadError`) are fatal to the clip instance; it
//!   reports zero dimensions/duration and never produces frames afterwards
//! - Per-unit codec errors are logged with the codec's detail and skipped;
//!   a corrupt packet must not kill a long-running stream
//! - Queue-full and end-of-stream are ordinary results, not errors

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::OnceLock;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::audio::{AudioDecode, AudioPacketQueue, AudioSink};
use crate::formats::{ContainerKind, FormatRegistry};
use crate::frame_queue::{FrameQueue, FrameRef};
use crate::media::{AudioDecoder, DataSource, Demuxer, DemuxRead, VideoDecoder};
use crate::pixel::{FrameLayout, PictureLayout, PixelFormat, PixelTransform, PlanarCopy, PlaneSet, SubFrame};
use crate::timer::PlaybackTimer;

const NO_SEEK: i64 = -1;
const NO_FRAME: i64 = -1;

// ============================================================================
// Controller Types
// ============================================================================

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipState {
    /// Created, not loaded yet.
    Loading,
    /// Loaded; steady decode.
    Ready,
    /// Applying a pending seek.
    Seeking,
    /// Rewinding for a loop pass.
    Restarting,
    /// Final frame reached and looping is off.
    EndOfStream,
    /// Load failed; the clip is unusable.
    Error,
}

/// Fatal construction-time failures. The clip stays unusable afterwards.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Container signature mismatch or frame rate undecidable.
    #[error("container format error: {0}")]
    Format(String),
    /// Decoder context failed to initialize.
    #[error("codec init error: {0}")]
    CodecInit(String),
}

/// Outcome of one decode tick. Only `Decoded` produced a frame; the rest are
/// expected steady-state results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeProgress {
    Decoded,
    /// Every slot is occupied; stop decoding this tick.
    QueueFull,
    /// A corrupt unit was logged and skipped, or the codec kept the picture
    /// buffered.
    Skipped,
    EndOfStream,
}

/// Host-tunable clip parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipSettings {
    /// Frames buffered ahead of the consumer.
    pub precache_depth: usize,
    /// Pad the storage stride to the next power of two.
    pub power_of_two_stride: bool,
    /// Restart automatically when the last frame has been decoded.
    pub loop_playback: bool,
    /// Slot buffer format the pixel transform writes.
    pub output_format: PixelFormat,
}

impl Default for ClipSettings {
    fn default() -> Self {
        Self {
            precache_depth: 8,
            power_of_two_stride: false,
            loop_playback: true,
            output_format: PixelFormat::I420,
        }
    }
}

/// Stream facts captured at load time.
#[derive(Debug, Clone, Copy)]
pub struct ClipInfo {
    pub kind: ContainerKind,
    pub picture: PictureLayout,
    pub layout: FrameLayout,
    pub fps: f64,
    pub num_frames: u64,
    pub duration: f64,
}

struct Backend {
    demuxer: Box<dyn Demuxer>,
    video: Box<dyn VideoDecoder>,
    audio: Option<Box<dyn AudioDecoder>>,
}

// ============================================================================
// Clip
// ============================================================================

/// One open media stream plus its decode/playback state.
pub struct Clip {
    settings: ClipSettings,
    state: RwLock<ClipState>,
    info: OnceLock<ClipInfo>,
    queue: OnceLock<FrameQueue>,
    backend: Mutex<Option<Backend>>,
    transform: Box<dyn PixelTransform>,

    timer: PlaybackTimer,
    audio_queue: AudioPacketQueue,
    audio_sink: Mutex<Option<Box<dyn AudioSink>>>,

    next_frame_number: AtomicU64,
    last_frame_number: AtomicI64,
    end_of_stream: AtomicBool,
    should_restart: AtomicBool,
    pending_seek: AtomicI64,
}

impl Clip {
    pub fn new(settings: ClipSettings) -> Self {
        Self::with_transform(settings, Box::new(PlanarCopy))
    }

    /// Clip with a host-supplied pixel transform instead of the plane copy.
    pub fn with_transform(settings: ClipSettings, transform: Box<dyn PixelTransform>) -> Self {
        Self {
            settings,
            state: RwLock::new(ClipState::Loading),
            info: OnceLock::new(),
            queue: OnceLock::new(),
            backend: Mutex::new(None),
            transform,
            timer: PlaybackTimer::new(),
            audio_queue: AudioPacketQueue::new(),
            audio_sink: Mutex::new(None),
            next_frame_number: AtomicU64::new(0),
            last_frame_number: AtomicI64::new(NO_FRAME),
            end_of_stream: AtomicBool::new(false),
            should_restart: AtomicBool::new(false),
            pending_seek: AtomicI64::new(NO_SEEK),
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Validate the container, set up the decoder, size the frame queue.
    /// On failure the clip reports zero dimensions/duration and every decode
    /// call is a no-op.
    pub fn load(
        &self,
        source: Box<dyn DataSource>,
        registry: &FormatRegistry,
    ) -> Result<(), LoadError> {
        match self.try_load(source, registry) {
            Ok(()) => {
                *self.state.write() = ClipState::Ready;
                Ok(())
            }
            Err(e) => {
                *self.state.write() = ClipState::Error;
                warn!("clip load failed: {e}");
                Err(e)
            }
        }
    }

    fn try_load(
        &self,
        source: Box<dyn DataSource>,
        registry: &FormatRegistry,
    ) -> Result<(), LoadError> {
        if self.info.get().is_some() {
            return Err(LoadError::Format("clip is already loaded".into()));
        }

        let (kind, mut parts) = registry.open(source, &self.settings)?;

        let rate = parts.demuxer.guess_framerate().map_err(LoadError::Format)?;
        if rate.denominator == 0 {
            return Err(LoadError::Format(
                "frame rate denominator is zero".into(),
            ));
        }
        let fps = rate.as_f64();
        if !(fps > 0.0) {
            return Err(LoadError::Format(format!(
                "unusable frame rate {}/{}",
                rate.numerator, rate.denominator
            )));
        }

        let num_frames = parts.demuxer.guess_duration();
        let picture = parts.demuxer.picture_layout();
        parts.demuxer.rewind();

        let layout = FrameLayout::new(
            &picture,
            self.settings.output_format,
            self.settings.power_of_two_stride,
        );
        let duration = num_frames as f64 / fps;
        debug!(?kind, fps, num_frames, duration, "clip loaded");

        let _ = self.queue.set(FrameQueue::new(self.settings.precache_depth, layout));
        *self.backend.lock() = Some(Backend {
            demuxer: parts.demuxer,
            video: parts.video,
            audio: parts.audio,
        });
        let _ = self.info.set(ClipInfo {
            kind,
            picture,
            layout,
            fps,
            num_frames,
            duration,
        });
        Ok(())
    }

    // ========================================================================
    // Decode Pipeline (producer context)
    // ========================================================================

    /// One producer tick: apply a pending seek, act on the restart flag,
    /// decode one frame, then run the audio path.
    pub fn service(&self) -> DecodeProgress {
        if self.seek_pending() {
            self.do_seek();
        }
        if self.should_restart.load(Ordering::Acquire) {
            if self.settings.loop_playback {
                self.restart();
            } else {
                self.latch_end_of_stream();
            }
        }
        let progress = self.decode_next_frame();
        if progress == DecodeProgress::Decoded {
            let _ = self.decode_audio();
        }
        self.decoded_audio_check();
        progress
    }

    /// Pull one compressed unit through the decoder into the frame queue.
    pub fn decode_next_frame(&self) -> DecodeProgress {
        if self.end_of_stream.load(Ordering::Acquire) {
            return DecodeProgress::EndOfStream;
        }
        if self.should_restart.load(Ordering::Acquire) {
            // Past the final frame with no restart issued: stop rather than
            // numbering beyond the clip length.
            self.latch_end_of_stream();
            return DecodeProgress::EndOfStream;
        }
        let (Some(queue), Some(info)) = (self.queue.get(), self.info.get()) else {
            // Never loaded (or load failed): permanently nothing to do.
            return DecodeProgress::EndOfStream;
        };

        let Some(slot) = queue.request_empty() else {
            return DecodeProgress::QueueFull;
        };

        let mut guard = self.backend.lock();
        let Some(backend) = guard.as_mut() else {
            queue.release(slot);
            return DecodeProgress::EndOfStream;
        };

        match backend.demuxer.read_compressed_unit() {
            DemuxRead::Unit(unit) => {
                if let Err(e) = backend.video.decode(&unit) {
                    warn!(decoder = backend.video.name(), "skipping unit: {e}");
                    queue.release(slot);
                    return DecodeProgress::Skipped;
                }
                match backend.video.next_picture() {
                    Some(picture) => {
                        self.finish_frame(queue, info, slot, &picture);
                        DecodeProgress::Decoded
                    }
                    None => {
                        // Codec kept the picture buffered; nothing to publish
                        // this tick.
                        queue.release(slot);
                        DecodeProgress::Skipped
                    }
                }
            }
            DemuxRead::EndOfStream => {
                // Drain decoder-internal pictures before declaring the end.
                match backend.video.next_picture() {
                    Some(picture) => {
                        self.finish_frame(queue, info, slot, &picture);
                        DecodeProgress::Decoded
                    }
                    None => {
                        queue.release(slot);
                        if self.last_frame_number.load(Ordering::Acquire) >= 0 {
                            self.should_restart.store(true, Ordering::Release);
                        }
                        self.latch_end_of_stream();
                        DecodeProgress::EndOfStream
                    }
                }
            }
        }
    }

    fn finish_frame(&self, queue: &FrameQueue, info: &ClipInfo, slot: usize, picture: &PlaneSet<'_>) {
        let number = self.next_frame_number.fetch_add(1, Ordering::AcqRel);
        self.last_frame_number.store(number as i64, Ordering::Release);

        {
            let mut frame = queue.frame_mut(slot);
            frame.number = number;
            frame.display_time = number as f64 / info.fps;
            frame.iteration = queue.iteration();
            let layout = frame.layout;
            self.transform.apply(picture, &layout, &mut frame.data);
        }
        queue.mark_ready(slot);

        // Flag only; acted on after this call returns. Restarting mid-decode
        // would corrupt the state the caller still holds.
        if info.num_frames > 0 && number + 1 >= info.num_frames {
            self.should_restart.store(true, Ordering::Release);
        }
    }

    fn latch_end_of_stream(&self) {
        self.end_of_stream.store(true, Ordering::Release);
        *self.state.write() = ClipState::EndOfStream;
    }

    /// Rewind to the start for another loop pass. Resumes play only if the
    /// clip was playing when called.
    pub fn restart(&self) {
        let Some(queue) = self.queue.get() else {
            return;
        };
        *self.state.write() = ClipState::Restarting;
        let was_paused = self.timer.is_paused();
        if !was_paused {
            self.timer.pause();
        }

        {
            let mut guard = self.backend.lock();
            if let Some(backend) = guard.as_mut() {
                backend.demuxer.rewind();
                backend.video.reset();
            }
        }

        self.next_frame_number.store(0, Ordering::Release);
        self.last_frame_number.store(NO_FRAME, Ordering::Release);
        self.end_of_stream.store(false, Ordering::Release);
        self.should_restart.store(false, Ordering::Release);
        self.pending_seek.store(NO_SEEK, Ordering::Release);
        queue.reset();
        self.timer.seek(0.0);

        debug!(iteration = queue.iteration(), "clip restarted");
        *self.state.write() = ClipState::Ready;
        if !was_paused {
            self.timer.play();
        }
    }

    /// Apply the pending seek: move the clock, drop buffered frames, resume
    /// numbering at the target.
    pub fn do_seek(&self) {
        let target = self.pending_seek.load(Ordering::Acquire);
        if target < 0 {
            return;
        }
        let (Some(queue), Some(info)) = (self.queue.get(), self.info.get()) else {
            self.pending_seek.store(NO_SEEK, Ordering::Release);
            return;
        };

        *self.state.write() = ClipState::Seeking;
        let target = target as u64;
        let time = target as f64 / info.fps;
        self.timer.seek(time);
        let was_paused = self.timer.is_paused();
        if !was_paused {
            self.timer.pause();
        }

        // Frames decoded ahead of the target are wrong now.
        queue.reset();
        self.next_frame_number.store(target, Ordering::Release);
        self.last_frame_number.store(target as i64, Ordering::Release);
        self.end_of_stream.store(false, Ordering::Release);
        self.should_restart.store(false, Ordering::Release);

        debug!(frame = target, time, "seek applied");
        *self.state.write() = ClipState::Ready;
        if !was_paused {
            self.timer.play();
        }
        self.pending_seek.store(NO_SEEK, Ordering::Release);
    }

    // ========================================================================
    // Audio Path
    // ========================================================================

    /// Decode one audio unit's worth into the packet queue.
    pub fn decode_audio(&self) -> AudioDecode {
        let mut guard = self.backend.lock();
        match guard.as_mut().and_then(|b| b.audio.as_mut()) {
            Some(audio) => audio.decode_audio(&self.audio_queue),
            None => AudioDecode::NotApplicable,
        }
    }

    /// Flush decoded audio to the attached sink. No-op without a sink or
    /// while playback is paused; audio must not advance under a paused clock.
    pub fn decoded_audio_check(&self) {
        let mut sink = self.audio_sink.lock();
        let Some(sink) = sink.as_mut() else {
            return;
        };
        if self.timer.is_paused() {
            return;
        }
        if let Err(e) = self.audio_queue.flush_to(sink.as_mut()) {
            warn!("audio flush failed: {e}");
        }
    }

    pub fn attach_audio_sink(&self, sink: Box<dyn AudioSink>) {
        *self.audio_sink.lock() = Some(sink);
    }

    pub fn audio_packets_pending(&self) -> usize {
        self.audio_queue.len()
    }

    // ========================================================================
    // Host API
    // ========================================================================

    /// Queue a seek to `frame`; the producer applies it on its next tick.
    pub fn request_seek(&self, frame: u64) {
        self.pending_seek.store(frame as i64, Ordering::Release);
    }

    pub fn seek_pending(&self) -> bool {
        self.pending_seek.load(Ordering::Acquire) >= 0
    }

    pub fn play(&self) {
        self.timer.play();
    }

    pub fn pause(&self) {
        self.timer.pause();
    }

    pub fn is_paused(&self) -> bool {
        self.timer.is_paused()
    }

    /// The Ready frame due for display at the current playback time.
    pub fn next_frame(&self) -> Option<FrameRef<'_>> {
        self.queue.get()?.ready_frame_at(self.timer.time())
    }

    pub fn frame_queue(&self) -> Option<&FrameQueue> {
        self.queue.get()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> ClipState {
        *self.state.read()
    }

    pub fn settings(&self) -> &ClipSettings {
        &self.settings
    }

    pub fn container_kind(&self) -> Option<ContainerKind> {
        self.info.get().map(|i| i.kind)
    }

    pub fn width(&self) -> u32 {
        self.info.get().map(|i| i.picture.width).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.info.get().map(|i| i.picture.height).unwrap_or(0)
    }

    pub fn stride(&self) -> u32 {
        self.info.get().map(|i| i.layout.stride).unwrap_or(0)
    }

    pub fn sub_frame(&self) -> Option<SubFrame> {
        self.info.get().map(|i| i.picture.sub_frame)
    }

    pub fn fps(&self) -> f64 {
        self.info.get().map(|i| i.fps).unwrap_or(0.0)
    }

    pub fn duration(&self) -> f64 {
        self.info.get().map(|i| i.duration).unwrap_or(0.0)
    }

    pub fn num_frames(&self) -> u64 {
        self.info.get().map(|i| i.num_frames).unwrap_or(0)
    }

    /// Last decoded frame number, if any frame has been decoded this
    /// iteration.
    pub fn frame_number(&self) -> Option<u64> {
        let n = self.last_frame_number.load(Ordering::Acquire);
        (n >= 0).then(|| n as u64)
    }

    pub fn end_of_stream(&self) -> bool {
        self.end_of_stream.load(Ordering::Acquire)
    }

    pub fn should_restart(&self) -> bool {
        self.should_restart.load(Ordering::Acquire)
    }

    /// Current loop/restart generation.
    pub fn iteration(&self) -> u64 {
        self.queue.get().map(|q| q.iteration()).unwrap_or(0)
    }

    /// Current playback clock in seconds.
    pub fn playback_time(&self) -> f64 {
        self.timer.time()
    }
}

// ============================================================================
// Tests
// ============================================================================
