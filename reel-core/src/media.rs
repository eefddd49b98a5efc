//! External collaborator boundary: demuxer, video codec, audio codec.
//!
//! The core never parses containers or decompresses pictures itself. It
//! drives implementations of these traits, which wrap whatever demux/codec
//! library the host links.

use bytes::Bytes;
use thiserror::Error;

use crate::audio::{AudioDecode, AudioPacketQueue};
use crate::pixel::{PictureLayout, PlaneSet};

/// Opaque byte source a clip is loaded from. File I/O stays outside the
/// core; anything seekable works.
pub trait DataSource: std::io::Read + std::io::Seek + Send {}

impl<T: std::io::Read + std::io::Seek + Send> DataSource for T {}

/// Frame-rate rational as declared by the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framerate {
    pub numerator: u32,
    pub denominator: u32,
}

impl Framerate {
    /// Frames per second. Callers validate the denominator at load time; a
    /// zero denominator never reaches this division.
    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

/// One pull from the compressed stream. Both arms are immediate results;
/// reading never blocks waiting for data to appear.
#[derive(Debug, Clone)]
pub enum DemuxRead {
    Unit(Bytes),
    EndOfStream,
}

/// Container-side collaborator: stream facts and compressed units.
pub trait Demuxer: Send {
    /// Declared frame-rate rational. `Err` when the container gives nothing
    /// usable; surfaced as a load failure.
    fn guess_framerate(&mut self) -> Result<Framerate, String>;

    /// Total frame count of one pass through the stream.
    fn guess_duration(&mut self) -> u64;

    /// Picture geometry, including the subframe rectangle.
    fn picture_layout(&self) -> PictureLayout;

    /// Reposition to the first compressed unit.
    fn rewind(&mut self);

    /// Next compressed unit, or the end of this pass.
    fn read_compressed_unit(&mut self) -> DemuxRead;

    /// Whether the container carries an audio track.
    fn has_audio(&self) -> bool {
        false
    }
}

/// Transient failure of a single compressed unit. Logged and skipped by the
/// pipeline; never fatal to playback.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The codec rejected the unit. Carries whatever diagnostic detail the
    /// codec exposes.
    #[error("corrupt unit: {0}")]
    CorruptUnit(String),
}

/// Codec-side collaborator.
pub trait VideoDecoder: Send {
    /// Feed one compressed unit. Errors are transient: the pipeline logs the
    /// detail and moves to the next unit.
    fn decode(&mut self, unit: &[u8]) -> Result<(), DecodeError>;

    /// Drain the next decoded picture, if the codec has one buffered. Called
    /// repeatedly at end of stream to flush internal reordering buffers.
    fn next_picture(&mut self) -> Option<PlaneSet<'_>>;

    /// Drop internal picture state (restart).
    fn reset(&mut self);

    /// Decoder name for diagnostics.
    fn name(&self) -> &str;
}

/// Audio-side collaborator: decodes one unit's worth of audio into the
/// clip's packet queue.
pub trait AudioDecoder: Send {
    fn decode_audio(&mut self, queue: &AudioPacketQueue) -> AudioDecode;
}
