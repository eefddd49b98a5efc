//! Container format probing and backend construction.
//!
//! One factory per supported container, selected at load time by matching
//! the stream signature against the head of the source. The winning factory
//! builds the demuxer/decoder pair the clip drives.

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use crate::clip::{ClipSettings, LoadError};
use crate::media::{AudioDecoder, DataSource, Demuxer, VideoDecoder};

/// Bytes the registry reads from the head of a source for probing.
pub const PROBE_LEN: usize = 32;

/// Container family tag carried by each registered factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Webm,
    Ogg,
    Other(&'static str),
}

/// The collaborators a factory hands to the clip.
pub struct ClipParts {
    pub demuxer: Box<dyn Demuxer>,
    pub video: Box<dyn VideoDecoder>,
    pub audio: Option<Box<dyn AudioDecoder>>,
}

impl std::fmt::Debug for ClipParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipParts")
            .field("has_audio", &self.audio.is_some())
            .finish_non_exhaustive()
    }
}

/// Opens one container family.
pub trait ClipFactory: Send + Sync {
    fn kind(&self) -> ContainerKind;

    /// Match the container signature against the head of the stream.
    fn probe(&self, header: &[u8]) -> bool;

    /// Build the demuxer/decoder pair. Codec initialization failures surface
    /// as `LoadError::CodecInit`.
    fn open(
        &self,
        source: Box<dyn DataSource>,
        settings: &ClipSettings,
    ) -> Result<ClipParts, LoadError>;
}

/// Ordered set of known container formats.
#[derive(Default)]
pub struct FormatRegistry {
    factories: Vec<Box<dyn ClipFactory>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    pub fn register(&mut self, factory: Box<dyn ClipFactory>) {
        self.factories.push(factory);
    }

    pub fn kinds(&self) -> Vec<ContainerKind> {
        self.factories.iter().map(|f| f.kind()).collect()
    }

    /// Probe the source head and open it with the first matching factory.
    pub fn open(
        &self,
        mut source: Box<dyn DataSource>,
        settings: &ClipSettings,
    ) -> Result<(ContainerKind, ClipParts), LoadError> {
        let mut header = [0u8; PROBE_LEN];
        let read = read_head(source.as_mut(), &mut header)
            .map_err(|e| LoadError::Format(format!("unreadable source: {e}")))?;

        let matched = self.factories.iter().find(|f| f.probe(&header[..read]));
        match matched {
            Some(factory) => {
                debug!(kind = ?factory.kind(), "container signature matched");
                let parts = factory.open(source, settings)?;
                Ok((factory.kind(), parts))
            }
            None => Err(LoadError::Format(
                "no registered container matches the stream signature".into(),
            )),
        }
    }
}

/// Read up to `buf.len()` signature bytes, then rewind the source for the
/// factory.
fn read_head(source: &mut dyn DataSource, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    source.seek(SeekFrom::Start(0))?;
    Ok(filled)
}

// ============================================================================
// Tests
// ============================================================================
