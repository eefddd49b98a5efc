//! Synthetic test-pattern container.
//!
//! A magic-tagged header carries the stream geometry; pictures and audio are
//! generated on demand. Enough to drive the whole pipeline end to end with
//! no codec library linked.

use std::io::Read;

use bytes::Bytes;

use reel_core::audio::{AudioDecode, AudioPacket, AudioPacketQueue};
use reel_core::clip::{ClipSettings, LoadError};
use reel_core::formats::{ClipFactory, ClipParts, ContainerKind};
use reel_core::media::{
    AudioDecoder, DataSource, DecodeError, DemuxRead, Demuxer, Framerate, VideoDecoder,
};
use reel_core::pixel::{PictureLayout, PlaneSet};

pub const MAGIC: &[u8; 4] = b"RPAT";
const HEADER_LEN: usize = 32;

/// Stream geometry baked into a pattern header.
#[derive(Debug, Clone, Copy)]
pub struct PatternParams {
    pub fps: Framerate,
    pub width: u32,
    pub height: u32,
    pub num_frames: u64,
    /// Sample rate of the generated tone; 0 disables the audio track.
    pub audio_rate: u32,
}

/// Serialize a pattern header into a loadable byte source.
pub fn encode(params: &PatternParams) -> Vec<u8> {
    let mut data = Vec::with_capacity(HEADER_LEN);
    data.extend_from_slice(MAGIC);
    data.extend_from_slice(&params.fps.numerator.to_le_bytes());
    data.extend_from_slice(&params.fps.denominator.to_le_bytes());
    data.extend_from_slice(&params.width.to_le_bytes());
    data.extend_from_slice(&params.height.to_le_bytes());
    data.extend_from_slice(&params.num_frames.to_le_bytes());
    data.extend_from_slice(&params.audio_rate.to_le_bytes());
    data
}

fn u32_le(b: &[u8; HEADER_LEN], o: usize) -> u32 {
    u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
}

fn u64_le(b: &[u8; HEADER_LEN], o: usize) -> u64 {
    u64::from_le_bytes([
        b[o],
        b[o + 1],
        b[o + 2],
        b[o + 3],
        b[o + 4],
        b[o + 5],
        b[o + 6],
        b[o + 7],
    ])
}

fn parse_header(source: &mut dyn DataSource) -> Result<PatternParams, LoadError> {
    let mut header = [0u8; HEADER_LEN];
    source
        .read_exact(&mut header)
        .map_err(|e| LoadError::Format(format!("pattern header: {e}")))?;
    if &header[..4] != MAGIC {
        return Err(LoadError::Format("pattern magic mismatch".into()));
    }
    Ok(PatternParams {
        fps: Framerate {
            numerator: u32_le(&header, 4),
            denominator: u32_le(&header, 8),
        },
        width: u32_le(&header, 12),
        height: u32_le(&header, 16),
        num_frames: u64_le(&header, 20),
        audio_rate: u32_le(&header, 28),
    })
}

// ============================================================================
// Demuxer
// ============================================================================

/// One compressed unit per frame: the frame index, little-endian.
struct PatternDemuxer {
    params: PatternParams,
    pos: u64,
}

impl Demuxer for PatternDemuxer {
    fn guess_framerate(&mut self) -> Result<Framerate, String> {
        Ok(self.params.fps)
    }

    fn guess_duration(&mut self) -> u64 {
        self.params.num_frames
    }

    fn picture_layout(&self) -> PictureLayout {
        PictureLayout::full(self.params.width, self.params.height)
    }

    fn rewind(&mut self) {
        self.pos = 0;
    }

    fn read_compressed_unit(&mut self) -> DemuxRead {
        if self.pos < self.params.num_frames {
            let unit = self.pos.to_le_bytes();
            self.pos += 1;
            DemuxRead::Unit(Bytes::copy_from_slice(&unit))
        } else {
            DemuxRead::EndOfStream
        }
    }

    fn has_audio(&self) -> bool {
        self.params.audio_rate > 0
    }
}

// ============================================================================
// Video Decoder
// ============================================================================

fn align16(n: usize) -> usize {
    (n + 15) & !15
}

/// Renders a gradient with a sweeping bar. Planes use 16-byte-aligned
/// strides, like real codec output.
struct PatternDecoder {
    width: usize,
    height: usize,
    y_stride: usize,
    c_stride: usize,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
    pending: Option<u64>,
}

impl PatternDecoder {
    fn new(width: usize, height: usize) -> Self {
        let y_stride = align16(width.max(1));
        let cw = (width + 1) / 2;
        let ch = (height + 1) / 2;
        let c_stride = align16(cw.max(1));
        Self {
            width,
            height,
            y_stride,
            c_stride,
            y: vec![0; y_stride * height.max(1)],
            u: vec![128; c_stride * ch.max(1)],
            v: vec![128; c_stride * ch.max(1)],
            pending: None,
        }
    }

    fn render(&mut self, index: u64) {
        let bar = index as usize % self.width.max(1);
        for row in 0..self.height {
            for col in 0..self.width {
                let value = if col == bar {
                    235
                } else {
                    (col * 255 / self.width.max(1)) as u8
                };
                self.y[row * self.y_stride + col] = value;
            }
        }
    }
}

impl VideoDecoder for PatternDecoder {
    fn decode(&mut self, unit: &[u8]) -> Result<(), DecodeError> {
        if unit.len() != 8 {
            return Err(DecodeError::CorruptUnit(format!(
                "pattern unit length {}",
                unit.len()
            )));
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(unit);
        self.pending = Some(u64::from_le_bytes(raw));
        Ok(())
    }

    fn next_picture(&mut self) -> Option<PlaneSet<'_>> {
        let index = self.pending.take()?;
        self.render(index);
        Some(PlaneSet {
            y: &self.y,
            y_stride: self.y_stride,
            u: &self.u,
            u_stride: self.c_stride,
            v: &self.v,
            v_stride: self.c_stride,
        })
    }

    fn reset(&mut self) {
        self.pending = None;
    }

    fn name(&self) -> &str {
        "pattern"
    }
}

// ============================================================================
// Audio Decoder
// ============================================================================

const TONE_HZ: f32 = 440.0;
const TONE_FRAMES: usize = 512;

/// Generates a stereo sine tone, one packet per decode step.
struct PatternAudioDecoder {
    rate: u32,
    phase: f32,
}

impl AudioDecoder for PatternAudioDecoder {
    fn decode_audio(&mut self, queue: &AudioPacketQueue) -> AudioDecode {
        let step = TONE_HZ * std::f32::consts::TAU / self.rate as f32;
        let mut samples = Vec::with_capacity(TONE_FRAMES * 2);
        for _ in 0..TONE_FRAMES {
            let s = self.phase.sin() * 0.2;
            self.phase = (self.phase + step) % std::f32::consts::TAU;
            samples.push(s);
            samples.push(s);
        }
        queue.push(AudioPacket {
            samples,
            channels: 2,
        });
        AudioDecode::Decoded(TONE_FRAMES as f64 / self.rate as f64)
    }
}

// ============================================================================
// Factory
// ============================================================================

pub struct PatternFactory;

impl ClipFactory for PatternFactory {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Other("pattern")
    }

    fn probe(&self, header: &[u8]) -> bool {
        header.starts_with(MAGIC)
    }

    fn open(
        &self,
        mut source: Box<dyn DataSource>,
        _settings: &ClipSettings,
    ) -> Result<ClipParts, LoadError> {
        let params = parse_header(source.as_mut())?;
        if params.width == 0 || params.height == 0 {
            return Err(LoadError::Format("pattern has zero dimensions".into()));
        }
        Ok(ClipParts {
            demuxer: Box::new(PatternDemuxer { params, pos: 0 }),
            video: Box::new(PatternDecoder::new(
                params.width as usize,
                params.height as usize,
            )),
            audio: (params.audio_rate > 0).then(|| {
                Box::new(PatternAudioDecoder {
                    rate: params.audio_rate,
                    phase: 0.0,
                }) as Box<dyn AudioDecoder>
            }),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
