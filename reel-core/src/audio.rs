//! Decoded-audio buffering and the host flush gate.
//!
//! The decode producer appends packets; the host drains them through
//! `flush_to` on its own schedule. The queue lock is scoped to the flush
//! call so it is released on every exit path, sink failure included.

use parking_lot::Mutex;
use thiserror::Error;

/// One decoded audio chunk, interleaved f32 samples.
#[derive(Debug, Clone)]
pub struct AudioPacket {
    pub samples: Vec<f32>,
    pub channels: u32,
}

impl AudioPacket {
    /// Sample frames in this packet (samples per channel).
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Outcome of one audio decode step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioDecode {
    /// Seconds of audio pushed to the packet queue.
    Decoded(f64),
    /// No audio track on this clip; a valid steady state, not an error.
    NotApplicable,
}

#[derive(Debug, Error)]
pub enum AudioSinkError {
    #[error("audio sink rejected packet: {0}")]
    Rejected(String),
}

/// Host-side audio consumer fed by the flush gate.
pub trait AudioSink: Send {
    fn insert(&mut self, packet: &AudioPacket) -> Result<(), AudioSinkError>;
}

/// Append-only queue of decoded audio awaiting host pickup.
#[derive(Default)]
pub struct AudioPacketQueue {
    packets: Mutex<Vec<AudioPacket>>,
}

impl AudioPacketQueue {
    pub fn new() -> Self {
        Self {
            packets: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, packet: AudioPacket) {
        self.packets.lock().push(packet);
    }

    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain buffered packets into `sink` under the queue lock. On sink
    /// failure the delivered prefix is dropped, the failed packet and
    /// everything after it stay queued, and the lock is released by the
    /// guard either way.
    pub fn flush_to(&self, sink: &mut dyn AudioSink) -> Result<usize, AudioSinkError> {
        let mut packets = self.packets.lock();
        let mut flushed = 0;
        while flushed < packets.len() {
            if let Err(e) = sink.insert(&packets[flushed]) {
                packets.drain(..flushed);
                return Err(e);
            }
            flushed += 1;
        }
        packets.clear();
        Ok(flushed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct CollectingSink {
        frames: usize,
        fail_after: Option<usize>,
    }

    impl AudioSink for CollectingSink {
        fn insert(&mut self, packet: &AudioPacket) -> Result<(), AudioSinkError> {
            if let Some(limit) = self.fail_after {
                if self.frames >= limit {
                    return Err(AudioSinkError::Rejected("device full".into()));
                }
            }
            self.frames += packet.frame_count();
            Ok(())
        }
    }

    fn packet(frames: usize) -> AudioPacket {
        AudioPacket {
            samples: vec![0.0; frames * 2],
            channels: 2,
        }
    }

    #[test]
    fn test_flush_drains_everything() {
        let queue = AudioPacketQueue::new();
        queue.push(packet(64));
        queue.push(packet(32));

        let mut sink = CollectingSink {
            frames: 0,
            fail_after: None,
        };
        assert_eq!(queue.flush_to(&mut sink).unwrap(), 2);
        assert_eq!(sink.frames, 96);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_failed_sink_keeps_undelivered_packets_and_releases_lock() {
        let queue = AudioPacketQueue::new();
        queue.push(packet(16));
        queue.push(packet(16));
        queue.push(packet(16));

        let mut sink = CollectingSink {
            frames: 0,
            fail_after: Some(16),
        };
        assert!(queue.flush_to(&mut sink).is_err());
        // First packet delivered, the failed one and the rest stay queued.
        assert_eq!(queue.len(), 2);

        // Lock was released: the producer can append and a recovered sink
        // can drain.
        queue.push(packet(16));
        let mut sink = CollectingSink {
            frames: 0,
            fail_after: None,
        };
        assert_eq!(queue.flush_to(&mut sink).unwrap(), 3);
        assert!(queue.is_empty());
    }
}
