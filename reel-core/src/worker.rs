//! Decode-producer thread.
//!
//! One worker per clip advances the decode pipeline; the host thread stays
//! free to read frames and drive play/pause/seek. Stopping the worker joins
//! the thread, so the producer is fenced before the clip (and its codec
//! context) can be dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::clip::{Clip, DecodeProgress};

/// Owns the producer thread driving `Clip::service`.
pub struct DecodeWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    pub fn spawn(clip: Arc<Clip>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = thread::spawn(move || {
            debug!("decode worker started");
            while !stop_flag.load(Ordering::SeqCst) {
                match clip.service() {
                    DecodeProgress::Decoded | DecodeProgress::Skipped => {}
                    // Nothing to do right now; don't spin on a full queue or
                    // a finished stream.
                    DecodeProgress::QueueFull | DecodeProgress::EndOfStream => {
                        thread::sleep(Duration::from_millis(2));
                    }
                }
            }
            debug!("decode worker stopped");
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the thread and wait for it to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipSettings;
    use crate::formats::{ClipFactory, ClipParts, ContainerKind, FormatRegistry};
    use crate::media::{DataSource, DecodeError, DemuxRead, Demuxer, Framerate, VideoDecoder};
    use crate::pixel::{PictureLayout, PlaneSet};
    use std::io::Cursor;
    use std::time::Instant;

    struct LoopDemuxer {
        pos: u64,
    }

    impl Demuxer for LoopDemuxer {
        fn guess_framerate(&mut self) -> Result<Framerate, String> {
            Ok(Framerate {
                numerator: 30,
                denominator: 1,
            })
        }
        fn guess_duration(&mut self) -> u64 {
            6
        }
        fn picture_layout(&self) -> PictureLayout {
            PictureLayout::full(2, 2)
        }
        fn rewind(&mut self) {
            self.pos = 0;
        }
        fn read_compressed_unit(&mut self) -> DemuxRead {
            if self.pos < 6 {
                let unit = self.pos.to_le_bytes();
                self.pos += 1;
                DemuxRead::Unit(bytes::Bytes::copy_from_slice(&unit))
            } else {
                DemuxRead::EndOfStream
            }
        }
    }

    struct FlatDecoder {
        y: [u8; 4],
        uv: [u8; 1],
        pending: bool,
    }

    impl VideoDecoder for FlatDecoder {
        fn decode(&mut self, _unit: &[u8]) -> Result<(), DecodeError> {
            self.pending = true;
            Ok(())
        }
        fn next_picture(&mut self) -> Option<PlaneSet<'_>> {
            if !self.pending {
                return None;
            }
            self.pending = false;
            Some(PlaneSet {
                y: &self.y,
                y_stride: 2,
                u: &self.uv,
                u_stride: 1,
                v: &self.uv,
                v_stride: 1,
            })
        }
        fn reset(&mut self) {
            self.pending = false;
        }
        fn name(&self) -> &str {
            "flat"
        }
    }

    struct LoopFactory;

    impl ClipFactory for LoopFactory {
        fn kind(&self) -> ContainerKind {
            ContainerKind::Other("loop")
        }
        fn probe(&self, header: &[u8]) -> bool {
            header.starts_with(b"LOOP")
        }
        fn open(
            &self,
            _source: Box<dyn DataSource>,
            _settings: &ClipSettings,
        ) -> Result<ClipParts, crate::clip::LoadError> {
            Ok(ClipParts {
                demuxer: Box::new(LoopDemuxer { pos: 0 }),
                video: Box::new(FlatDecoder {
                    y: [0; 4],
                    uv: [0; 1],
                    pending: false,
                }),
                audio: None,
            })
        }
    }

    #[test]
    fn test_worker_fills_the_queue_and_stops_cleanly() {
        let mut registry = FormatRegistry::new();
        registry.register(Box::new(LoopFactory));

        let clip = Arc::new(Clip::new(ClipSettings {
            precache_depth: 4,
            ..Default::default()
        }));
        clip.load(Box::new(Cursor::new(b"LOOP".to_vec())), &registry)
            .unwrap();

        let worker = DecodeWorker::spawn(clip.clone());

        let deadline = Instant::now() + Duration::from_secs(2);
        while clip.frame_queue().unwrap().ready_len() < 4 {
            assert!(Instant::now() < deadline, "worker never filled the queue");
            thread::sleep(Duration::from_millis(1));
        }

        worker.stop();
        // Producer is fenced: the queue stays exactly as the worker left it.
        let ready = clip.frame_queue().unwrap().ready_len();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(clip.frame_queue().unwrap().ready_len(), ready);
    }
}
