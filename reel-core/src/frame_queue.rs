//! # Frame Queue - Bounded Decoded-Frame Buffer
//!
//! Fixed pool of frame slots between the decode producer and the host
//! consumer:
//! - Slots move `Empty -> Decoding -> Ready`, published through a per-slot
//!   atomic so the consumer observes transitions without a queue-wide lock
//! - Pixel payload sits behind a per-slot mutex
//! - `request_empty` returning `None` is the backpressure signal that stops
//!   decoding for the tick
//! - `reset` starts a new iteration; Ready frames stamped with an older
//!   iteration are stale and reclaimed instead of displayed
//!
//! Slot-state transitions are single-producer (the decode thread); the
//! consumer only takes Ready slots back to Empty.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::frame::VideoFrame;
use crate::pixel::FrameLayout;

const EMPTY: u8 = 0;
const DECODING: u8 = 1;
const READY: u8 = 2;

struct Slot {
    state: AtomicU8,
    frame: Mutex<VideoFrame>,
}

/// Bounded pool of decoded-frame slots.
pub struct FrameQueue {
    slots: Box<[Slot]>,
    /// Bumped on every reset; frames from older iterations are stale.
    iteration: AtomicU64,
}

impl FrameQueue {
    /// Allocate `capacity` slots (the precache depth) with buffers sized for
    /// `layout`.
    pub fn new(capacity: usize, layout: FrameLayout) -> Self {
        assert!(capacity > 0, "frame queue needs at least one slot");
        let slots = (0..capacity)
            .map(|_| Slot {
                state: AtomicU8::new(EMPTY),
                frame: Mutex::new(VideoFrame::new(layout)),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            iteration: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn iteration(&self) -> u64 {
        self.iteration.load(Ordering::Acquire)
    }

    // ========================================================================
    // Producer API (Decode Thread)
    // ========================================================================

    /// Claim an Empty slot for decoding. `None` means every slot is occupied:
    /// the backpressure signal, not an error.
    pub fn request_empty(&self) -> Option<usize> {
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot
                .state
                .compare_exchange(EMPTY, DECODING, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(idx);
            }
        }
        None
    }

    /// Write access to a claimed slot's frame.
    pub fn frame_mut(&self, idx: usize) -> MutexGuard<'_, VideoFrame> {
        self.slots[idx].frame.lock()
    }

    /// Publish a decoded slot. Marking a slot that is not Decoding is a
    /// programming-contract violation, not a recoverable condition.
    pub fn mark_ready(&self, idx: usize) {
        let prev = self.slots[idx].state.swap(READY, Ordering::AcqRel);
        assert_eq!(prev, DECODING, "mark_ready on a slot that was not decoding");
    }

    /// Return a claimed slot unused (transient decode failure, or the codec
    /// had nothing buffered).
    pub fn release(&self, idx: usize) {
        let prev = self.slots[idx].state.swap(EMPTY, Ordering::AcqRel);
        debug_assert_eq!(prev, DECODING, "release on a slot that was not decoding");
    }

    /// Discard all buffered frames and start a new iteration. Called from the
    /// producer context on restart/seek; frames still carrying the previous
    /// iteration number are treated as stale by the consumer.
    pub fn reset(&self) {
        self.iteration.fetch_add(1, Ordering::AcqRel);
        for slot in self.slots.iter() {
            slot.state.store(EMPTY, Ordering::Release);
        }
    }

    // ========================================================================
    // Consumer API (Host Thread)
    // ========================================================================

    /// Oldest current-iteration Ready frame whose display time has arrived.
    /// Stale Ready slots found during the scan are reclaimed. The returned
    /// guard keeps the slot Ready; `FrameRef::pop` releases it.
    pub fn ready_frame_at(&self, time: f64) -> Option<FrameRef<'_>> {
        let iteration = self.iteration();
        let mut best: Option<(usize, u64)> = None;

        for (idx, slot) in self.slots.iter().enumerate() {
            if slot.state.load(Ordering::Acquire) != READY {
                continue;
            }
            let frame = slot.frame.lock();
            if frame.iteration != iteration {
                drop(frame);
                // Reclaim unless a reset already recycled the slot under us.
                let _ = slot.state.compare_exchange(
                    READY,
                    EMPTY,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                );
                continue;
            }
            if frame.display_time <= time {
                match best {
                    Some((_, number)) if number <= frame.number => {}
                    _ => best = Some((idx, frame.number)),
                }
            }
        }

        best.map(|(idx, _)| FrameRef {
            queue: self,
            idx,
            frame: self.slots[idx].frame.lock(),
        })
    }

    // ========================================================================
    // Status API
    // ========================================================================

    pub fn ready_len(&self) -> usize {
        self.count_state(READY)
    }

    /// Slots currently claimed or filled (Decoding + Ready).
    pub fn occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state.load(Ordering::Acquire) != EMPTY)
            .count()
    }

    fn count_state(&self, state: u8) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state.load(Ordering::Acquire) == state)
            .count()
    }
}

/// Borrowed view of a Ready frame. Dropping it without `pop` leaves the slot
/// Ready, so the host can peek without consuming.
pub struct FrameRef<'a> {
    queue: &'a FrameQueue,
    idx: usize,
    frame: MutexGuard<'a, VideoFrame>,
}

impl std::ops::Deref for FrameRef<'_> {
    type Target = VideoFrame;

    fn deref(&self) -> &VideoFrame {
        &self.frame
    }
}

impl FrameRef<'_> {
    /// Release the slot for reuse once the host has consumed the pixels.
    pub fn pop(self) {
        let FrameRef { queue, idx, frame } = self;
        drop(frame);
        // If a reset raced this display, the slot is no longer ours to
        // recycle.
        let _ = queue.slots[idx].state.compare_exchange(
            READY,
            EMPTY,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::{PictureLayout, PixelFormat};

    fn layout() -> FrameLayout {
        FrameLayout::new(&PictureLayout::full(4, 4), PixelFormat::Gray8, false)
    }

    fn fill(queue: &FrameQueue, slot: usize, number: u64, fps: f64) {
        {
            let mut frame = queue.frame_mut(slot);
            frame.number = number;
            frame.display_time = number as f64 / fps;
            frame.iteration = queue.iteration();
        }
        queue.mark_ready(slot);
    }

    #[test]
    fn test_capacity_is_a_hard_bound() {
        let queue = FrameQueue::new(3, layout());
        let a = queue.request_empty().unwrap();
        let b = queue.request_empty().unwrap();
        let c = queue.request_empty().unwrap();
        assert_eq!(queue.request_empty(), None);
        assert_eq!(queue.occupied(), 3);

        queue.mark_ready(a);
        queue.mark_ready(b);
        queue.mark_ready(c);
        assert_eq!(queue.request_empty(), None);
        assert_eq!(queue.occupied(), 3);
    }

    #[test]
    fn test_ready_frames_come_out_in_number_order() {
        let queue = FrameQueue::new(4, layout());
        for number in [2u64, 0, 1] {
            let slot = queue.request_empty().unwrap();
            fill(&queue, slot, number, 10.0);
        }

        for expected in 0u64..3 {
            let frame = queue.ready_frame_at(1.0).unwrap();
            assert_eq!(frame.number, expected);
            frame.pop();
        }
        assert!(queue.ready_frame_at(1.0).is_none());
    }

    #[test]
    fn test_frames_are_gated_on_display_time() {
        let queue = FrameQueue::new(2, layout());
        let slot = queue.request_empty().unwrap();
        fill(&queue, slot, 5, 10.0); // due at 0.5s

        assert!(queue.ready_frame_at(0.49).is_none());
        let frame = queue.ready_frame_at(0.5).unwrap();
        assert_eq!(frame.number, 5);
    }

    #[test]
    fn test_peek_without_pop_keeps_the_slot_ready() {
        let queue = FrameQueue::new(2, layout());
        let slot = queue.request_empty().unwrap();
        fill(&queue, slot, 0, 10.0);

        let frame = queue.ready_frame_at(0.0).unwrap();
        drop(frame);
        assert_eq!(queue.ready_len(), 1);

        queue.ready_frame_at(0.0).unwrap().pop();
        assert_eq!(queue.ready_len(), 0);
    }

    #[test]
    fn test_release_returns_slot_to_empty() {
        let queue = FrameQueue::new(1, layout());
        let slot = queue.request_empty().unwrap();
        assert_eq!(queue.request_empty(), None);
        queue.release(slot);
        assert!(queue.request_empty().is_some());
    }

    #[test]
    fn test_reset_discards_and_invalidates() {
        let queue = FrameQueue::new(3, layout());
        let slot = queue.request_empty().unwrap();
        fill(&queue, slot, 0, 10.0);
        let before = queue.iteration();

        queue.reset();

        assert_eq!(queue.iteration(), before + 1);
        assert_eq!(queue.occupied(), 0);
        assert!(queue.ready_frame_at(10.0).is_none());
    }

    #[test]
    fn test_stale_iteration_frame_is_reclaimed_not_displayed() {
        let queue = FrameQueue::new(2, layout());
        let slot = queue.request_empty().unwrap();
        fill(&queue, slot, 7, 10.0);

        // A racing reset happened after this frame was stamped: force the
        // stale condition by bumping the iteration only.
        queue.iteration.fetch_add(1, Ordering::AcqRel);

        assert!(queue.ready_frame_at(10.0).is_none());
        assert_eq!(queue.ready_len(), 0);
        assert!(queue.request_empty().is_some());
    }

    #[test]
    #[should_panic(expected = "mark_ready")]
    fn test_double_mark_ready_is_a_contract_violation() {
        let queue = FrameQueue::new(1, layout());
        let slot = queue.request_empty().unwrap();
        queue.mark_ready(slot);
        queue.mark_ready(slot);
    }
}
