//! Playback clock.
//!
//! Time advances against the monotonic clock while playing and freezes while
//! paused. Seek jumps the clock; the pause/resume choreography around a
//! container-level seek belongs to the clip controller.

use std::time::Instant;

use parking_lot::Mutex;

struct TimerState {
    /// Accumulated playback seconds up to `started`.
    base: f64,
    /// Set while playing.
    started: Option<Instant>,
}

/// Monotonic playback clock with a paused/playing flag.
pub struct PlaybackTimer {
    state: Mutex<TimerState>,
}

impl PlaybackTimer {
    /// New timer, paused at zero.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TimerState {
                base: 0.0,
                started: None,
            }),
        }
    }

    /// Resume time advancement. No-op while already playing.
    pub fn play(&self) {
        let mut state = self.state.lock();
        if state.started.is_none() {
            state.started = Some(Instant::now());
        }
    }

    /// Suspend time advancement. No-op while already paused.
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if let Some(started) = state.started.take() {
            state.base += started.elapsed().as_secs_f64();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().started.is_none()
    }

    /// Jump the clock to `time` seconds, keeping the paused/playing
    /// disposition.
    pub fn seek(&self, time: f64) {
        let mut state = self.state.lock();
        state.base = time;
        if state.started.is_some() {
            state.started = Some(Instant::now());
        }
    }

    /// Current playback time in seconds.
    pub fn time(&self) -> f64 {
        let state = self.state.lock();
        match state.started {
            Some(started) => state.base + started.elapsed().as_secs_f64(),
            None => state.base,
        }
    }
}

impl Default for PlaybackTimer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
