//! # Reel Core
//!
//! Pure Rust clip decode and playback pipeline.
//!
//! A [`clip::Clip`] turns a compressed container into timestamped pixel
//! frames and audio packets. The demuxer, video codec, and audio device are
//! external collaborators behind the traits in [`media`]; format selection
//! happens by signature probing through a [`formats::FormatRegistry`].

// ============================================================================
// Playback Data Structures
// ============================================================================
pub mod audio;
pub mod frame;
pub mod frame_queue;

// ============================================================================
// Timing
// ============================================================================
pub mod timer;

// ============================================================================
// Decode Pipeline
// ============================================================================
pub mod clip;
pub mod formats;
pub mod media;
pub mod pixel;
pub mod worker;

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
