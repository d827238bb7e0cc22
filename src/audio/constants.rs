//! Central constants for the audio pipeline.
//!
//! Magic numbers in `src/audio/**` live here so they can be tuned in one
//! place and remain consistent across modules.

// ── Sample / PCM ─────────────────────────────────────────────────────────────

/// Mix rate every decoded loop is resampled to (Hz).
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Stereo channel count used throughout the graph.
pub const MIXER_CHANNELS: usize = 2;

// ── i16 PCM clip boundaries ──────────────────────────────────────────────────

pub const INT16_MAX_F: f32 = 32_767.0;
pub const INT16_MIN_F: f32 = -32_768.0;

// ── Frame fan-out ────────────────────────────────────────────────────────────

/// Frames buffered per track subscriber before new frames are dropped
/// (50 × 20 ms = 1 s of audio).
pub const TRACK_QUEUE_FRAMES: usize = 50;

// ── External layers ──────────────────────────────────────────────────────────

/// Ring-buffer capacity per external source, in samples (≈2.7 s at 48 kHz stereo).
pub const LAYER_BUFFER_SAMPLES: usize = 256 * 1_024;

// ── HTTP fetcher ─────────────────────────────────────────────────────────────

/// Keep-alive probe interval for pooled loop-download connections.
pub const HTTP_KEEPALIVE_SECS: u64 = 25;

pub const HTTP_USER_AGENT: &str = concat!("canopy/", env!("CARGO_PKG_VERSION"));
