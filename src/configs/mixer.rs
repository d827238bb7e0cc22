use serde::{Deserialize, Serialize};

/// Tunables of the mixing engine. None of the damping constants are
/// load-bearing; they only shape how the mix feels.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MixerConfig {
    pub sample_rate: u32,
    /// Render quantum length. One quantum becomes one output frame.
    pub quantum_ms: u64,
    /// Fraction of the remaining distance covered per frame tick.
    pub smoothing_factor: f32,
    pub smoothing_epsilon: f32,
    /// Rate of the level-animation loop (the display refresh stand-in).
    pub frame_rate_hz: u32,
    /// Minimum spacing of level updates sent to the channel player.
    pub audio_throttle_ms: u64,
    /// Quiet period before the forest matcher is consulted again.
    pub rematch_debounce_ms: u64,
    pub top_channels: usize,
    pub tier_soft_max: f32,
    pub tier_moderate_max: f32,
    /// Distance past a tier boundary required before a playing channel switches loops.
    pub tier_hysteresis: f32,
    pub keep_alive_gain: f32,
    pub keep_alive_frequency_hz: f32,
    /// Spawn the real-time render clock. Disabled for offline rendering.
    pub render_clock: bool,
    /// Silence the speakers while the secondary consumer carries the mix.
    pub mute_normal_output_in_pip: bool,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            quantum_ms: 20,
            smoothing_factor: 0.1,
            smoothing_epsilon: 0.001,
            frame_rate_hz: 60,
            audio_throttle_ms: 50,
            rematch_debounce_ms: 350,
            top_channels: 3,
            tier_soft_max: 0.33,
            tier_moderate_max: 0.66,
            tier_hysteresis: 0.02,
            keep_alive_gain: 0.001,
            keep_alive_frequency_hz: 440.0,
            render_clock: true,
            mute_normal_output_in_pip: true,
        }
    }
}

impl MixerConfig {
    pub fn frames_per_quantum(&self) -> usize {
        (self.sample_rate as u64 * self.quantum_ms / 1000) as usize
    }

    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_micros(1_000_000 / self.frame_rate_hz.max(1) as u64)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Health check period. `0` disables the background monitor task.
    pub interval_ms: u64,
    /// Recovering cycles tolerated without an intervening healthy tick.
    pub max_consecutive_recoveries: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            max_consecutive_recoveries: 3,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PlatformConfig {
    pub native_pip: bool,
    pub standard_pip: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            native_pip: false,
            standard_pip: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantum_is_twenty_ms_at_48k() {
        let config = MixerConfig::default();
        assert_eq!(config.frames_per_quantum(), 960);
    }

    #[test]
    fn partial_table_keeps_defaults() {
        let config: MixerConfig = toml::from_str("smoothing_factor = 0.2").unwrap();
        assert_eq!(config.smoothing_factor, 0.2);
        assert_eq!(config.audio_throttle_ms, 50);
        assert_eq!(config.rematch_debounce_ms, 350);
    }
}
