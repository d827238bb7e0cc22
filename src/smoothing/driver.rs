//! `LevelDriver`: the three damping layers between the UI and the mix.
//!
//! 1. Smoothing every frame tick (audible glides).
//! 2. A per-channel throttle on what reaches the channel player.
//! 3. A trailing debounce before the active set is re-published.

use std::{
    collections::{BTreeMap, HashMap},
    time::{Duration, Instant},
};

use serde::Serialize;

use super::{debounce::Debouncer, smoother::SmootherBank, throttle::Throttle};
use crate::{common::ChannelName, configs::MixerConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveChannels {
    /// Highest smoothed levels first, at most `top_channels` long.
    pub top_channels: Vec<ChannelName>,
    /// Smoothed level of every audible channel.
    pub levels: BTreeMap<ChannelName, f32>,
}

#[derive(Debug, Default)]
pub struct TickOutput {
    /// Levels to forward to the channel player.
    pub audio: Vec<(ChannelName, f32)>,
    /// Set when the rematch debounce elapsed this tick.
    pub rematch: Option<ActiveChannels>,
}

pub struct LevelDriver {
    bank: SmootherBank,
    throttles: HashMap<ChannelName, Throttle>,
    throttle_interval: Duration,
    rematch: Debouncer,
    top_n: usize,
}

impl LevelDriver {
    pub fn new(config: &MixerConfig) -> Self {
        Self {
            bank: SmootherBank::new(config.smoothing_factor, config.smoothing_epsilon),
            throttles: HashMap::new(),
            throttle_interval: Duration::from_millis(config.audio_throttle_ms),
            rematch: Debouncer::new(Duration::from_millis(config.rematch_debounce_ms)),
            top_n: config.top_channels,
        }
    }

    /// Latch a new target. Values outside `[0, 1]` are clamped.
    pub fn set_target(&mut self, channel: &ChannelName, value: f32) {
        self.bank.set_target(channel, value.clamp(0.0, 1.0));
    }

    pub fn tick(&mut self, now: Instant) -> TickOutput {
        let mut out = TickOutput::default();

        for (channel, level) in self.bank.tick() {
            let settled = self.bank.is_settled(&channel);
            let throttle = self
                .throttles
                .entry(channel.clone())
                .or_insert_with(|| Throttle::new(self.throttle_interval));
            if let Some(level) = throttle.offer(now, level, settled) {
                out.audio.push((channel, level));
            }
            self.rematch.touch(now);
        }

        if self.rematch.poll(now) {
            out.rematch = Some(self.active());
        }
        out
    }

    /// Nothing left to smooth and no rematch pending.
    pub fn is_idle(&self) -> bool {
        !self.bank.needs_tick() && !self.rematch.is_pending()
    }

    pub fn levels(&self) -> BTreeMap<ChannelName, f32> {
        self.bank
            .levels()
            .map(|(name, level)| (name.clone(), level.current))
            .collect()
    }

    pub fn target(&self, channel: &str) -> Option<f32> {
        self.bank.get(channel).map(|l| l.target)
    }

    pub fn active(&self) -> ActiveChannels {
        let levels: BTreeMap<ChannelName, f32> = self
            .bank
            .levels()
            .filter(|(_, level)| level.current > 0.0)
            .map(|(name, level)| (name.clone(), level.current))
            .collect();

        let mut ranked: Vec<(&ChannelName, f32)> = levels.iter().map(|(n, &l)| (n, l)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let top_channels = ranked
            .into_iter()
            .take(self.top_n)
            .map(|(name, _)| name.clone())
            .collect();

        ActiveChannels {
            top_channels,
            levels,
        }
    }
}
