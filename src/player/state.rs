use std::{collections::VecDeque, time::Instant};

use serde::Serialize;

use crate::{
    audio::GainNode,
    catalog::Intensity,
    common::{AssetId, ChannelName, ContextId, VoiceId},
};

/// Tiers remembered per channel for diagnostics.
const TIER_HISTORY: usize = 16;

/// The one loop currently sounding for a channel.
#[derive(Debug, Clone)]
pub struct PlayingInstance {
    pub voice: VoiceId,
    pub context: ContextId,
    pub asset: AssetId,
    pub tier: Intensity,
    pub gain: GainNode,
    pub started_at: Instant,
}

#[derive(Debug, Default)]
pub struct ChannelState {
    /// Last level applied to the channel.
    pub level: f32,
    pub playing: Option<PlayingInstance>,
    pub last_tier: Option<Intensity>,
    pub tier_history: VecDeque<Intensity>,
    pub starts: u64,
    pub stops: u64,
    pub unavailable: u64,
}

impl ChannelState {
    pub fn is_active(&self) -> bool {
        self.playing.is_some()
    }

    pub fn playing_asset(&self) -> Option<&AssetId> {
        self.playing.as_ref().map(|p| &p.asset)
    }

    pub(crate) fn record_start(&mut self, instance: PlayingInstance) {
        if self.tier_history.len() == TIER_HISTORY {
            self.tier_history.pop_front();
        }
        self.tier_history.push_back(instance.tier);
        self.last_tier = Some(instance.tier);
        self.level = instance.gain.get();
        self.playing = Some(instance);
        self.starts += 1;
    }

    pub fn snapshot(&self, channel: &ChannelName) -> ChannelSnapshot {
        ChannelSnapshot {
            channel: channel.clone(),
            level: self.level,
            active: self.is_active(),
            playing_asset: self.playing_asset().cloned(),
            tier: self.playing.as_ref().map(|p| p.tier),
            tier_history: self.tier_history.iter().copied().collect(),
            starts: self.starts,
            stops: self.stops,
            unavailable: self.unavailable,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub channel: ChannelName,
    pub level: f32,
    pub active: bool,
    pub playing_asset: Option<AssetId>,
    pub tier: Option<Intensity>,
    pub tier_history: Vec<Intensity>,
    pub starts: u64,
    pub stops: u64,
    pub unavailable: u64,
}

/// What a `set_level` call ended up doing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum LevelOutcome {
    /// The channel is silent.
    Stopped,
    /// Same tier: only the live gain changed.
    GainUpdated,
    /// A new loop variant started at the requested gain.
    Started { asset: AssetId, tier: Intensity },
    /// A newer level arrived while this one waited for its buffer.
    Superseded,
    /// The variant could not be loaded; the channel kept what it had.
    Unavailable,
}
