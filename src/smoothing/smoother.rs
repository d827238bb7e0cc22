//! Per-channel level followers.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::common::ChannelName;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChannelLevel {
    /// Smoothed, audible level.
    pub current: f32,
    /// Latched from the UI.
    pub target: f32,
}

/// Moves every channel's `current` toward its `target` by a fixed fraction
/// per tick and snaps once within `epsilon`.
pub struct SmootherBank {
    factor: f32,
    epsilon: f32,
    levels: BTreeMap<ChannelName, ChannelLevel>,
    settling: BTreeSet<ChannelName>,
}

impl SmootherBank {
    pub fn new(factor: f32, epsilon: f32) -> Self {
        Self {
            factor: factor.clamp(f32::EPSILON, 1.0),
            epsilon: epsilon.max(0.0),
            levels: BTreeMap::new(),
            settling: BTreeSet::new(),
        }
    }

    pub fn set_target(&mut self, channel: &ChannelName, target: f32) {
        let level = self.levels.entry(channel.clone()).or_default();
        level.target = target;
        if level.current != target {
            self.settling.insert(channel.clone());
        }
    }

    /// Advance every unsettled channel once. Returns the channels whose
    /// level moved, with their new level.
    pub fn tick(&mut self) -> Vec<(ChannelName, f32)> {
        let mut moved = Vec::with_capacity(self.settling.len());
        let factor = self.factor;
        let epsilon = self.epsilon;
        let levels = &mut self.levels;

        self.settling.retain(|channel| {
            let Some(level) = levels.get_mut(channel) else {
                return false;
            };
            level.current += (level.target - level.current) * factor;
            let settled = (level.target - level.current).abs() < epsilon;
            if settled {
                level.current = level.target;
            }
            moved.push((channel.clone(), level.current));
            !settled
        });

        moved
    }

    pub fn is_settled(&self, channel: &ChannelName) -> bool {
        !self.settling.contains(channel)
    }

    /// Whether any channel still needs ticks.
    pub fn needs_tick(&self) -> bool {
        !self.settling.is_empty()
    }

    pub fn get(&self, channel: &str) -> Option<ChannelLevel> {
        self.levels.get(channel).copied()
    }

    pub fn levels(&self) -> impl Iterator<Item = (&ChannelName, &ChannelLevel)> {
        self.levels.iter()
    }
}
