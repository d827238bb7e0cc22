//! Which forest does the current mix sound like?

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{common::ChannelName, configs::ForestConfig};

/// Matches below this cosine score are reported as "no forest".
const MIN_SCORE: f32 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForestMatch {
    pub name: String,
    pub theme: Option<String>,
    pub score: f32,
}

pub trait ForestMatcher: Send + Sync {
    fn best_match(&self, levels: &BTreeMap<ChannelName, f32>) -> Option<ForestMatch>;
}

/// Scores each configured forest by cosine similarity between its profile
/// and the active levels.
pub struct ProfileMatcher {
    forests: Vec<ForestConfig>,
    min_score: f32,
}

impl ProfileMatcher {
    pub fn new(forests: Vec<ForestConfig>) -> Self {
        Self {
            forests,
            min_score: MIN_SCORE,
        }
    }

    pub fn len(&self) -> usize {
        self.forests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forests.is_empty()
    }
}

impl ForestMatcher for ProfileMatcher {
    fn best_match(&self, levels: &BTreeMap<ChannelName, f32>) -> Option<ForestMatch> {
        let mix_norm = levels.values().map(|v| v * v).sum::<f32>().sqrt();
        if mix_norm == 0.0 {
            return None;
        }

        self.forests
            .iter()
            .filter_map(|forest| {
                let profile_norm = forest.profile.values().map(|v| v * v).sum::<f32>().sqrt();
                if profile_norm == 0.0 {
                    return None;
                }
                let dot: f32 = forest
                    .profile
                    .iter()
                    .filter_map(|(channel, weight)| levels.get(channel.as_str()).map(|l| l * weight))
                    .sum();
                Some(ForestMatch {
                    name: forest.name.clone(),
                    theme: forest.theme.clone(),
                    score: dot / (mix_norm * profile_norm),
                })
            })
            .filter(|m| m.score >= self.min_score)
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }
}
