//! Static sound catalog: every channel owns exactly three loop variants.

pub mod tier;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    common::{AssetId, ChannelName, ConfigError},
    configs::CatalogConfig,
};

pub use tier::TierThresholds;

/// Loudness tier of a loop variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Soft,
    Moderate,
    Strong,
}

impl Intensity {
    pub const ALL: [Intensity; 3] = [Intensity::Soft, Intensity::Moderate, Intensity::Strong];

    pub fn as_str(self) -> &'static str {
        match self {
            Intensity::Soft => "soft",
            Intensity::Moderate => "moderate",
            Intensity::Strong => "strong",
        }
    }
}

impl std::fmt::Display for Intensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopAsset {
    pub id: AssetId,
    pub url: String,
    pub intensity: Intensity,
}

#[derive(Debug, Clone)]
pub struct ChannelLoops {
    soft: LoopAsset,
    moderate: LoopAsset,
    strong: LoopAsset,
}

impl ChannelLoops {
    pub fn get(&self, intensity: Intensity) -> &LoopAsset {
        match intensity {
            Intensity::Soft => &self.soft,
            Intensity::Moderate => &self.moderate,
            Intensity::Strong => &self.strong,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoopAsset> {
        [&self.soft, &self.moderate, &self.strong].into_iter()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SoundCatalog {
    channels: BTreeMap<ChannelName, ChannelLoops>,
}

impl SoundCatalog {
    pub fn from_config(config: &CatalogConfig) -> Result<Self, ConfigError> {
        let mut catalog = Self::default();
        for (name, assets) in &config.channels {
            let base = config.base_url.as_deref();
            let soft = resolve_url(base, &assets.soft);
            let moderate = resolve_url(base, &assets.moderate);
            let strong = resolve_url(base, &assets.strong);
            catalog.insert(name, [&soft, &moderate, &strong])?;
        }
        Ok(catalog)
    }

    /// Register a channel from its soft, moderate and strong loop URLs.
    pub fn insert(&mut self, name: &str, urls: [&str; 3]) -> Result<(), ConfigError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::Catalog {
                channel: name.to_string(),
                reason: "channel name is empty".into(),
            });
        }

        let make = |intensity: Intensity, url: &str| {
            if url.trim().is_empty() {
                return Err(ConfigError::Catalog {
                    channel: name.to_string(),
                    reason: format!("{} loop has no url", intensity),
                });
            }
            Ok(LoopAsset {
                id: AssetId(format!("{}-{}", name, intensity)),
                url: url.to_string(),
                intensity,
            })
        };

        let [soft, moderate, strong] = urls;
        let loops = ChannelLoops {
            soft: make(Intensity::Soft, soft)?,
            moderate: make(Intensity::Moderate, moderate)?,
            strong: make(Intensity::Strong, strong)?,
        };

        self.channels.insert(ChannelName::from(name), loops);
        Ok(())
    }

    pub fn get(&self, channel: &str) -> Option<&ChannelLoops> {
        self.channels.get(channel)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelName> {
        self.channels.keys()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

fn resolve_url(base: Option<&str>, url: &str) -> String {
    let is_absolute = url.contains("://") || url.starts_with('/');
    match base {
        Some(base) if !is_absolute => {
            format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
        }
        _ => url.to_string(),
    }
}
