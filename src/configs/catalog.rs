use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CatalogConfig {
    /// Prefix joined to every relative loop URL.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelAssetsConfig>,
}

/// The three pre-rendered loops of one channel.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChannelAssetsConfig {
    pub soft: String,
    pub moderate: String,
    pub strong: String,
}

/// A named forest and the sound profile it is recognised by.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ForestConfig {
    pub name: String,
    /// Accent colour applied to the UI while this forest is matched.
    #[serde(default)]
    pub theme: Option<String>,
    pub profile: BTreeMap<String, f32>,
}
