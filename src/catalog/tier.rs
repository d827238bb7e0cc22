use super::Intensity;
use crate::configs::MixerConfig;

/// Maps a level in `(0, 1]` to the loop variant that should be sounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierThresholds {
    pub soft_max: f32,
    pub moderate_max: f32,
    pub hysteresis: f32,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            soft_max: 0.33,
            moderate_max: 0.66,
            hysteresis: 0.0,
        }
    }
}

impl TierThresholds {
    pub fn from_config(config: &MixerConfig) -> Self {
        Self {
            soft_max: config.tier_soft_max,
            moderate_max: config.tier_moderate_max,
            hysteresis: config.tier_hysteresis.max(0.0),
        }
    }

    /// Fixed thresholds: soft up to and including `soft_max`, moderate up to
    /// and including `moderate_max`, strong above.
    pub fn classify(&self, level: f32) -> Intensity {
        if level <= self.soft_max {
            Intensity::Soft
        } else if level <= self.moderate_max {
            Intensity::Moderate
        } else {
            Intensity::Strong
        }
    }

    /// Like [`classify`](Self::classify), but a channel already playing
    /// `previous` keeps it until the level is more than `hysteresis` past the
    /// boundary it would cross.
    pub fn select(&self, level: f32, previous: Option<Intensity>) -> Intensity {
        let Some(previous) = previous else {
            return self.classify(level);
        };
        let h = self.hysteresis;

        match previous {
            Intensity::Soft if level > self.soft_max + h => self.classify(level),
            Intensity::Soft => Intensity::Soft,
            Intensity::Moderate if level <= self.soft_max - h => Intensity::Soft,
            Intensity::Moderate if level > self.moderate_max + h => Intensity::Strong,
            Intensity::Moderate => Intensity::Moderate,
            Intensity::Strong if level <= self.moderate_max - h => self.classify(level),
            Intensity::Strong => Intensity::Strong,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_band(h: f32) -> TierThresholds {
        TierThresholds {
            hysteresis: h,
            ..Default::default()
        }
    }

    #[test]
    fn classify_uses_inclusive_upper_bounds() {
        let t = TierThresholds::default();
        assert_eq!(t.classify(0.01), Intensity::Soft);
        assert_eq!(t.classify(0.33), Intensity::Soft);
        assert_eq!(t.classify(0.331), Intensity::Moderate);
        assert_eq!(t.classify(0.66), Intensity::Moderate);
        assert_eq!(t.classify(0.661), Intensity::Strong);
        assert_eq!(t.classify(1.0), Intensity::Strong);
    }

    #[test]
    fn zero_band_matches_classify() {
        let t = with_band(0.0);
        for &prev in &Intensity::ALL {
            for step in 1..=100 {
                let level = step as f32 / 100.0;
                assert_eq!(t.select(level, Some(prev)), t.classify(level), "{level} from {prev}");
            }
        }
    }

    #[test]
    fn band_holds_tier_near_boundary() {
        let t = with_band(0.02);
        assert_eq!(t.select(0.34, Some(Intensity::Soft)), Intensity::Soft);
        assert_eq!(t.select(0.32, Some(Intensity::Moderate)), Intensity::Moderate);
        assert_eq!(t.select(0.67, Some(Intensity::Moderate)), Intensity::Moderate);
        assert_eq!(t.select(0.65, Some(Intensity::Strong)), Intensity::Strong);
    }

    #[test]
    fn band_releases_past_the_margin() {
        let t = with_band(0.02);
        assert_eq!(t.select(0.40, Some(Intensity::Soft)), Intensity::Moderate);
        assert_eq!(t.select(0.30, Some(Intensity::Moderate)), Intensity::Soft);
        assert_eq!(t.select(0.90, Some(Intensity::Soft)), Intensity::Strong);
        assert_eq!(t.select(0.10, Some(Intensity::Strong)), Intensity::Soft);
    }

    #[test]
    fn fresh_channel_ignores_band() {
        let t = with_band(0.02);
        assert_eq!(t.select(0.34, None), Intensity::Moderate);
    }
}
