use std::{sync::Arc, time::Duration};

/// A fully decoded loop: interleaved i16 PCM at the mix rate.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: usize,
}

/// Shared handle to a decoded loop. Voices hold their own clone, so a cache
/// entry can be evicted or replaced while the loop keeps sounding.
pub type DecodedBuffer = Arc<PcmBuffer>;

impl PcmBuffer {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: usize) -> Self {
        let channels = channels.max(1);
        let mut samples = samples;
        // Partial trailing frames would desync the channel interleave on wrap.
        samples.truncate(samples.len() - samples.len() % channels);
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}
