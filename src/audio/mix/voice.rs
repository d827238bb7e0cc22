//! A single looping buffer and the gain it is heard at.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Instant,
};

use crate::{
    audio::buffer::DecodedBuffer,
    common::{AssetId, VoiceId},
};

/// Live gain shared between the channel player (writer) and the render
/// thread (reader). Stored as `f32` bits.
#[derive(Clone, Debug)]
pub struct GainNode(Arc<AtomicU32>);

impl GainNode {
    pub fn new(gain: f32) -> Self {
        Self(Arc::new(AtomicU32::new(gain.clamp(0.0, 1.0).to_bits())))
    }

    pub fn set(&self, gain: f32) {
        self.0.store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }
}

/// One sounding loop. Rendering wraps at the end of the buffer forever.
pub struct LoopVoice {
    id: VoiceId,
    asset: AssetId,
    buffer: DecodedBuffer,
    gain: GainNode,
    /// Gain applied at the end of the previous quantum; ramps toward `gain`.
    applied_gain: f32,
    cursor: usize,
    started_at: Instant,
    frames_rendered: u64,
}

impl LoopVoice {
    pub fn new(id: VoiceId, asset: AssetId, buffer: DecodedBuffer, gain: GainNode) -> Self {
        let applied_gain = gain.get();
        Self {
            id,
            asset,
            buffer,
            gain,
            applied_gain,
            cursor: 0,
            started_at: Instant::now(),
            frames_rendered: 0,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    pub fn gain(&self) -> &GainNode {
        &self.gain
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Add one quantum of this voice into `acc` (interleaved stereo).
    ///
    /// A gain change since the last quantum is ramped linearly across the
    /// quantum instead of being applied as a step.
    pub fn render(&mut self, acc: &mut [i32]) {
        let samples = self.buffer.samples();
        let target = self.gain.get();
        let start = self.applied_gain;
        self.applied_gain = target;

        if samples.is_empty() || acc.is_empty() {
            return;
        }

        let channels = self.buffer.channels();
        let frames = acc.len() / channels;
        let step = (target - start) / frames.max(1) as f32;

        for (frame_idx, frame) in acc.chunks_exact_mut(channels).enumerate() {
            let g = start + step * (frame_idx + 1) as f32;
            for slot in frame.iter_mut() {
                *slot += (samples[self.cursor] as f32 * g).round() as i32;
                self.cursor += 1;
                if self.cursor >= samples.len() {
                    self.cursor = 0;
                }
            }
        }
        self.frames_rendered += frames as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::PcmBuffer;

    fn voice(samples: Vec<i16>, gain: f32) -> LoopVoice {
        LoopVoice::new(
            VoiceId(1),
            AssetId::from("rain-soft"),
            Arc::new(PcmBuffer::new(samples, 48_000, 2)),
            GainNode::new(gain),
        )
    }

    #[test]
    fn gain_is_clamped() {
        let g = GainNode::new(3.0);
        assert_eq!(g.get(), 1.0);
        g.set(-1.0);
        assert_eq!(g.get(), 0.0);
    }

    #[test]
    fn loops_past_the_end_of_the_buffer() {
        let mut v = voice(vec![100, 100, 200, 200], 1.0);
        let mut acc = vec![0i32; 8];
        v.render(&mut acc);
        assert_eq!(acc, vec![100, 100, 200, 200, 100, 100, 200, 200]);
        assert_eq!(v.frames_rendered(), 4);
    }

    #[test]
    fn gain_change_ramps_across_the_quantum() {
        let mut v = voice(vec![1000; 8], 0.0);
        v.gain().set(1.0);

        let mut acc = vec![0i32; 8];
        v.render(&mut acc);
        assert_eq!(acc, vec![250, 250, 500, 500, 750, 750, 1000, 1000]);

        let mut acc = vec![0i32; 4];
        v.render(&mut acc);
        assert_eq!(acc, vec![1000; 4]);
    }
}
