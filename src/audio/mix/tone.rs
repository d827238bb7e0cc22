use std::f32::consts::TAU;

/// Near-silent sine oscillator that keeps a stream carrying live audio while
/// no channel is playing into it.
pub struct KeepAliveTone {
    frequency: f32,
    gain: f32,
    sample_rate: u32,
    phase: f32,
}

impl KeepAliveTone {
    pub fn new(frequency: f32, gain: f32, sample_rate: u32) -> Self {
        Self {
            frequency,
            gain: gain.clamp(0.0, 1.0),
            sample_rate: sample_rate.max(1),
            phase: 0.0,
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Add one quantum of interleaved stereo into `acc`.
    pub fn render(&mut self, acc: &mut [i32]) {
        let step = TAU * self.frequency / self.sample_rate as f32;
        let amplitude = self.gain * i16::MAX as f32;
        for frame in acc.chunks_exact_mut(2) {
            let s = (self.phase.sin() * amplitude).round() as i32;
            frame[0] += s;
            frame[1] += s;
            self.phase = (self.phase + step) % TAU;
        }
    }
}
