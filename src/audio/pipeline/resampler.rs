/// Linear-interpolating sample-rate converter for interleaved PCM.
///
/// Keeps the last input frame between calls so consecutive packets join
/// without a discontinuity.
pub struct Resampler {
    ratio: f64,
    index: f64,
    last_frame: Vec<i16>,
    channels: usize,
}

impl Resampler {
    pub fn new(source_rate: u32, target_rate: u32, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            ratio: source_rate.max(1) as f64 / target_rate.max(1) as f64,
            index: 0.0,
            last_frame: vec![0; channels],
            channels,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        (self.ratio - 1.0).abs() < f64::EPSILON
    }

    /// Resample `input` and append the output frames to `output`.
    pub fn process(&mut self, input: &[i16], output: &mut Vec<i16>) {
        if self.is_passthrough() {
            output.extend_from_slice(input);
            return;
        }

        let channels = self.channels;
        let num_frames = input.len() / channels;
        if num_frames == 0 {
            return;
        }

        while self.index < num_frames as f64 {
            let idx = self.index as usize;
            let fract = self.index.fract() as f32;

            for c in 0..channels {
                let s1 = if idx == 0 {
                    self.last_frame[c] as f32
                } else {
                    input[(idx - 1) * channels + c] as f32
                };
                let s2 = input[idx * channels + c] as f32;

                output.push((s1 * (1.0 - fract) + s2 * fract) as i16);
            }

            self.index += self.ratio;
        }

        self.index -= num_frames as f64;
        self.last_frame
            .copy_from_slice(&input[(num_frames - 1) * channels..num_frames * channels]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_a_copy() {
        let mut r = Resampler::new(48_000, 48_000, 2);
        let mut out = Vec::new();
        r.process(&[1, 2, 3, 4], &mut out);
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn upsampling_doubles_frame_count() {
        let mut r = Resampler::new(24_000, 48_000, 1);
        let mut out = Vec::new();
        r.process(&[1000; 100], &mut out);
        r.process(&[1000; 100], &mut out);
        assert_eq!(out.len(), 400);
        assert!(out[10..].iter().all(|&s| s == 1000));
    }

    #[test]
    fn downsampling_halves_frame_count() {
        let mut r = Resampler::new(96_000, 48_000, 2);
        let mut out = Vec::new();
        r.process(&[0; 400], &mut out);
        assert_eq!(out.len(), 200);
    }
}
