/// Linear gain ramp applied on the decode side as samples enter the ring.
///
/// A ramp is scheduled with a target and a duration; `apply` advances it
/// frame by frame so gain changes never step audibly.
#[derive(Debug, Clone)]
pub struct VolumeRamp {
    current: f32,
    target: f32,
    /// Per-frame gain increment while ramping.
    step: f32,
    remaining_frames: u32,
}

impl VolumeRamp {
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial.clamp(0.0, 1.0),
            target: initial.clamp(0.0, 1.0),
            step: 0.0,
            remaining_frames: 0,
        }
    }

    pub fn gain(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// Schedule a linear ramp to `target` over `duration_ms`. A zero
    /// duration applies immediately.
    pub fn ramp_to(&mut self, target: f32, duration_ms: u32, sample_rate: u32) {
        self.target = target.clamp(0.0, 1.0);
        let frames = (duration_ms as u64 * sample_rate as u64 / 1000) as u32;
        if frames == 0 {
            self.current = self.target;
            self.remaining_frames = 0;
            self.step = 0.0;
            return;
        }
        self.remaining_frames = frames;
        self.step = (self.target - self.current) / frames as f32;
    }

    /// Scale interleaved samples in place, advancing any active ramp.
    pub fn apply(&mut self, samples: &mut [i16], channels: usize) {
        if self.remaining_frames == 0 && (self.current - 1.0).abs() < f32::EPSILON {
            return;
        }
        for frame in samples.chunks_exact_mut(channels.max(1)) {
            if self.remaining_frames > 0 {
                self.current += self.step;
                self.remaining_frames -= 1;
                if self.remaining_frames == 0 {
                    self.current = self.target;
                }
            }
            for sample in frame.iter_mut() {
                *sample = (*sample as f32 * self.current).clamp(i16::MIN as f32, i16::MAX as f32)
                    as i16;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_change_with_zero_duration() {
        let mut ramp = VolumeRamp::new(1.0);
        ramp.ramp_to(0.5, 0, 48_000);
        assert_eq!(ramp.gain(), 0.5);

        let mut samples = [10_000i16; 4];
        ramp.apply(&mut samples, 2);
        assert!(samples.iter().all(|&s| s == 5_000));
    }

    #[test]
    fn ramp_moves_gain_gradually() {
        let mut ramp = VolumeRamp::new(0.0);
        // 10 ms at 1 kHz = 10 frames.
        ramp.ramp_to(1.0, 10, 1_000);

        let mut first = [10_000i16; 1];
        ramp.apply(&mut first, 1);
        let mut last = [10_000i16; 1];
        for _ in 0..9 {
            ramp.apply(&mut last, 1);
            last = [10_000i16; 1];
        }
        ramp.apply(&mut last, 1);
        assert!(first[0] < 2_000);
        assert_eq!(last[0], 10_000);
        assert_eq!(ramp.gain(), 1.0);
    }

    #[test]
    fn unity_gain_leaves_samples_untouched() {
        let mut ramp = VolumeRamp::new(1.0);
        let mut samples = [1234i16, -1234];
        ramp.apply(&mut samples, 2);
        assert_eq!(samples, [1234, -1234]);
    }
}
