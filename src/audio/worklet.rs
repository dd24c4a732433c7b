use log::debug;

use super::ring::RingReader;

/// Samples are rendered in blocks of 128 frames, matching the host audio
/// callback quantum.
pub const FRAMES_PER_QUANTUM: usize = 128;

const DEFAULT_PREROLL_MS: u32 = 8;
const DEFAULT_RAMP_MS: u32 = 5;
const MAX_PREROLL_MS: u32 = 40;

/// Soft underruns in a row before the preroll target grows.
const SOFT_UNDERRUN_LIMIT: u32 = 4;
/// Full quanta in a row before the preroll target shrinks back.
const STABLE_QUANTA_LIMIT: u32 = 128;

/// What one render call did, for the host's underrun accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    /// Samples actually taken from the ring.
    pub delivered: usize,
    /// A hard underrun happened and priming restarted.
    pub underrun: bool,
    /// First full quantum after an underrun.
    pub recovered: bool,
}

fn quanta_for(ms: u32, sample_rate: u32) -> u32 {
    ((ms as u64 * sample_rate as u64).div_ceil(1000 * FRAMES_PER_QUANTUM as u64) as u32).max(1)
}

/// Ring consumer living on the audio-driver thread.
///
/// Refuses to emit sound until the preroll target is buffered, holds the
/// last sample across gaps instead of clicking, ramps back in after
/// discontinuities and adapts the preroll target to observed starvation.
pub struct PcmWorklet {
    reader: RingReader,
    channels: usize,
    sample_rate: u32,

    base_preroll_quanta: u32,
    target_preroll_quanta: u32,
    max_preroll_quanta: u32,

    ramp_frames: u32,
    /// Frames left in the active ramp; 0 when idle.
    ramp_remaining: u32,
    ramp_from: Vec<i16>,

    priming: bool,
    in_underrun: bool,
    soft_underrun_streak: u32,
    stable_full_streak: u32,

    /// Last emitted sample per channel, for clickless hold and padding.
    hold: Vec<i16>,
}

impl PcmWorklet {
    pub fn new(reader: RingReader, channels: usize, sample_rate: u32) -> Self {
        let base = quanta_for(DEFAULT_PREROLL_MS, sample_rate);
        Self {
            reader,
            channels,
            sample_rate,
            base_preroll_quanta: base,
            target_preroll_quanta: base,
            max_preroll_quanta: quanta_for(MAX_PREROLL_MS, sample_rate),
            ramp_frames: (DEFAULT_RAMP_MS * sample_rate).div_ceil(1000),
            ramp_remaining: 0,
            ramp_from: vec![0; channels],
            priming: true,
            in_underrun: false,
            soft_underrun_streak: 0,
            stable_full_streak: 0,
            hold: vec![0; channels],
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn target_preroll_quanta(&self) -> u32 {
        self.target_preroll_quanta
    }

    pub fn base_preroll_quanta(&self) -> u32 {
        self.base_preroll_quanta
    }

    /// Raise the working preroll target. Never drops below the base target.
    pub fn set_preroll_ms(&mut self, ms: u32) {
        let requested = quanta_for(ms, self.sample_rate);
        self.target_preroll_quanta = self
            .target_preroll_quanta
            .max(requested)
            .min(self.max_preroll_quanta);
    }

    pub fn set_ramp_ms(&mut self, ms: u32) {
        self.ramp_frames = (ms * self.sample_rate).div_ceil(1000);
    }

    fn preroll_samples(&self) -> usize {
        self.target_preroll_quanta as usize * FRAMES_PER_QUANTUM * self.channels
    }

    fn begin_ramp(&mut self) {
        self.ramp_remaining = self.ramp_frames;
        self.ramp_from.copy_from_slice(&self.hold);
    }

    fn fill_hold(&self, out: &mut [i16]) {
        for frame in out.chunks_exact_mut(self.channels) {
            frame.copy_from_slice(&self.hold);
        }
    }

    fn update_hold(&mut self, out: &[i16]) {
        if out.len() >= self.channels {
            self.hold
                .copy_from_slice(&out[out.len() - self.channels..]);
        }
    }

    /// Crossfade from the held sample into the fresh stream.
    fn apply_ramp(&mut self, out: &mut [i16]) {
        if self.ramp_remaining == 0 || self.ramp_frames == 0 {
            return;
        }
        let total = self.ramp_frames as f32;
        for frame in out.chunks_exact_mut(self.channels) {
            if self.ramp_remaining == 0 {
                break;
            }
            let progress = 1.0 - self.ramp_remaining as f32 / total;
            for (ch, sample) in frame.iter_mut().enumerate() {
                let held = self.ramp_from[ch] as f32;
                let fresh = *sample as f32;
                *sample = (held + (fresh - held) * progress) as i16;
            }
            self.ramp_remaining -= 1;
        }
    }

    fn bump_target(&mut self) {
        if self.target_preroll_quanta < self.max_preroll_quanta {
            self.target_preroll_quanta += 1;
            debug!(
                "preroll target raised to {} quanta",
                self.target_preroll_quanta
            );
        }
    }

    /// Render one quantum. `out.len()` must be a multiple of the channel
    /// count; the usual block is `FRAMES_PER_QUANTUM * channels`.
    pub fn render(&mut self, out: &mut [i16]) -> RenderReport {
        debug_assert_eq!(out.len() % self.channels, 0);
        let mut report = RenderReport::default();

        if self.priming {
            if self.reader.available() < self.preroll_samples() {
                out.fill(0);
                return report;
            }
            self.priming = false;
            self.begin_ramp();
        }

        let available = self.reader.available();
        let aligned = available - available % self.channels;

        if aligned == 0 {
            // Hard underrun: hold the line, grow the target, re-prime.
            self.fill_hold(out);
            if !self.in_underrun {
                report.underrun = true;
                self.in_underrun = true;
            }
            self.bump_target();
            self.priming = true;
            self.soft_underrun_streak = 0;
            self.stable_full_streak = 0;
            return report;
        }

        let n = aligned.min(out.len());
        let taken = self.reader.pop_slice(&mut out[..n]);
        debug_assert_eq!(taken, n);
        report.delivered = n;
        self.apply_ramp(&mut out[..n]);
        self.update_hold(&out[..n]);

        if n < out.len() {
            // Short delivery: pad with the last emitted sample.
            let hold = self.hold.clone();
            for frame in out[n..].chunks_exact_mut(self.channels) {
                frame.copy_from_slice(&hold);
            }
            self.stable_full_streak = 0;
            self.soft_underrun_streak += 1;
            if self.soft_underrun_streak >= SOFT_UNDERRUN_LIMIT {
                self.bump_target();
                self.soft_underrun_streak = 0;
            }
        } else {
            self.soft_underrun_streak = 0;
            if self.in_underrun {
                report.recovered = true;
                self.in_underrun = false;
            }
            self.stable_full_streak += 1;
            if self.stable_full_streak >= STABLE_QUANTA_LIMIT
                && self.target_preroll_quanta > self.base_preroll_quanta
            {
                self.target_preroll_quanta -= 1;
                self.stable_full_streak = 0;
            }
        }

        report
    }
}
