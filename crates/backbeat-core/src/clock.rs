//! Sample-domain step timing: grid boundaries, swing, humanize math

use crate::pattern::STEPS_PER_PATTERN;

/// Tempo glide time constant while playing (tap tempo ramps, §4.6).
const GLIDE_SECONDS: f64 = 0.1;

/// A nominal grid boundary inside a render block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepBoundary {
    /// Step index in 0..16
    pub index: usize,
    /// Absolute sample position of the (un-swung) grid slot
    pub at_sample: u64,
}

/// Converts tempo into 16th-note step boundaries over a continuous sample
/// timeline. The effective BPM glides toward the target while playing so tap
/// tempo lands smoothly; `reset` snaps it.
#[derive(Debug, Clone)]
pub struct StepClock {
    sample_rate: u32,
    bpm: f64,
    step_index: usize,
    /// Next grid boundary, kept in f64 so fractional step durations do not
    /// drift over long runs
    next_step: f64,
}

impl StepClock {
    pub fn new(sample_rate: u32, bpm: f64) -> Self {
        let mut clock = Self {
            sample_rate,
            bpm: 120.0,
            step_index: 0,
            next_step: 0.0,
        };
        clock.reset(bpm);
        clock
    }

    /// Snap to the given tempo and rewind the cursor to step 0.
    pub fn reset(&mut self, bpm: f64) {
        self.set_bpm(bpm);
        self.step_index = 0;
        self.next_step = 0.0;
    }

    fn set_bpm(&mut self, bpm: f64) {
        assert!(
            bpm.is_finite() && bpm > 0.0,
            "non-finite or non-positive tempo: {bpm}"
        );
        self.bpm = bpm;
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Nominal 16th-note duration in samples at the current tempo.
    pub fn step_duration_samples(&self) -> f64 {
        let duration = self.sample_rate as f64 * 60.0 / self.bpm / 4.0;
        assert!(
            duration.is_finite() && duration > 0.0,
            "invalid step duration: {duration}"
        );
        duration
    }

    /// Swing delay in samples for odd-indexed steps: `swing * 0.1 * (60/bpm)`
    /// seconds. Even steps are never delayed.
    pub fn swing_offset_samples(&self, swing: f32, step_index: usize) -> f64 {
        if step_index % 2 == 0 || swing <= 0.0 {
            return 0.0;
        }
        let offset = swing as f64 * 0.1 * (60.0 / self.bpm) * self.sample_rate as f64;
        assert!(offset.is_finite() && offset >= 0.0, "invalid swing offset: {offset}");
        offset
    }

    /// Spacing between ratchet sub-triggers: a quarter of the step.
    pub fn ratchet_spacing_samples(&self) -> f64 {
        self.step_duration_samples() / 4.0
    }

    /// Ease the effective tempo toward `target` over roughly
    /// `GLIDE_SECONDS`. Called once per render block while playing.
    pub fn glide_toward(&mut self, target: f64, frames: usize) {
        assert!(target.is_finite() && target > 0.0, "invalid target tempo: {target}");
        if (self.bpm - target).abs() < 0.01 {
            self.bpm = target;
            return;
        }
        let alpha = 1.0 - (-(frames as f64) / (GLIDE_SECONDS * self.sample_rate as f64)).exp();
        self.set_bpm(self.bpm + (target - self.bpm) * alpha);
    }

    /// Collect every grid boundary that falls inside
    /// `[block_start, block_start + frames)`, advancing the cursor past them.
    /// `out` is reused to keep the audio path allocation-free.
    pub fn take_boundaries(&mut self, block_start: u64, frames: usize, out: &mut Vec<StepBoundary>) {
        out.clear();
        let block_end = (block_start + frames as u64) as f64;
        while self.next_step < block_end {
            out.push(StepBoundary {
                index: self.step_index,
                at_sample: self.next_step.round() as u64,
            });
            self.next_step += self.step_duration_samples();
            self.step_index = (self.step_index + 1) % STEPS_PER_PATTERN;
        }
    }
}

/// Per-voice trigger-time jitter in samples: `humanize * (rand - 0.5) * 0.02`
/// seconds, where `rand` is uniform in [0, 1). May be negative; the scheduler
/// clamps triggers to the step's block.
pub fn humanize_offset_samples(humanize: f32, rand: f32, sample_rate: u32) -> f64 {
    humanize as f64 * (rand as f64 - 0.5) * 0.02 * sample_rate as f64
}

/// Attenuate-only velocity jitter: multiplier in [0.7, 1.0], identity at
/// `humanize = 0`.
pub fn humanize_velocity_mult(humanize: f32, rand: f32) -> f32 {
    1.0 - 0.3 * rand * humanize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_at_120_bpm() {
        // 48000 * 60 / 120 / 4 = 6000 samples per 16th
        let mut clock = StepClock::new(48_000, 120.0);
        let mut out = Vec::new();
        clock.take_boundaries(0, 48_000, &mut out);
        assert_eq!(out.len(), 8);
        for (i, b) in out.iter().enumerate() {
            assert_eq!(b.index, i);
            assert_eq!(b.at_sample, 6000 * i as u64);
        }
        // next block continues seamlessly and wraps the step index
        clock.take_boundaries(48_000, 48_000, &mut out);
        assert_eq!(out.first().unwrap().index, 8);
        assert_eq!(out.last().unwrap().index, 15);
        clock.take_boundaries(96_000, 6_000, &mut out);
        assert_eq!(out, vec![StepBoundary { index: 0, at_sample: 96_000 }]);
    }

    #[test]
    fn test_swing_delays_only_odd_steps() {
        let clock = StepClock::new(44_100, 120.0);
        let swing = 0.6_f32;
        assert_eq!(clock.swing_offset_samples(swing, 0), 0.0);
        assert_eq!(clock.swing_offset_samples(swing, 2), 0.0);

        let expected = 0.6 * 0.1 * (60.0 / 120.0) * 44_100.0;
        let got = clock.swing_offset_samples(swing, 1);
        assert!((got - expected).abs() < 1e-9);
        assert_eq!(clock.swing_offset_samples(0.0, 1), 0.0);

        // trigger times of step 0 and step 1 differ by duration + offset
        let t0 = 0.0 + clock.swing_offset_samples(swing, 0);
        let t1 = clock.step_duration_samples() + clock.swing_offset_samples(swing, 1);
        let expected_gap = clock.step_duration_samples() + expected;
        assert!((t1 - t0 - expected_gap).abs() < 1e-9);
    }

    #[test]
    fn test_ratchet_spacing_is_quarter_step() {
        let clock = StepClock::new(48_000, 120.0);
        assert_eq!(clock.ratchet_spacing_samples(), 1500.0);
    }

    #[test]
    fn test_glide_converges() {
        let mut clock = StepClock::new(48_000, 120.0);
        // one second of 512-frame blocks lands within a hair of the target
        for _ in 0..(48_000 / 512) {
            clock.glide_toward(160.0, 512);
        }
        assert!((clock.bpm() - 160.0).abs() < 0.5);
        // a large glide step snaps exactly once close enough
        clock.glide_toward(160.0, 48_000);
        clock.glide_toward(160.0, 512);
        assert_eq!(clock.bpm(), 160.0);
    }

    #[test]
    fn test_humanize_math() {
        assert_eq!(humanize_offset_samples(0.0, 0.9, 48_000), 0.0);
        // full humanize spans +-10ms
        let max = humanize_offset_samples(1.0, 1.0, 48_000);
        let min = humanize_offset_samples(1.0, 0.0, 48_000);
        assert!(max <= 0.01 * 48_000.0 + 1e-9);
        assert!(min >= -0.01 * 48_000.0 - 1e-9);

        assert_eq!(humanize_velocity_mult(0.0, 0.99), 1.0);
        for rand in [0.0_f32, 0.25, 0.5, 0.99] {
            let m = humanize_velocity_mult(1.0, rand);
            assert!((0.7..=1.0).contains(&m));
        }
    }

    #[test]
    #[should_panic(expected = "non-finite or non-positive tempo")]
    fn test_nan_tempo_is_fatal() {
        StepClock::new(48_000, f64::NAN);
    }
}
