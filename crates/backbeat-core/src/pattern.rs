//! Step patterns and the two-bank pattern store

use serde::{Deserialize, Serialize};

use crate::error::{BackbeatError, Result};
use crate::rng::Lcg;

/// Steps per pattern (16th-note grid, one bar of 4/4).
pub const STEPS_PER_PATTERN: usize = 16;

/// Maximum sub-triggers within a single step.
pub const MAX_RATCHET: u8 = 4;

/// The three fixed drum voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrumVoice {
    Kick,
    Snare,
    Hat,
}

impl DrumVoice {
    pub const ALL: [DrumVoice; 3] = [DrumVoice::Kick, DrumVoice::Snare, DrumVoice::Hat];

    /// GM drum map note number for MIDI export
    pub fn midi_note(self) -> u8 {
        match self {
            Self::Kick => 36,
            Self::Snare => 38,
            Self::Hat => 42,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Kick => "kick",
            Self::Snare => "snare",
            Self::Hat => "hat",
        }
    }
}

/// One scheduled slot for one voice at one of the 16 positions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrumStep {
    pub active: bool,
    /// Loudness scalar in [0, 1]
    pub velocity: f32,
    /// Chance the slot fires when reached, in [0, 1]
    pub probability: f32,
    /// Sub-triggers within the step, 1..=4
    pub ratchet: u8,
}

impl Default for DrumStep {
    fn default() -> Self {
        Self {
            active: false,
            velocity: 0.8,
            probability: 1.0,
            ratchet: 1,
        }
    }
}

/// Partial step update; unset fields are left untouched
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StepPatch {
    pub active: Option<bool>,
    pub velocity: Option<f32>,
    pub probability: Option<f32>,
    pub ratchet: Option<u8>,
}

impl StepPatch {
    /// Validate every set field against its domain. Out-of-range values are
    /// rejected rather than clamped so callers can tell bugs from intent.
    fn validate(&self) -> Result<()> {
        if let Some(v) = self.velocity {
            if !(0.0..=1.0).contains(&v) || v.is_nan() {
                return Err(BackbeatError::StepFieldOutOfRange {
                    field: "velocity",
                    value: v as f64,
                });
            }
        }
        if let Some(p) = self.probability {
            if !(0.0..=1.0).contains(&p) || p.is_nan() {
                return Err(BackbeatError::StepFieldOutOfRange {
                    field: "probability",
                    value: p as f64,
                });
            }
        }
        if let Some(r) = self.ratchet {
            if r < 1 || r > MAX_RATCHET {
                return Err(BackbeatError::StepFieldOutOfRange {
                    field: "ratchet",
                    value: r as f64,
                });
            }
        }
        Ok(())
    }

    fn apply(&self, step: &mut DrumStep) {
        if let Some(a) = self.active {
            step.active = a;
        }
        if let Some(v) = self.velocity {
            step.velocity = v;
        }
        if let Some(p) = self.probability {
            step.probability = p;
        }
        if let Some(r) = self.ratchet {
            step.ratchet = r;
        }
    }
}

/// A 16-step row per voice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrumPattern {
    pub kick: [DrumStep; STEPS_PER_PATTERN],
    pub snare: [DrumStep; STEPS_PER_PATTERN],
    pub hat: [DrumStep; STEPS_PER_PATTERN],
}

impl Default for DrumPattern {
    fn default() -> Self {
        Self {
            kick: [DrumStep::default(); STEPS_PER_PATTERN],
            snare: [DrumStep::default(); STEPS_PER_PATTERN],
            hat: [DrumStep::default(); STEPS_PER_PATTERN],
        }
    }
}

impl DrumPattern {
    pub fn steps(&self, voice: DrumVoice) -> &[DrumStep; STEPS_PER_PATTERN] {
        match voice {
            DrumVoice::Kick => &self.kick,
            DrumVoice::Snare => &self.snare,
            DrumVoice::Hat => &self.hat,
        }
    }

    pub fn steps_mut(&mut self, voice: DrumVoice) -> &mut [DrumStep; STEPS_PER_PATTERN] {
        match voice {
            DrumVoice::Kick => &mut self.kick,
            DrumVoice::Snare => &mut self.snare,
            DrumVoice::Hat => &mut self.hat,
        }
    }

    /// Deactivate every step; velocity, probability, and ratchet are kept.
    pub fn clear(&mut self) {
        for voice in DrumVoice::ALL {
            for step in self.steps_mut(voice) {
                step.active = false;
            }
        }
    }

    /// True if no step of any voice is active.
    pub fn is_empty(&self) -> bool {
        DrumVoice::ALL
            .iter()
            .all(|&v| self.steps(v).iter().all(|s| !s.active))
    }

    /// The default groove seeded into bank A: four-on-the-floor kick,
    /// backbeat snare, off-beat hat.
    pub fn seed() -> Self {
        let mut pattern = Self::default();
        for i in [0, 4, 8, 12] {
            pattern.kick[i] = DrumStep {
                active: true,
                velocity: 0.9,
                ..DrumStep::default()
            };
        }
        for i in [4, 12] {
            pattern.snare[i] = DrumStep {
                active: true,
                velocity: 0.85,
                ..DrumStep::default()
            };
        }
        for i in [2, 6, 10, 14] {
            pattern.hat[i] = DrumStep {
                active: true,
                velocity: 0.6,
                ..DrumStep::default()
            };
        }
        pattern
    }

    /// Randomize rows for one voice (or all three): ~30% of steps active,
    /// velocity in [0.6, 1.0], probability in [0.8, 1.0], and a 10% chance
    /// of a 2-4 ratchet.
    pub fn randomize(&mut self, voice: Option<DrumVoice>, rng: &mut Lcg) {
        let voices: &[DrumVoice] = match &voice {
            Some(v) => std::slice::from_ref(v),
            None => &DrumVoice::ALL,
        };
        for &v in voices {
            for step in self.steps_mut(v) {
                step.active = rng.next_f32() < 0.3;
                step.velocity = rng.next_range(0.6, 1.0);
                step.probability = rng.next_range(0.8, 1.0);
                step.ratchet = if rng.next_f32() < 0.1 {
                    rng.next_u8(2, MAX_RATCHET)
                } else {
                    1
                };
            }
        }
    }
}

/// Bank identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BankId {
    #[default]
    A,
    B,
}

impl BankId {
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// The two-bank pattern store. Bank A starts with the seed groove, bank B
/// empty; exactly one bank is current at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternBank {
    pub a: DrumPattern,
    pub b: DrumPattern,
    pub current: BankId,
}

impl Default for PatternBank {
    fn default() -> Self {
        Self {
            a: DrumPattern::seed(),
            b: DrumPattern::default(),
            current: BankId::A,
        }
    }
}

impl PatternBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern(&self, bank: BankId) -> &DrumPattern {
        match bank {
            BankId::A => &self.a,
            BankId::B => &self.b,
        }
    }

    pub fn pattern_mut(&mut self, bank: BankId) -> &mut DrumPattern {
        match bank {
            BankId::A => &mut self.a,
            BankId::B => &mut self.b,
        }
    }

    pub fn current(&self) -> &DrumPattern {
        self.pattern(self.current)
    }

    pub fn current_mut(&mut self) -> &mut DrumPattern {
        self.pattern_mut(self.current)
    }

    /// Select the current bank. The scheduler reads the bank at each step
    /// boundary, so a switch lands on the next step, never mid-step.
    pub fn select(&mut self, bank: BankId) {
        self.current = bank;
    }

    pub fn toggle(&mut self) {
        self.current = self.current.other();
    }

    /// Merge a validated partial update into one step of the current bank.
    /// An out-of-domain field leaves the store unchanged.
    pub fn set_step(&mut self, voice: DrumVoice, index: usize, patch: StepPatch) -> Result<()> {
        if index >= STEPS_PER_PATTERN {
            return Err(BackbeatError::StepIndexOutOfRange(index));
        }
        patch.validate()?;
        patch.apply(&mut self.current_mut().steps_mut(voice)[index]);
        Ok(())
    }

    /// Copy one bank's pattern over the other's.
    pub fn copy_pattern(&mut self, from: BankId, to: BankId) {
        if from == to {
            return;
        }
        *self.pattern_mut(to) = self.pattern(from).clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_shape() {
        let bank = PatternBank::new();
        for pattern in [&bank.a, &bank.b] {
            for voice in DrumVoice::ALL {
                assert_eq!(pattern.steps(voice).len(), STEPS_PER_PATTERN);
            }
        }
    }

    #[test]
    fn test_seed_groove() {
        let bank = PatternBank::new();
        let active =
            |steps: &[DrumStep; 16]| -> Vec<usize> { (0..16).filter(|&i| steps[i].active).collect() };
        assert_eq!(active(&bank.a.kick), vec![0, 4, 8, 12]);
        assert_eq!(active(&bank.a.snare), vec![4, 12]);
        assert_eq!(active(&bank.a.hat), vec![2, 6, 10, 14]);
        assert!(bank.b.is_empty());
    }

    #[test]
    fn test_set_step_merges_partial() {
        let mut bank = PatternBank::new();
        bank.set_step(
            DrumVoice::Snare,
            3,
            StepPatch {
                active: Some(true),
                velocity: Some(0.5),
                ..StepPatch::default()
            },
        )
        .unwrap();
        let step = bank.current().snare[3];
        assert!(step.active);
        assert_eq!(step.velocity, 0.5);
        // untouched fields keep their values
        assert_eq!(step.probability, 1.0);
        assert_eq!(step.ratchet, 1);
    }

    #[test]
    fn test_set_step_rejects_out_of_domain() {
        let mut bank = PatternBank::new();
        let before = bank.current().clone();

        for patch in [
            StepPatch { velocity: Some(1.5), ..StepPatch::default() },
            StepPatch { velocity: Some(-0.1), ..StepPatch::default() },
            StepPatch { probability: Some(2.0), ..StepPatch::default() },
            StepPatch { ratchet: Some(0), ..StepPatch::default() },
            StepPatch { ratchet: Some(5), ..StepPatch::default() },
        ] {
            assert!(bank.set_step(DrumVoice::Kick, 0, patch).is_err());
        }
        assert!(bank.set_step(DrumVoice::Kick, 16, StepPatch::default()).is_err());

        // a rejected patch leaves the store unchanged, even when one field
        // of the patch was valid
        let mixed = StepPatch {
            active: Some(true),
            velocity: Some(7.0),
            ..StepPatch::default()
        };
        assert!(bank.set_step(DrumVoice::Hat, 0, mixed).is_err());
        assert_eq!(*bank.current(), before);
    }

    #[test]
    fn test_clear_keeps_other_fields() {
        let mut bank = PatternBank::new();
        bank.set_step(
            DrumVoice::Kick,
            0,
            StepPatch { velocity: Some(0.33), ratchet: Some(3), ..StepPatch::default() },
        )
        .unwrap();
        bank.current_mut().clear();
        assert!(bank.current().is_empty());
        assert_eq!(bank.current().kick[0].velocity, 0.33);
        assert_eq!(bank.current().kick[0].ratchet, 3);
    }

    #[test]
    fn test_bank_switch_is_independent() {
        let mut bank = PatternBank::new();
        bank.toggle();
        assert_eq!(bank.current, BankId::B);
        bank.set_step(DrumVoice::Kick, 7, StepPatch { active: Some(true), ..StepPatch::default() })
            .unwrap();
        bank.toggle();
        assert!(!bank.current().kick[7].active);
        assert!(bank.b.kick[7].active);
    }

    #[test]
    fn test_copy_pattern() {
        let mut bank = PatternBank::new();
        bank.copy_pattern(BankId::A, BankId::B);
        assert_eq!(bank.a, bank.b);
    }

    #[test]
    fn test_randomize_distribution() {
        // Statistical contract: ~30% active, velocity in [0.6, 1.0],
        // probability in [0.8, 1.0], ~10% ratcheted. 1000 patterns x 48
        // steps gives a tight enough band for a crude binomial check.
        let mut rng = Lcg::new(0xBEA7);
        let mut active = 0usize;
        let mut ratcheted = 0usize;
        let trials = 1000;
        let steps_per_trial = STEPS_PER_PATTERN * 3;

        for _ in 0..trials {
            let mut pattern = DrumPattern::default();
            pattern.randomize(None, &mut rng);
            for voice in DrumVoice::ALL {
                for step in pattern.steps(voice) {
                    assert!((0.6..=1.0).contains(&step.velocity));
                    assert!((0.8..=1.0).contains(&step.probability));
                    assert!((1..=MAX_RATCHET).contains(&step.ratchet));
                    if step.active {
                        active += 1;
                    }
                    if step.ratchet > 1 {
                        ratcheted += 1;
                    }
                }
            }
        }

        let n = (trials * steps_per_trial) as f64;
        let active_frac = active as f64 / n;
        let ratchet_frac = ratcheted as f64 / n;
        // ~5 sigma bands around p=0.3 and p=0.1 for n=48000
        assert!((0.29..0.31).contains(&active_frac), "active fraction {active_frac}");
        assert!((0.09..0.11).contains(&ratchet_frac), "ratchet fraction {ratchet_frac}");
    }

    #[test]
    fn test_pattern_wire_shape() {
        // The host-facing JSON shape is part of the boundary contract.
        let json = serde_json::to_value(DrumPattern::seed()).unwrap();
        for voice in ["kick", "snare", "hat"] {
            let row = json[voice].as_array().unwrap();
            assert_eq!(row.len(), STEPS_PER_PATTERN);
            assert!(row[0]["active"].is_boolean());
            assert!(row[0]["velocity"].is_number());
            assert!(row[0]["probability"].is_number());
            assert!(row[0]["ratchet"].is_number());
        }
    }

    #[test]
    fn test_randomize_single_voice_leaves_others() {
        let mut rng = Lcg::new(42);
        let mut pattern = DrumPattern::seed();
        let snare_before = pattern.snare;
        let hat_before = pattern.hat;
        pattern.randomize(Some(DrumVoice::Kick), &mut rng);
        assert_eq!(pattern.snare, snare_before);
        assert_eq!(pattern.hat, hat_before);
    }
}
