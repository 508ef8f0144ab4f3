//! The three-voice drum bank: kick, snare, and hat synthesis

use backbeat_core::{DrumVoice, Kit, KitProfile, Lcg};

pub const MAX_BLOCK_SIZE: usize = 4096;

/// Envelope level below which a voice is considered finished.
const SILENCE_FLOOR: f64 = 0.0001;

/// A queued trigger, sample-accurate relative to the current block start.
/// Offsets past the block are carried into the next one.
#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    pub voice: DrumVoice,
    /// Final amplitude scalar: velocity, humanize, and send attenuation
    /// already folded in
    pub level: f32,
    /// Pitch target for the kick sweep; snare and hat ignore it
    pub pitch_hz: f64,
    pub offset: u32,
}

/// Kick: sine with an exponential pitch sweep into the pitch target.
#[derive(Debug, Clone, Default)]
struct KickState {
    active: bool,
    phase: f64,
    amp_env: f64,
    pitch_env: f64,
    pitch_hz: f64,
    sweep: f64,
    pitch_decay_s: f64,
    amp_decay_s: f64,
    level: f64,
}

impl KickState {
    fn trigger(&mut self, profile: &KitProfile, pitch_hz: f64, level: f32) {
        self.active = true;
        self.phase = 0.0;
        self.amp_env = 1.0;
        self.pitch_env = 1.0;
        self.pitch_hz = pitch_hz;
        self.sweep = profile.kick.sweep;
        self.pitch_decay_s = profile.kick.pitch_decay_s;
        self.amp_decay_s = profile.kick.amp_decay_s;
        self.level = level as f64;
    }

    fn tick(&mut self, dt: f64) -> f64 {
        if !self.active {
            return 0.0;
        }
        self.pitch_env *= (-dt / self.pitch_decay_s).exp();
        let freq = self.pitch_hz * (1.0 + self.pitch_env * self.sweep);
        self.phase += freq * dt;
        let osc = (self.phase * std::f64::consts::TAU).sin();

        self.amp_env *= (-dt / self.amp_decay_s).exp();
        if self.amp_env < SILENCE_FLOOR {
            self.active = false;
        }
        osc * self.amp_env * self.level
    }
}

/// Snare: two tuned body tones plus bandpassed noise rattle.
#[derive(Debug, Clone, Default)]
struct SnareState {
    active: bool,
    phase: f64,
    phase2: f64,
    tone_env: f64,
    noise_env: f64,
    filter_state: f64,
    filter_state2: f64,
    tone1_hz: f64,
    tone2_hz: f64,
    tone_decay_s: f64,
    noise_decay_s: f64,
    tone_mix: f64,
    level: f64,
}

impl SnareState {
    fn trigger(&mut self, profile: &KitProfile, level: f32) {
        self.active = true;
        self.phase = 0.0;
        self.phase2 = 0.0;
        self.tone_env = 1.0;
        self.noise_env = 1.0;
        self.filter_state = 0.0;
        self.filter_state2 = 0.0;
        self.tone1_hz = profile.snare.tone1_hz;
        self.tone2_hz = profile.snare.tone2_hz;
        self.tone_decay_s = profile.snare.tone_decay_s;
        self.noise_decay_s = profile.snare.noise_decay_s;
        self.tone_mix = profile.snare.tone_mix;
        self.level = level as f64;
    }

    fn tick(&mut self, dt: f64, noise: &mut Lcg) -> f64 {
        if !self.active {
            return 0.0;
        }
        self.phase += self.tone1_hz * dt;
        let tone1 = (self.phase * std::f64::consts::TAU).sin();
        self.phase2 += self.tone2_hz * dt;
        let tone2 = (self.phase2 * std::f64::consts::TAU).sin();
        self.tone_env *= (-dt / self.tone_decay_s).exp();

        // Two-pole bandpass around the rattle range
        let sample = noise.next_f32() as f64 * 2.0 - 1.0;
        let bp_freq = 0.15;
        let bp_q = 0.7;
        self.filter_state += bp_freq * (sample - self.filter_state);
        self.filter_state2 += bp_freq * bp_q * (self.filter_state - self.filter_state2);
        let rattle = self.filter_state - self.filter_state2;

        self.noise_env *= (-dt / self.noise_decay_s).exp();
        if self.tone_env < SILENCE_FLOOR && self.noise_env < SILENCE_FLOOR {
            self.active = false;
        }

        let body = (tone1 * 0.6 + tone2 * 0.4) * self.tone_env * self.tone_mix;
        let snares = rattle * self.noise_env * 1.5 * (1.0 - self.tone_mix * 0.3);
        (body + snares) * self.level
    }
}

/// Hat: highpassed noise burst.
#[derive(Debug, Clone, Default)]
struct HatState {
    active: bool,
    amp_env: f64,
    filter_state: f64,
    decay_s: f64,
    hp_coeff: f64,
    level: f64,
}

impl HatState {
    fn trigger(&mut self, profile: &KitProfile, level: f32) {
        self.active = true;
        self.amp_env = 1.0;
        self.filter_state = 0.0;
        self.decay_s = profile.hat.decay_s;
        self.hp_coeff = profile.hat.hp_coeff;
        self.level = level as f64;
    }

    fn tick(&mut self, dt: f64, noise: &mut Lcg) -> f64 {
        if !self.active {
            return 0.0;
        }
        let sample = noise.next_f32() as f64 * 2.0 - 1.0;
        self.filter_state += self.hp_coeff * (sample - self.filter_state);
        let highpassed = sample - self.filter_state;

        self.amp_env *= (-dt / self.decay_s).exp();
        if self.amp_env < SILENCE_FLOOR {
            self.active = false;
        }
        highpassed * self.amp_env * self.level
    }
}

/// Three fixed monophonic voices plus a cross-block trigger queue. A
/// retrigger restarts the voice's envelopes; kit changes are copied into the
/// voice at trigger time, so a sounding voice keeps its old timbre.
pub struct VoiceBank {
    sample_rate: f32,
    profile: KitProfile,
    kick: KickState,
    snare: SnareState,
    hat: HatState,
    pending: Vec<Trigger>,
    noise: Lcg,
}

impl std::fmt::Debug for VoiceBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceBank")
            .field("sample_rate", &self.sample_rate)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl VoiceBank {
    pub fn new(sample_rate: f32, kit: Kit, noise_seed: u64) -> Self {
        Self {
            sample_rate,
            profile: *kit.profile(),
            kick: KickState::default(),
            snare: SnareState::default(),
            hat: HatState::default(),
            pending: Vec::with_capacity(64),
            noise: Lcg::new(noise_seed),
        }
    }

    /// Rewrites the profile used by future triggers. Sounding voices are
    /// not touched.
    pub fn set_kit(&mut self, kit: Kit) {
        self.profile = *kit.profile();
    }

    /// The current kit's kick pitch target.
    pub fn kick_pitch_hz(&self) -> f64 {
        self.profile.kick.freq_hz
    }

    pub fn queue(&mut self, trigger: Trigger) {
        self.pending.push(trigger);
    }

    /// Kill all voices, drop queued triggers, and reseed the noise source.
    /// Used when entering an offline render so output is reproducible.
    pub fn reset(&mut self, noise_seed: u64) {
        self.kick.active = false;
        self.snare.active = false;
        self.hat.active = false;
        self.pending.clear();
        self.noise = Lcg::new(noise_seed);
    }

    pub fn is_quiet(&self) -> bool {
        !self.kick.active && !self.snare.active && !self.hat.active && self.pending.is_empty()
    }

    fn fire(&mut self, trigger: Trigger) {
        match trigger.voice {
            DrumVoice::Kick => self.kick.trigger(&self.profile, trigger.pitch_hz, trigger.level),
            DrumVoice::Snare => self.snare.trigger(&self.profile, trigger.level),
            DrumVoice::Hat => self.hat.trigger(&self.profile, trigger.level),
        }
    }

    /// Render one block. The kick goes to `kick_out`, snare and hat to
    /// `shared_out` (the sidechained bus). Both slices are overwritten.
    /// Pending triggers past the block are carried over with their offsets
    /// rebased.
    pub fn process(&mut self, frames: usize, kick_out: &mut [f32], shared_out: &mut [f32]) {
        let frames = frames.min(MAX_BLOCK_SIZE);
        kick_out[..frames].fill(0.0);
        shared_out[..frames].fill(0.0);

        self.pending.sort_unstable_by_key(|t| t.offset);

        let dt = 1.0 / self.sample_rate as f64;
        for frame_idx in 0..frames {
            while let Some(&trigger) = self.pending.first() {
                if trigger.offset as usize > frame_idx {
                    break;
                }
                self.pending.remove(0);
                self.fire(trigger);
            }

            kick_out[frame_idx] += self.kick.tick(dt) as f32;
            let mut shared = self.snare.tick(dt, &mut self.noise);
            shared += self.hat.tick(dt, &mut self.noise);
            shared_out[frame_idx] += shared as f32;
        }

        self.pending.retain(|t| t.offset as usize >= frames);
        for trigger in &mut self.pending {
            trigger.offset -= frames as u32;
        }
    }
}
