//! Engine settings and the kit profile table

use serde::{Deserialize, Serialize};

/// Named kits selectable at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Kit {
    #[serde(rename = "CR78")]
    Cr78,
    /// The documented default; unknown kit names fall back here.
    #[default]
    #[serde(rename = "808")]
    Tr808,
    #[serde(rename = "909")]
    Tr909,
    #[serde(rename = "Synth")]
    Synth,
}

impl Kit {
    pub const ALL: [Kit; 4] = [Kit::Cr78, Kit::Tr808, Kit::Tr909, Kit::Synth];

    pub fn name(self) -> &'static str {
        match self {
            Self::Cr78 => "CR78",
            Self::Tr808 => "808",
            Self::Tr909 => "909",
            Self::Synth => "Synth",
        }
    }

    /// Case-insensitive lookup. Returns `None` for unknown names; callers
    /// fall back to `Kit::default()`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cr78" | "cr-78" => Some(Self::Cr78),
            "808" | "tr808" | "tr-808" => Some(Self::Tr808),
            "909" | "tr909" | "tr-909" => Some(Self::Tr909),
            "synth" => Some(Self::Synth),
            _ => None,
        }
    }

    pub fn profile(self) -> &'static KitProfile {
        match self {
            Self::Cr78 => &CR78_PROFILE,
            Self::Tr808 => &TR808_PROFILE,
            Self::Tr909 => &TR909_PROFILE,
            Self::Synth => &SYNTH_PROFILE,
        }
    }
}

/// Kick voice timbre: sine with an exponential pitch sweep into `freq_hz`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KickProfile {
    /// Pitch target the sweep settles on
    pub freq_hz: f64,
    /// Sweep starts at `freq_hz * (1 + sweep)`
    pub sweep: f64,
    pub pitch_decay_s: f64,
    pub amp_decay_s: f64,
}

/// Snare voice timbre: two tuned tones plus bandpassed noise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnareProfile {
    pub tone1_hz: f64,
    pub tone2_hz: f64,
    pub tone_decay_s: f64,
    pub noise_decay_s: f64,
    /// Balance between body tones and the noise rattle, in [0, 1]
    pub tone_mix: f64,
}

/// Hat voice timbre: highpassed noise burst.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HatProfile {
    pub decay_s: f64,
    /// One-pole highpass coefficient in (0, 1)
    pub hp_coeff: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KitProfile {
    pub kick: KickProfile,
    pub snare: SnareProfile,
    pub hat: HatProfile,
}

static CR78_PROFILE: KitProfile = KitProfile {
    kick: KickProfile { freq_hz: 70.0, sweep: 2.0, pitch_decay_s: 0.02, amp_decay_s: 0.18 },
    snare: SnareProfile {
        tone1_hz: 200.0,
        tone2_hz: 340.0,
        tone_decay_s: 0.02,
        noise_decay_s: 0.05,
        tone_mix: 0.5,
    },
    hat: HatProfile { decay_s: 0.015, hp_coeff: 0.35 },
};

static TR808_PROFILE: KitProfile = KitProfile {
    kick: KickProfile { freq_hz: 55.0, sweep: 3.0, pitch_decay_s: 0.03, amp_decay_s: 0.45 },
    snare: SnareProfile {
        tone1_hz: 180.0,
        tone2_hz: 330.0,
        tone_decay_s: 0.025,
        noise_decay_s: 0.12,
        tone_mix: 0.4,
    },
    hat: HatProfile { decay_s: 0.03, hp_coeff: 0.3 },
};

static TR909_PROFILE: KitProfile = KitProfile {
    kick: KickProfile { freq_hz: 60.0, sweep: 4.0, pitch_decay_s: 0.02, amp_decay_s: 0.28 },
    snare: SnareProfile {
        tone1_hz: 185.0,
        tone2_hz: 330.0,
        tone_decay_s: 0.02,
        noise_decay_s: 0.09,
        tone_mix: 0.35,
    },
    hat: HatProfile { decay_s: 0.04, hp_coeff: 0.32 },
};

static SYNTH_PROFILE: KitProfile = KitProfile {
    kick: KickProfile { freq_hz: 48.0, sweep: 6.0, pitch_decay_s: 0.04, amp_decay_s: 0.35 },
    snare: SnareProfile {
        tone1_hz: 220.0,
        tone2_hz: 400.0,
        tone_decay_s: 0.03,
        noise_decay_s: 0.07,
        tone_mix: 0.6,
    },
    hat: HatProfile { decay_s: 0.05, hp_coeff: 0.45 },
};

/// Per-voice reverb send levels in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbSends {
    pub kick: f32,
    pub snare: f32,
    pub hat: f32,
}

impl Default for ReverbSends {
    fn default() -> Self {
        Self { kick: 0.1, snare: 0.25, hat: 0.2 }
    }
}

impl ReverbSends {
    pub fn get(&self, voice: crate::pattern::DrumVoice) -> f32 {
        match voice {
            crate::pattern::DrumVoice::Kick => self.kick,
            crate::pattern::DrumVoice::Snare => self.snare,
            crate::pattern::DrumVoice::Hat => self.hat,
        }
    }

    pub fn set(&mut self, voice: crate::pattern::DrumVoice, level: f32) {
        let level = level.clamp(0.0, 1.0);
        match voice {
            crate::pattern::DrumVoice::Kick => self.kick = level,
            crate::pattern::DrumVoice::Snare => self.snare = level,
            crate::pattern::DrumVoice::Hat => self.hat = level,
        }
    }
}

/// Sidechain ducking of the snare/hat bus, keyed by authored kick steps
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SidechainSettings {
    pub enabled: bool,
    /// Duck depth in [0, 1]
    pub amount: f32,
}

impl Default for SidechainSettings {
    fn default() -> Self {
        Self { enabled: true, amount: 0.5 }
    }
}

/// Process-wide mutable engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrumSettings {
    /// Off-beat delay amount in [0, 1]
    pub swing: f32,
    /// Timing/velocity jitter amount in [0, 1]
    pub humanize: f32,
    /// Tempo in BPM. Direct sets are not bounds-checked; only the tap-tempo
    /// entry point enforces 60-200.
    pub tempo: f64,
    pub kit: Kit,
    pub reverb: ReverbSends,
    pub sidechain: SidechainSettings,
}

impl Default for DrumSettings {
    fn default() -> Self {
        Self {
            swing: 0.0,
            humanize: 0.0,
            tempo: 120.0,
            kit: Kit::default(),
            reverb: ReverbSends::default(),
            sidechain: SidechainSettings::default(),
        }
    }
}

impl DrumSettings {
    pub fn set_swing(&mut self, swing: f32) {
        self.swing = swing.clamp(0.0, 1.0);
    }

    pub fn set_humanize(&mut self, humanize: f32) {
        self.humanize = humanize.clamp(0.0, 1.0);
    }

    pub fn set_sidechain_amount(&mut self, amount: f32) {
        self.sidechain.amount = amount.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::DrumVoice;

    #[test]
    fn test_kit_lookup_falls_back() {
        assert_eq!(Kit::from_name("909"), Some(Kit::Tr909));
        assert_eq!(Kit::from_name("CR78"), Some(Kit::Cr78));
        assert_eq!(Kit::from_name("sYnTh"), Some(Kit::Synth));
        assert_eq!(Kit::from_name("linn9000"), None);
        assert_eq!(Kit::from_name("linn9000").unwrap_or_default(), Kit::Tr808);
    }

    #[test]
    fn test_profiles_are_sane() {
        for kit in Kit::ALL {
            let p = kit.profile();
            assert!(p.kick.freq_hz > 0.0 && p.kick.amp_decay_s > 0.0);
            assert!(p.snare.tone1_hz < p.snare.tone2_hz);
            assert!((0.0..=1.0).contains(&p.snare.tone_mix));
            assert!(p.hat.decay_s > 0.0 && (0.0..1.0).contains(&p.hat.hp_coeff));
        }
    }

    #[test]
    fn test_clamped_setters() {
        let mut settings = DrumSettings::default();
        settings.set_swing(1.7);
        settings.set_humanize(-0.2);
        settings.set_sidechain_amount(9.0);
        assert_eq!(settings.swing, 1.0);
        assert_eq!(settings.humanize, 0.0);
        assert_eq!(settings.sidechain.amount, 1.0);

        settings.reverb.set(DrumVoice::Hat, 1.4);
        assert_eq!(settings.reverb.hat, 1.0);
    }

    #[test]
    fn test_settings_wire_shape() {
        // The host-facing JSON shape is part of the boundary contract.
        let json = serde_json::to_value(DrumSettings::default()).unwrap();
        assert_eq!(json["tempo"], 120.0);
        assert_eq!(json["kit"], "808");
        assert!(json["reverb"]["kick"].is_number());
        assert!(json["reverb"]["snare"].is_number());
        assert!(json["reverb"]["hat"].is_number());
        assert_eq!(json["sidechain"]["enabled"], true);
        assert!(json["sidechain"]["amount"].is_number());
        assert!(json["swing"].is_number());
        assert!(json["humanize"].is_number());
    }
}
