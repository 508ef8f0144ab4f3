//! backbeat-core: Domain types for the backbeat drum engine

pub mod clock;
mod error;
pub mod pattern;
pub mod rng;
pub mod settings;
mod transport;

pub use clock::{humanize_offset_samples, humanize_velocity_mult, StepBoundary, StepClock};
pub use error::{BackbeatError, Result};
pub use pattern::{
    BankId, DrumPattern, DrumStep, DrumVoice, PatternBank, StepPatch, MAX_RATCHET,
    STEPS_PER_PATTERN,
};
pub use rng::Lcg;
pub use settings::{
    DrumSettings, HatProfile, KickProfile, Kit, KitProfile, ReverbSends, SidechainSettings,
    SnareProfile,
};
pub use transport::{TapTempo, Transport, TransportState, TAP_BPM_MAX, TAP_BPM_MIN};
