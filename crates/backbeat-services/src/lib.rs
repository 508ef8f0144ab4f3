//! backbeat-services: Voices, routing, real-time engine, and exporters

pub mod audio_io;
pub mod engine;
pub mod export;
pub mod routing;
pub mod voices;

pub use audio_io::{default_device_info, AudioOutputError, RealtimeOutputStream};
pub use engine::{DrumMachine, EngineError, StepEvent};
pub use export::{decode_vlq, encode_vlq, write_midi, write_wav, TICKS_PER_QUARTER};
pub use routing::{MasterCompressor, RoutingGraph, SchroederReverb, SidechainDuck};
pub use voices::{Trigger, VoiceBank, MAX_BLOCK_SIZE};
