//! Binary exporters: WAV container and Standard MIDI File

pub mod midi;
pub mod wav;

pub use midi::{decode_vlq, encode_vlq, write_midi, TICKS_PER_QUARTER};
pub use wav::write_wav;
