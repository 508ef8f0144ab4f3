//! Hand-rolled Standard MIDI File writer (format 0)
//!
//! One track, 480 ticks per quarter note, GM drum-map note numbers. The grid
//! is exported quantized: swing and humanize never reach the file.

use std::io::Write;

use backbeat_core::{DrumPattern, DrumVoice, STEPS_PER_PATTERN};

pub const TICKS_PER_QUARTER: u16 = 480;
/// 16th-note grid: a step is a quarter of a quarter note.
const TICKS_PER_STEP: u32 = TICKS_PER_QUARTER as u32 / 4;
/// Note-off trails its note-on by half a step.
const GATE_TICKS: u32 = TICKS_PER_STEP / 2;
/// MIDI channel 10 (0-indexed 9) is the GM percussion channel.
const DRUM_CHANNEL: u8 = 9;

/// Append a MIDI variable-length quantity: 7 bits per byte, continuation
/// bit set on every byte but the last.
pub fn encode_vlq(value: u32, out: &mut Vec<u8>) {
    let mut buffer = [0u8; 5];
    let mut idx = buffer.len();
    let mut value = value;
    loop {
        idx -= 1;
        buffer[idx] = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    let last = buffer.len() - 1;
    for (i, &byte) in buffer[idx..].iter().enumerate() {
        let continuation = if idx + i < last { 0x80 } else { 0 };
        out.push(byte | continuation);
    }
}

/// Decode a variable-length quantity. Returns the value and the number of
/// bytes consumed, or `None` on truncated input.
pub fn decode_vlq(bytes: &[u8]) -> Option<(u32, usize)> {
    let mut value = 0u32;
    for (i, &byte) in bytes.iter().enumerate() {
        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// A timed channel event before delta encoding. `order` sorts note-offs
/// ahead of note-ons at equal ticks.
#[derive(Debug, Clone, Copy)]
struct TrackEvent {
    tick: u32,
    order: u8,
    bytes: [u8; 3],
}

/// Write the pattern as a single-track SMF. Each active step contributes a
/// note-on/note-off pair at `tick = 120 * step_index`.
pub fn write_midi<W: Write>(writer: &mut W, pattern: &DrumPattern) -> std::io::Result<()> {
    let mut events: Vec<TrackEvent> = Vec::new();
    for step_index in 0..STEPS_PER_PATTERN {
        let tick = TICKS_PER_STEP * step_index as u32;
        for voice in DrumVoice::ALL {
            let step = pattern.steps(voice)[step_index];
            if !step.active {
                continue;
            }
            let note = voice.midi_note();
            let velocity = (step.velocity * 127.0).round().clamp(1.0, 127.0) as u8;
            events.push(TrackEvent {
                tick,
                order: 1,
                bytes: [0x90 | DRUM_CHANNEL, note, velocity],
            });
            events.push(TrackEvent {
                tick: tick + GATE_TICKS,
                order: 0,
                bytes: [0x80 | DRUM_CHANNEL, note, 64],
            });
        }
    }
    events.sort_by_key(|e| (e.tick, e.order));

    let mut track = Vec::new();
    let mut previous_tick = 0u32;
    for event in &events {
        encode_vlq(event.tick - previous_tick, &mut track);
        track.extend_from_slice(&event.bytes);
        previous_tick = event.tick;
    }
    // end of track
    encode_vlq(0, &mut track);
    track.extend_from_slice(&[0xFF, 0x2F, 0x00]);

    writer.write_all(b"MThd")?;
    writer.write_all(&6u32.to_be_bytes())?;
    writer.write_all(&0u16.to_be_bytes())?; // format 0
    writer.write_all(&1u16.to_be_bytes())?; // one track
    writer.write_all(&TICKS_PER_QUARTER.to_be_bytes())?;

    writer.write_all(b"MTrk")?;
    writer.write_all(&(track.len() as u32).to_be_bytes())?;
    writer.write_all(&track)?;
    Ok(())
}
