//! Renders the seed groove and writes demo.wav and demo.mid

use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::Result;
use backbeat_core::{DrumVoice, StepPatch};
use backbeat_services::DrumMachine;
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut machine = DrumMachine::new(44_100);
    machine.set_swing(0.2);
    machine.set_kit_by_name("909");

    // a couple of ghost snares on top of the seed groove
    machine.set_step(
        DrumVoice::Snare,
        7,
        StepPatch {
            active: Some(true),
            velocity: Some(0.4),
            probability: Some(0.6),
            ..StepPatch::default()
        },
    )?;
    machine.set_step(
        DrumVoice::Snare,
        15,
        StepPatch {
            active: Some(true),
            velocity: Some(0.5),
            ratchet: Some(2),
            ..StepPatch::default()
        },
    )?;

    let mut wav = BufWriter::new(File::create("demo.wav")?);
    machine.export_wav(&mut wav, 2.0)?;
    wav.flush()?;
    info!("wrote demo.wav");

    let mut midi = BufWriter::new(File::create("demo.mid")?);
    machine.export_midi(&mut midi)?;
    midi.flush()?;
    info!("wrote demo.mid");

    Ok(())
}
