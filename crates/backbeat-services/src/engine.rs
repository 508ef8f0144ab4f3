//! The drum machine engine: transport, per-step scheduler, offline render

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Instant;

use backbeat_core::{
    humanize_offset_samples, humanize_velocity_mult, BackbeatError, BankId, DrumPattern,
    DrumSettings, DrumVoice, Kit, Lcg, PatternBank, StepPatch, TapTempo, Transport,
    TransportState,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use thiserror::Error;
use tracing::{info, warn};

use crate::audio_io::{AudioOutputError, RealtimeOutputStream};
use crate::export::{write_midi, write_wav};
use crate::routing::RoutingGraph;
use crate::voices::{Trigger, VoiceBank, MAX_BLOCK_SIZE};

/// How much a full reverb send attenuates a voice's dry trigger level. The
/// send is modeled as trigger-time attenuation, not a parallel wet bus.
const REVERB_SEND_ATTENUATION: f32 = 0.35;

/// Fixed seeds so offline renders of identical state produce identical bytes.
const OFFLINE_NOISE_SEED: u64 = 0x5EED_0001;
const OFFLINE_SCHED_SEED: u64 = 0x5EED_0002;

const STEP_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("audio output error: {0}")]
    Output(#[from] AudioOutputError),
    #[error(transparent)]
    Engine(#[from] BackbeatError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("output stream already running")]
    OutputAlreadyRunning,
    #[error("output stream not running")]
    OutputNotRunning,
}

/// Emitted at each step boundary so a host grid can follow the playhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEvent {
    pub bank: BankId,
    pub step: usize,
}

/// Host-mutable state, read by the scheduler once per render block under a
/// brief lock. Edits land on the next step boundary, never mid-step.
struct SharedState {
    patterns: PatternBank,
    settings: DrumSettings,
}

/// Everything the render path owns: clock, voices, routing, scratch
/// buffers, and the scheduling RNG. Locked by the audio callback per block
/// and by offline renders for their whole duration.
struct RenderChain {
    clock: backbeat_core::StepClock,
    voices: VoiceBank,
    graph: RoutingGraph,
    rng: Lcg,
    master: Vec<f32>,
    boundaries: Vec<backbeat_core::StepBoundary>,
    position: u64,
}

impl RenderChain {
    /// Rewind to step 0, silence the voices, and clear routing state.
    fn reset_cursor(&mut self, tempo: f64, noise_seed: u64, sched_seed: u64) {
        self.clock.reset(tempo);
        self.voices.reset(noise_seed);
        self.graph.reset();
        self.rng = Lcg::new(sched_seed);
        self.position = 0;
    }

    /// Run voices into the buses and fold them down to `master`.
    fn render_buses(&mut self, frames: usize, duck_depth: f32) {
        let (kick_bus, shared_bus) = self.graph.buses_mut(frames);
        self.voices.process(frames, kick_bus, shared_bus);
        self.graph.process(frames, duck_depth, &mut self.master[..frames]);
    }
}

struct EngineState {
    /// True while the scheduler advances (playing and not paused)
    playing: AtomicBool,
    exporting: AtomicBool,
    current_step: AtomicUsize,
    shared: Mutex<SharedState>,
    chain: Mutex<RenderChain>,
    step_tx: Sender<StepEvent>,
}

/// Releases the export flag and restores the prior playback state even when
/// an export bails out early.
struct ExportGuard {
    state: Arc<EngineState>,
    was_playing: bool,
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.state.playing.store(self.was_playing, Ordering::SeqCst);
        self.state.exporting.store(false, Ordering::SeqCst);
    }
}

/// The engine context. Hosts own one and drive every operation through it;
/// there is no global audio state.
pub struct DrumMachine {
    state: Arc<EngineState>,
    step_rx: Receiver<StepEvent>,
    stream: Option<RealtimeOutputStream>,
    transport: Transport,
    tap: TapTempo,
    pattern_rng: Lcg,
    sample_rate: u32,
}

impl std::fmt::Debug for DrumMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrumMachine")
            .field("sample_rate", &self.sample_rate)
            .field("transport", &self.transport.state)
            .finish()
    }
}

impl DrumMachine {
    pub fn new(sample_rate: u32) -> Self {
        let settings = DrumSettings::default();
        let (step_tx, step_rx) = bounded(STEP_EVENT_CAPACITY);
        let chain = RenderChain {
            clock: backbeat_core::StepClock::new(sample_rate, settings.tempo),
            voices: VoiceBank::new(sample_rate as f32, settings.kit, fastrand::u64(..)),
            graph: RoutingGraph::new(sample_rate as f32),
            rng: Lcg::new(fastrand::u64(..)),
            master: vec![0.0; MAX_BLOCK_SIZE],
            boundaries: Vec::with_capacity(8),
            position: 0,
        };
        let state = EngineState {
            playing: AtomicBool::new(false),
            exporting: AtomicBool::new(false),
            current_step: AtomicUsize::new(0),
            shared: Mutex::new(SharedState { patterns: PatternBank::new(), settings }),
            chain: Mutex::new(chain),
            step_tx,
        };
        Self {
            state: Arc::new(state),
            step_rx,
            stream: None,
            transport: Transport::new(),
            tap: TapTempo::new(),
            pattern_rng: Lcg::new(fastrand::u64(..)),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn shared(&self) -> MutexGuard<'_, SharedState> {
        self.state.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn chain(&self) -> MutexGuard<'_, RenderChain> {
        self.state.chain.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------
    // Output stream
    // ------------------------------------------------------------------

    /// Start the real-time output stream. The engine itself keeps working
    /// without one (offline render, exports, pattern edits).
    pub fn start_output(&mut self) -> Result<(), EngineError> {
        if self.stream.is_some() {
            return Err(EngineError::OutputAlreadyRunning);
        }
        let state = self.state.clone();
        let stream = RealtimeOutputStream::start(move |buffer, _sample_rate, channels| {
            Self::render_audio(&state, buffer, channels);
        })?;
        if stream.sample_rate() != self.sample_rate {
            warn!(
                engine = self.sample_rate,
                device = stream.sample_rate(),
                "device sample rate differs from engine rate"
            );
        }
        self.stream = Some(stream);
        info!("audio output started");
        Ok(())
    }

    pub fn stop_output(&mut self) -> Result<(), EngineError> {
        let stream = self.stream.take().ok_or(EngineError::OutputNotRunning)?;
        stream.stop();
        info!("audio output stopped");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Start playback from step 0. A no-op when already playing or paused.
    pub fn play(&mut self) {
        if self.transport.play() {
            self.state.playing.store(true, Ordering::SeqCst);
            info!("transport playing");
        }
    }

    /// Stop playback and rewind the step cursor. A no-op when stopped.
    pub fn stop(&mut self) {
        if self.transport.stop() {
            self.state.playing.store(false, Ordering::SeqCst);
            self.state.current_step.store(0, Ordering::SeqCst);
            let tempo = self.shared().settings.tempo;
            self.chain().reset_cursor(tempo, fastrand::u64(..), fastrand::u64(..));
            info!("transport stopped");
        }
    }

    /// Pause without resetting the step cursor.
    pub fn pause(&mut self) {
        self.transport.pause();
        if self.transport.state == TransportState::Paused {
            self.state.playing.store(false, Ordering::SeqCst);
        }
    }

    pub fn resume(&mut self) {
        self.transport.resume();
        if self.transport.state == TransportState::Playing {
            self.state.playing.store(true, Ordering::SeqCst);
        }
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state
    }

    /// The most recent step boundary the scheduler crossed.
    pub fn current_step(&self) -> usize {
        self.state.current_step.load(Ordering::SeqCst)
    }

    /// Drain pending step events (non-blocking).
    pub fn poll_step_events(&self) -> Vec<StepEvent> {
        self.step_rx.try_iter().collect()
    }

    // ------------------------------------------------------------------
    // Pattern store
    // ------------------------------------------------------------------

    pub fn set_step(
        &mut self,
        voice: DrumVoice,
        index: usize,
        patch: StepPatch,
    ) -> Result<(), EngineError> {
        self.shared()
            .patterns
            .set_step(voice, index, patch)
            .map_err(EngineError::from)
    }

    pub fn clear_pattern(&mut self) {
        self.shared().patterns.current_mut().clear();
    }

    pub fn randomize_pattern(&mut self, voice: Option<DrumVoice>) {
        let mut rng = self.pattern_rng;
        self.shared().patterns.current_mut().randomize(voice, &mut rng);
        self.pattern_rng = rng;
    }

    pub fn select_bank(&mut self, bank: BankId) {
        self.shared().patterns.select(bank);
    }

    pub fn toggle_bank(&mut self) {
        self.shared().patterns.toggle();
    }

    pub fn current_bank(&self) -> BankId {
        self.shared().patterns.current
    }

    pub fn pattern(&self, bank: BankId) -> DrumPattern {
        self.shared().patterns.pattern(bank).clone()
    }

    pub fn copy_pattern(&mut self, from: BankId, to: BankId) {
        self.shared().patterns.copy_pattern(from, to);
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn settings(&self) -> DrumSettings {
        self.shared().settings.clone()
    }

    pub fn set_swing(&mut self, swing: f32) {
        self.shared().settings.set_swing(swing);
    }

    pub fn set_humanize(&mut self, humanize: f32) {
        self.shared().settings.set_humanize(humanize);
    }

    /// Direct tempo set, deliberately unchecked; the clock asserts on
    /// non-finite values. Tap tempo is the bounds-checked entry point.
    pub fn set_tempo(&mut self, bpm: f64) {
        self.shared().settings.tempo = bpm;
    }

    pub fn set_kit(&mut self, kit: Kit) {
        self.shared().settings.kit = kit;
    }

    /// Set the kit by name; unknown names fall back to the default kit.
    pub fn set_kit_by_name(&mut self, name: &str) {
        let kit = Kit::from_name(name).unwrap_or_else(|| {
            warn!(name, fallback = Kit::default().name(), "unknown kit");
            Kit::default()
        });
        self.set_kit(kit);
    }

    pub fn set_reverb_send(&mut self, voice: DrumVoice, level: f32) {
        self.shared().settings.reverb.set(voice, level);
    }

    pub fn set_sidechain(&mut self, enabled: bool, amount: f32) {
        let mut shared = self.shared();
        shared.settings.sidechain.enabled = enabled;
        shared.settings.set_sidechain_amount(amount);
    }

    /// Register a tap. Returns the applied tempo when the interval computes
    /// to a BPM inside [60, 200]; the clock glides there while playing.
    pub fn tap_tempo(&mut self) -> Option<f64> {
        self.tap_tempo_at(Instant::now())
    }

    pub fn tap_tempo_at(&mut self, now: Instant) -> Option<f64> {
        let bpm = self.tap.tap_at(now)?;
        self.shared().settings.tempo = bpm;
        info!(bpm, "tap tempo");
        Some(bpm)
    }

    // ------------------------------------------------------------------
    // Preview
    // ------------------------------------------------------------------

    /// Fire a single voice immediately, outside the grid. Works while
    /// stopped; hosts use it to audition edits.
    pub fn preview(&self, voice: DrumVoice, velocity: f32) {
        let velocity = velocity.clamp(0.0, 1.0);
        let send = self.shared().settings.reverb.get(voice);
        let level = velocity * (1.0 - REVERB_SEND_ATTENUATION * send);
        let mut chain = self.chain();
        let pitch = chain.voices.kick_pitch_hz();
        chain.voices.queue(Trigger { voice, level, pitch_hz: pitch, offset: 0 });
    }

    // ------------------------------------------------------------------
    // Offline render and export
    // ------------------------------------------------------------------

    fn begin_export(&self) -> Result<ExportGuard, EngineError> {
        if self.state.exporting.swap(true, Ordering::SeqCst) {
            return Err(BackbeatError::ExportInProgress.into());
        }
        // pause the real-time scheduler for the duration of the export
        let was_playing = self.state.playing.swap(false, Ordering::SeqCst);
        Ok(ExportGuard { state: self.state.clone(), was_playing })
    }

    /// Render the current pattern offline from step 0 for `seconds`,
    /// deterministically. Playback is paused for the duration and resumes
    /// (from step 0) afterwards.
    pub fn render_offline(&self, seconds: f64) -> Result<Vec<f32>, EngineError> {
        let _guard = self.begin_export()?;
        Ok(self.render_offline_inner(seconds))
    }

    fn render_offline_inner(&self, seconds: f64) -> Vec<f32> {
        let total = (seconds.max(0.0) * self.sample_rate as f64).round() as usize;
        let mut chain = self.chain();
        let tempo = self.shared().settings.tempo;
        chain.reset_cursor(tempo, OFFLINE_NOISE_SEED, OFFLINE_SCHED_SEED);

        let mut out = Vec::with_capacity(total);
        let mut rendered = 0;
        while rendered < total {
            let frames = (total - rendered).min(MAX_BLOCK_SIZE);
            Self::render_chunk(&self.state, &mut chain, frames, true, false);
            out.extend_from_slice(&chain.master[..frames]);
            rendered += frames;
        }

        // leave the chain in a clean stopped posture for live playback
        chain.reset_cursor(tempo, fastrand::u64(..), fastrand::u64(..));
        self.state.current_step.store(0, Ordering::SeqCst);
        out
    }

    /// Render offline and write a 16-bit stereo WAV (the mono master is
    /// duplicated across both channels, matching live output).
    pub fn export_wav<W: Write>(&self, writer: &mut W, seconds: f64) -> Result<(), EngineError> {
        let _guard = self.begin_export()?;
        info!(seconds, "exporting WAV");
        let mono = self.render_offline_inner(seconds);
        let mut interleaved = Vec::with_capacity(mono.len() * 2);
        for sample in mono {
            interleaved.push(sample);
            interleaved.push(sample);
        }
        write_wav(writer, &interleaved, self.sample_rate, 2)?;
        Ok(())
    }

    /// Write the current bank's pattern as a format-0 Standard MIDI File.
    pub fn export_midi<W: Write>(&self, writer: &mut W) -> Result<(), EngineError> {
        let _guard = self.begin_export()?;
        info!("exporting MIDI");
        let pattern = self.shared().patterns.current().clone();
        write_midi(writer, &pattern)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Render path (audio thread + offline)
    // ------------------------------------------------------------------

    /// Real-time callback. Never blocks: if the chain is held (an export is
    /// rendering), the block is silence.
    fn render_audio(state: &EngineState, buffer: &mut [f32], channels: u16) {
        let channels = channels.max(1) as usize;
        let total_frames = buffer.len() / channels;

        let mut chain = match state.chain.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => {
                buffer.fill(0.0);
                return;
            }
        };

        let advance = state.playing.load(Ordering::SeqCst);
        let mut done = 0usize;
        while done < total_frames {
            let frames = (total_frames - done).min(MAX_BLOCK_SIZE);
            Self::render_chunk(state, &mut chain, frames, advance, true);
            let block = &mut buffer[done * channels..(done + frames) * channels];
            for (frame, &sample) in block.chunks_mut(channels).zip(chain.master.iter()) {
                frame.fill(sample);
            }
            done += frames;
        }
    }

    /// Schedule every step boundary inside the block, then render voices
    /// through the routing graph into `chain.master`. Voices keep sounding
    /// (and previews work) when `advance` is false; only the grid stops.
    fn render_chunk(
        state: &EngineState,
        chain: &mut RenderChain,
        frames: usize,
        advance: bool,
        emit_events: bool,
    ) {
        let frames = frames.min(MAX_BLOCK_SIZE);
        let duck_depth;
        {
            let shared = match state.shared.lock() {
                Ok(guard) => guard,
                Err(e) => e.into_inner(),
            };
            let settings = &shared.settings;
            chain.voices.set_kit(settings.kit);
            duck_depth = if settings.sidechain.enabled {
                settings.sidechain.amount
            } else {
                0.0
            };

            if advance {
                let RenderChain { clock, voices, graph, rng, boundaries, position, .. } =
                    &mut *chain;
                clock.glide_toward(settings.tempo, frames);
                clock.take_boundaries(*position, frames, boundaries);

                let pattern = shared.patterns.current();
                let pitch = voices.kick_pitch_hz();
                for boundary in boundaries.iter() {
                    let base = (boundary.at_sample - *position) as f64;
                    let step_time =
                        base + clock.swing_offset_samples(settings.swing, boundary.index);

                    for voice in DrumVoice::ALL {
                        let step = pattern.steps(voice)[boundary.index];
                        if !step.active {
                            continue;
                        }
                        // independent draw per pass; probability 0 never fires
                        if rng.next_f32() >= step.probability {
                            continue;
                        }
                        let jitter = humanize_offset_samples(
                            settings.humanize,
                            rng.next_f32(),
                            clock.sample_rate(),
                        );
                        let velocity = step.velocity
                            * humanize_velocity_mult(settings.humanize, rng.next_f32());
                        let level = velocity
                            * (1.0 - REVERB_SEND_ATTENUATION * settings.reverb.get(voice));
                        let start = (step_time + jitter).max(0.0);
                        let spacing = clock.ratchet_spacing_samples();
                        for sub in 0..step.ratchet {
                            let offset = (start + sub as f64 * spacing).round() as u32;
                            voices.queue(Trigger { voice, level, pitch_hz: pitch, offset });
                        }
                    }

                    // the duck follows kick authorship, not the probability
                    // outcome, so the pump stays on the grid
                    if pattern.kick[boundary.index].active && settings.sidechain.enabled {
                        graph.schedule_duck(step_time.round() as u32);
                    }

                    state.current_step.store(boundary.index, Ordering::SeqCst);
                    if emit_events {
                        let _ = state.step_tx.try_send(StepEvent {
                            bank: shared.patterns.current,
                            step: boundary.index,
                        });
                    }
                }
            }
        }

        chain.render_buses(frames, duck_depth);
        if advance {
            chain.position += frames as u64;
        }
    }
}
