//! Signal routing: voice buses, sidechain duck, master compressor, reverb
//!
//! The graph is static: kick -> kick bus -> master; snare + hat -> shared
//! bus -> sidechain -> master; master -> compressor -> reverb -> output.

use std::fmt;

use fundsp::hacker::*;

use crate::voices::MAX_BLOCK_SIZE;

/// Duck depth at `sidechain.amount == 1`.
const DUCK_MAX_DEPTH: f64 = 0.8;
/// Gain drop time once a duck fires.
const DUCK_ATTACK_S: f64 = 0.01;
/// Recovery time constant; within ~1% of rest at 0.3 s.
const DUCK_RECOVER_TAU_S: f64 = 0.065;

/// Time-varying gain reduction on the shared bus, keyed by scheduled kick
/// steps. The envelope rises to 1 over a short attack and then decays
/// exponentially back to rest.
pub struct SidechainDuck {
    pending: Vec<u32>,
    env: f64,
    attack_step: f64,
    attack_remaining: u32,
    attack_samples: u32,
    recover_coeff: f64,
}

impl fmt::Debug for SidechainDuck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SidechainDuck")
            .field("env", &self.env)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl SidechainDuck {
    pub fn new(sample_rate: f32) -> Self {
        let attack_samples = (DUCK_ATTACK_S * sample_rate as f64).max(1.0) as u32;
        Self {
            pending: Vec::with_capacity(16),
            env: 0.0,
            attack_step: 1.0 / attack_samples as f64,
            attack_remaining: 0,
            attack_samples,
            recover_coeff: (-1.0 / (DUCK_RECOVER_TAU_S * sample_rate as f64)).exp(),
        }
    }

    /// Schedule a duck at a sample offset relative to the current block.
    pub fn schedule(&mut self, offset: u32) {
        self.pending.push(offset);
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.env = 0.0;
        self.attack_remaining = 0;
    }

    /// Advance one sample and return the gain to apply to the shared bus.
    fn gain_step(&mut self, frame_idx: usize, depth: f64) -> f32 {
        if self.pending.iter().any(|&o| o as usize == frame_idx) {
            self.attack_remaining = self.attack_samples;
        }
        if self.attack_remaining > 0 {
            self.env = (self.env + self.attack_step).min(1.0);
            self.attack_remaining -= 1;
        } else {
            self.env *= self.recover_coeff;
        }
        (1.0 - depth * self.env) as f32
    }

    fn end_block(&mut self, frames: usize) {
        self.pending.retain(|&o| o as usize >= frames);
        for offset in &mut self.pending {
            *offset -= frames as u32;
        }
    }
}

/// Master-bus compressor: a fundsp limiter run around a threshold scale.
pub struct MasterCompressor {
    threshold_db: f32,
    attack_ms: f32,
    release_ms: f32,
    limiter: An<Limiter<U1>>,
}

impl fmt::Debug for MasterCompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterCompressor")
            .field("threshold_db", &self.threshold_db)
            .finish()
    }
}

impl MasterCompressor {
    pub fn new(threshold_db: f32, attack_ms: f32, release_ms: f32) -> Self {
        Self {
            threshold_db,
            attack_ms,
            release_ms,
            limiter: limiter(attack_ms / 1000.0, release_ms / 1000.0),
        }
    }

    fn tick(&mut self, sample: f32) -> f32 {
        let threshold_linear = db_amp(self.threshold_db) as f32;
        let scaled = sample / threshold_linear;
        let input = Frame::from([scaled]);
        let output = self.limiter.tick(&input);
        output[0] * threshold_linear
    }

    fn reset(&mut self) {
        self.limiter = limiter(self.attack_ms / 1000.0, self.release_ms / 1000.0);
    }
}

/// Schroeder reverb: four parallel delay lines with feedback.
pub struct SchroederReverb {
    room_size: f32,
    damping: f32,
    mix: f32,
    delays: Vec<Vec<f32>>,
    positions: Vec<usize>,
    sample_rate: f32,
}

impl fmt::Debug for SchroederReverb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchroederReverb")
            .field("room_size", &self.room_size)
            .field("mix", &self.mix)
            .finish()
    }
}

impl SchroederReverb {
    pub fn new(room_size: f32, damping: f32, mix: f32, sample_rate: f32) -> Self {
        let mut reverb = Self {
            room_size: room_size.clamp(0.0, 1.0),
            damping: damping.clamp(0.0, 1.0),
            mix: mix.clamp(0.0, 1.0),
            delays: Vec::new(),
            positions: Vec::new(),
            sample_rate,
        };
        reverb.rebuild_delays();
        reverb
    }

    fn rebuild_delays(&mut self) {
        let base_delay = self.room_size * 50.0 + 10.0;
        let delay_times_ms = [
            base_delay * 1.0,
            base_delay * 1.13,
            base_delay * 1.27,
            base_delay * 1.41,
        ];
        self.delays = delay_times_ms
            .iter()
            .map(|&ms| {
                let samples = (ms * self.sample_rate / 1000.0) as usize;
                vec![0.0; Ord::max(samples, 1)]
            })
            .collect();
        self.positions = vec![0; self.delays.len()];
    }

    fn process(&mut self, samples: &mut [f32]) {
        let feedback = 0.7 * (1.0 - self.damping * 0.4);

        for sample in samples.iter_mut() {
            let dry = *sample;
            let mut wet = 0.0;
            for (i, delay_buf) in self.delays.iter_mut().enumerate() {
                let pos = self.positions[i];
                let delayed = delay_buf[pos];
                wet += delayed;
                delay_buf[pos] = dry + delayed * feedback;
                self.positions[i] = (pos + 1) % delay_buf.len();
            }
            wet /= self.delays.len() as f32;
            *sample = dry * (1.0 - self.mix) + wet * self.mix;
        }
    }

    fn reset(&mut self) {
        for buf in &mut self.delays {
            buf.fill(0.0);
        }
        self.positions.fill(0);
    }
}

/// The static mixing graph. Voices render into the owned bus buffers, then
/// `process` folds them down to the master output.
pub struct RoutingGraph {
    kick_bus: Vec<f32>,
    shared_bus: Vec<f32>,
    duck: SidechainDuck,
    compressor: MasterCompressor,
    reverb: SchroederReverb,
}

impl fmt::Debug for RoutingGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingGraph")
            .field("duck", &self.duck)
            .finish()
    }
}

impl RoutingGraph {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            kick_bus: vec![0.0; MAX_BLOCK_SIZE],
            shared_bus: vec![0.0; MAX_BLOCK_SIZE],
            duck: SidechainDuck::new(sample_rate),
            compressor: MasterCompressor::new(-6.0, 5.0, 100.0),
            reverb: SchroederReverb::new(0.3, 0.5, 0.15, sample_rate),
        }
    }

    pub fn kick_bus_mut(&mut self, frames: usize) -> &mut [f32] {
        &mut self.kick_bus[..Ord::min(frames, MAX_BLOCK_SIZE)]
    }

    pub fn shared_bus_mut(&mut self, frames: usize) -> &mut [f32] {
        &mut self.shared_bus[..Ord::min(frames, MAX_BLOCK_SIZE)]
    }

    /// Both bus slices at once, for the voice bank's render call.
    pub fn buses_mut(&mut self, frames: usize) -> (&mut [f32], &mut [f32]) {
        let frames = Ord::min(frames, MAX_BLOCK_SIZE);
        (&mut self.kick_bus[..frames], &mut self.shared_bus[..frames])
    }

    /// Schedule a duck at a sample offset relative to the current block.
    pub fn schedule_duck(&mut self, offset: u32) {
        self.duck.schedule(offset);
    }

    /// Fold the buses down to `out`: duck the shared bus, sum to master,
    /// compress, reverb.
    pub fn process(&mut self, frames: usize, duck_depth: f32, out: &mut [f32]) {
        let frames = Ord::min(frames, MAX_BLOCK_SIZE);
        let depth = (duck_depth.clamp(0.0, 1.0) as f64) * DUCK_MAX_DEPTH;

        for i in 0..frames {
            let duck_gain = self.duck.gain_step(i, depth);
            let master = self.kick_bus[i] + self.shared_bus[i] * duck_gain;
            out[i] = self.compressor.tick(master);
        }
        self.duck.end_block(frames);

        self.reverb.process(&mut out[..frames]);
    }

    /// Clear every stateful element for a deterministic offline render.
    pub fn reset(&mut self) {
        self.kick_bus.fill(0.0);
        self.shared_bus.fill(0.0);
        self.duck.reset();
        self.compressor.reset();
        self.reverb.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    #[test]
    fn test_buses_sum_to_master() {
        // the limiter look-ahead delays output by its attack time, so check
        // energy over a window instead of exact sample positions
        let mut graph = RoutingGraph::new(SR);
        graph.kick_bus_mut(1024)[0] = 0.2;
        graph.shared_bus_mut(1024)[10] = 0.1;
        let mut out = vec![0.0; 1024];
        graph.process(1024, 0.0, &mut out);
        let peak = out.iter().map(|s| s.abs()).fold(0.0, f32::max);
        assert!(peak > 0.01, "bus energy must reach the master output");
    }

    #[test]
    fn test_duck_attenuates_shared_bus_only() {
        let mut ducked = RoutingGraph::new(SR);
        let mut dry = RoutingGraph::new(SR);

        for graph in [&mut ducked, &mut dry] {
            graph.shared_bus_mut(2048).fill(0.5);
        }
        ducked.schedule_duck(0);

        let mut out_ducked = vec![0.0; 2048];
        let mut out_dry = vec![0.0; 2048];
        ducked.process(2048, 1.0, &mut out_ducked);
        dry.process(2048, 1.0, &mut out_dry);

        // past the 10 ms attack the ducked bus sits well below the dry one
        let i = 1000;
        assert!(out_ducked[i].abs() < out_dry[i].abs() * 0.5);
    }

    #[test]
    fn test_duck_recovers_within_window() {
        let mut duck = SidechainDuck::new(SR);
        duck.schedule(0);
        let mut gain = 1.0;
        // 0.3 s
        for i in 0..14_400 {
            gain = duck.gain_step(i, DUCK_MAX_DEPTH);
        }
        assert!(gain > 0.98, "gain {gain} should be back near rest");
        duck.end_block(14_400);
    }

    #[test]
    fn test_duck_offset_carries_across_blocks() {
        let mut duck = SidechainDuck::new(SR);
        duck.schedule(600);
        for i in 0..512 {
            assert_eq!(duck.gain_step(i, DUCK_MAX_DEPTH), 1.0);
        }
        duck.end_block(512);
        for i in 0..100 {
            duck.gain_step(i, DUCK_MAX_DEPTH);
        }
        let g = duck.gain_step(100, DUCK_MAX_DEPTH);
        assert!(g < 1.0, "duck must engage at the rebased offset");
    }

    #[test]
    fn test_zero_depth_leaves_gain_unity() {
        let mut duck = SidechainDuck::new(SR);
        duck.schedule(0);
        for i in 0..256 {
            assert_eq!(duck.gain_step(i, 0.0), 1.0);
        }
    }

    #[test]
    fn test_reverb_leaves_a_tail() {
        let mut graph = RoutingGraph::new(SR);
        graph.kick_bus_mut(64)[0] = 0.8;
        let mut out = vec![0.0; 64];
        graph.process(64, 0.0, &mut out);

        // buses are refilled with silence; the tail must still ring
        let mut tail = vec![0.0; 4096];
        graph.kick_bus_mut(4096).fill(0.0);
        graph.shared_bus_mut(4096).fill(0.0);
        graph.process(4096, 0.0, &mut tail);
        let tail_peak = tail.iter().map(|s| s.abs()).fold(0.0, f32::max);
        assert!(tail_peak > 0.0, "reverb tail expected");
    }

    #[test]
    fn test_reset_clears_state() {
        let mut graph = RoutingGraph::new(SR);
        graph.kick_bus_mut(64).fill(0.9);
        graph.schedule_duck(0);
        let mut out = vec![0.0; 64];
        graph.process(64, 1.0, &mut out);

        graph.reset();
        let mut silent = vec![0.0; 4096];
        graph.kick_bus_mut(4096).fill(0.0);
        graph.shared_bus_mut(4096).fill(0.0);
        graph.process(4096, 1.0, &mut silent);
        assert!(silent.iter().all(|&s| s == 0.0));
    }
}
