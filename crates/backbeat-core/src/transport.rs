//! Transport state machine and tap tempo

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Tempo range accepted by the tap-tempo entry point.
pub const TAP_BPM_MIN: f64 = 60.0;
pub const TAP_BPM_MAX: f64 = 200.0;

/// Playback state. `Paused` keeps the step cursor; `Stopped` rewinds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Transport controls. All operations are idempotent: repeated `play` or
/// `stop` calls are no-ops, so a host cannot double-start the scheduler.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Transport {
    pub state: TransportState,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the call actually left `Stopped` (the caller
    /// rewinds the clock exactly then).
    pub fn play(&mut self) -> bool {
        match self.state {
            TransportState::Stopped => {
                self.state = TransportState::Playing;
                true
            }
            TransportState::Playing | TransportState::Paused => false,
        }
    }

    /// Returns true when the call actually stopped a running transport.
    pub fn stop(&mut self) -> bool {
        match self.state {
            TransportState::Stopped => false,
            TransportState::Playing | TransportState::Paused => {
                self.state = TransportState::Stopped;
                true
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state == TransportState::Playing {
            self.state = TransportState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == TransportState::Paused {
            self.state = TransportState::Playing;
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Playing or paused; the step cursor is live either way.
    pub fn is_running(&self) -> bool {
        self.state != TransportState::Stopped
    }
}

/// Derives tempo from the interval between consecutive taps. Out-of-range
/// intervals change nothing but still update the reference timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct TapTempo {
    last_tap: Option<Instant>,
}

impl TapTempo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tap(&mut self) -> Option<f64> {
        self.tap_at(Instant::now())
    }

    /// Register a tap at `now`. Returns the new tempo when the interval
    /// lands inside [60, 200] BPM.
    pub fn tap_at(&mut self, now: Instant) -> Option<f64> {
        let previous = self.last_tap.replace(now)?;
        let interval_ms = now.duration_since(previous).as_secs_f64() * 1000.0;
        if interval_ms <= 0.0 {
            return None;
        }
        let bpm = (60_000.0 / interval_ms).round();
        (TAP_BPM_MIN..=TAP_BPM_MAX).contains(&bpm).then_some(bpm)
    }

    pub fn clear(&mut self) {
        self.last_tap = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_play_stop_idempotent() {
        let mut t = Transport::new();
        assert!(t.play());
        assert!(!t.play());
        assert_eq!(t.state, TransportState::Playing);
        assert!(t.stop());
        assert!(!t.stop());
        assert_eq!(t.state, TransportState::Stopped);
    }

    #[test]
    fn test_pause_resume() {
        let mut t = Transport::new();
        t.pause(); // no-op while stopped
        assert_eq!(t.state, TransportState::Stopped);

        t.play();
        t.pause();
        assert_eq!(t.state, TransportState::Paused);
        assert!(t.is_running());
        // play while paused is a no-op, not a resume
        assert!(!t.play());
        assert_eq!(t.state, TransportState::Paused);
        t.resume();
        assert_eq!(t.state, TransportState::Playing);
    }

    #[test]
    fn test_first_tap_records_only() {
        let mut tap = TapTempo::new();
        assert_eq!(tap.tap_at(Instant::now()), None);
    }

    #[test]
    fn test_tap_interval_to_bpm() {
        let mut tap = TapTempo::new();
        let t0 = Instant::now();
        assert_eq!(tap.tap_at(t0), None);
        assert_eq!(tap.tap_at(t0 + Duration::from_millis(500)), Some(120.0));
        assert_eq!(tap.tap_at(t0 + Duration::from_millis(1000)), Some(120.0));
    }

    #[test]
    fn test_out_of_range_tap_rejected_but_recorded() {
        let mut tap = TapTempo::new();
        let t0 = Instant::now();
        tap.tap_at(t0);
        // 2000ms -> 30 BPM, rejected
        assert_eq!(tap.tap_at(t0 + Duration::from_millis(2000)), None);
        // but the timestamp moved: the next interval is measured from it
        assert_eq!(tap.tap_at(t0 + Duration::from_millis(2500)), Some(120.0));
        // 200ms -> 300 BPM, rejected too
        assert_eq!(tap.tap_at(t0 + Duration::from_millis(2700)), None);
    }
}
