// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core - Simulation Clock

/// Turns raw frame deltas into simulated seconds: clamp to `max_frame_dt`,
/// then scale (0 pauses, 1 is real time, above 1 fast-forwards).
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationClock {
    pub elapsed: f64,
    time_scale: f64,
    max_frame_dt: f64,
}

impl SimulationClock {
    pub fn new(max_frame_dt: f64) -> Self {
        Self { elapsed: 0.0, time_scale: 1.0, max_frame_dt }
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    pub fn set_time_scale(&mut self, scale: f64) {
        self.time_scale = if scale.is_finite() { scale.max(0.0) } else { 0.0 };
    }

    pub fn is_paused(&self) -> bool {
        self.time_scale == 0.0
    }

    /// Advance by one frame and return the simulated `dt`.
    pub fn advance(&mut self, raw_dt: f64) -> f64 {
        let clamped = if raw_dt.is_finite() { raw_dt.clamp(0.0, self.max_frame_dt) } else { 0.0 };
        let dt = clamped * self.time_scale;
        self.elapsed += dt;
        dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_then_scale() {
        let mut clock = SimulationClock::new(0.1);
        assert_eq!(clock.advance(0.05), 0.05);
        // A stalled frame counts as at most 100 ms.
        assert_eq!(clock.advance(3.0), 0.1);
        clock.set_time_scale(3.0);
        assert!((clock.advance(0.5) - 0.3).abs() < 1e-12);
        assert!((clock.elapsed - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut clock = SimulationClock::new(0.1);
        clock.set_time_scale(0.0);
        assert!(clock.is_paused());
        assert_eq!(clock.advance(0.1), 0.0);
        clock.set_time_scale(1.0);
        assert_eq!(clock.advance(0.1), 0.1);
    }

    #[test]
    fn test_bad_input_is_ignored() {
        let mut clock = SimulationClock::new(0.1);
        assert_eq!(clock.advance(-1.0), 0.0);
        assert_eq!(clock.advance(f64::NAN), 0.0);
        clock.set_time_scale(-2.0);
        assert!(clock.is_paused());
    }
}
