// Behavioral parameter controller.
// Maps the external stress signal (0 = calm, 100 = stressed) onto alignment,
// cohesion and the visible flock size by linear interpolation between two
// presets. A missing reading keeps the last values untouched, so a flaky
// endpoint never makes the flock jump.

use super::config::FlockParams;

/// One end of the interpolation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preset {
    pub alignment: f32,
    pub cohesion:  f32,
    pub count:     f32,
}

pub const CALM: Preset = Preset { alignment: 82.0, cohesion: 36.42, count: 300.0 };
pub const STRESSED: Preset = Preset { alignment: 0.67, cohesion: 40.55, count: 4096.0 };

pub const SIGNAL_MIN: f32 = 0.0;
pub const SIGNAL_MAX: f32 = 100.0;

/// Outcome of one fetch of the stress signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalReading {
    Value(f32),
    Unavailable,
}

/// `calm + (stressed - calm) * t` with `t = clamp(signal) / 100`, written
/// as a weighted sum so both endpoints come out exact.
fn map_signal(signal: f32, calm: f32, stressed: f32) -> f32 {
    let t = (signal.clamp(SIGNAL_MIN, SIGNAL_MAX) - SIGNAL_MIN) / (SIGNAL_MAX - SIGNAL_MIN);
    calm * (1.0 - t) + stressed * t
}

pub struct BehaviorController {
    calm:       Preset,
    stressed:   Preset,
    /// Upper bound for the active count (the simulated flock size).
    max_count:  u32,
    last_value: Option<f32>,
}

impl BehaviorController {
    pub fn new(calm: Preset, stressed: Preset, max_count: u32) -> Self {
        Self { calm, stressed, max_count, last_value: None }
    }

    /// Last signal value that was applied, if any.
    pub fn last_value(&self) -> Option<f32> {
        self.last_value
    }

    /// Fold this frame's reading (if a fetch completed) into `params`.
    /// Returns whether anything changed.
    pub fn apply(&mut self, reading: Option<SignalReading>, params: &mut FlockParams) -> bool {
        let signal = match reading {
            Some(SignalReading::Value(v)) if v.is_finite() => v,
            _ => return false,
        };
        self.last_value = Some(signal);

        params.alignment = map_signal(signal, self.calm.alignment, self.stressed.alignment);
        params.cohesion = map_signal(signal, self.calm.cohesion, self.stressed.cohesion);
        let count = map_signal(signal, self.calm.count, self.stressed.count);
        params.active_count = (count.round().max(0.0) as u32).min(self.max_count);
        true
    }
}
