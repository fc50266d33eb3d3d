// Per-frame clock.
// Produces the step fed to the simulation and the elapsed time fed to the
// bird shader. Steps are capped so a stall (window drag, breakpoint, slow
// frame) cannot launch birds across the volume in one integration.

use std::time::{Duration, Instant};

/// Largest step handed to the simulation, in seconds.
pub const MAX_DELTA: f32 = 1.0;

/// Cap a raw frame interval to `MAX_DELTA`. Negative or NaN intervals
/// become zero.
pub fn clamp_delta(raw: f32) -> f32 {
    if raw.is_nan() { 0.0 } else { raw.clamp(0.0, MAX_DELTA) }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    /// Capped step for the simulation.
    pub delta:   f32,
    /// Seconds since the clock started (drives animation phase).
    pub elapsed: f32,
}

#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last:  Instant,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self { start: now, last: now }
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let raw = now.saturating_duration_since(self.last).as_secs_f32();
        self.last = now;
        FrameTime {
            delta: clamp_delta(raw),
            elapsed: now.saturating_duration_since(self.start).as_secs_f32(),
        }
    }
}

/// Rolling frame statistics, reset once per reporting window.
#[derive(Debug)]
pub struct FrameStats {
    window_start: Instant,
    window:       Duration,
    frames:       u32,
    sum_ms:       f32,
    min_ms:       f32,
    max_ms:       f32,
}

/// Summary of one completed reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameReport {
    pub fps:    u32,
    pub avg_ms: f32,
    pub min_ms: f32,
    pub max_ms: f32,
}

impl FrameStats {
    pub fn new(window: Duration) -> Self {
        Self {
            window_start: Instant::now(),
            window,
            frames: 0,
            sum_ms: 0.0,
            min_ms: f32::MAX,
            max_ms: 0.0,
        }
    }

    /// Record one frame; returns a report when the window has elapsed.
    pub fn record(&mut self, now: Instant, frame_ms: f32) -> Option<FrameReport> {
        self.frames += 1;
        self.sum_ms += frame_ms;
        self.min_ms = self.min_ms.min(frame_ms);
        self.max_ms = self.max_ms.max(frame_ms);

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }
        let report = FrameReport {
            fps: (self.frames as f32 / elapsed.as_secs_f32()).round() as u32,
            avg_ms: self.sum_ms / self.frames as f32,
            min_ms: self.min_ms,
            max_ms: self.max_ms,
        };
        *self = Self { window_start: now, ..Self::new(self.window) };
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_at_or_above_one_second_are_capped() {
        for raw in [1.0, 1.5, 30.0, 1e9, f32::INFINITY] {
            assert_eq!(clamp_delta(raw), 1.0);
        }
        assert_eq!(clamp_delta(0.25), 0.25);
        assert_eq!(clamp_delta(-1.0), 0.0);
        assert_eq!(clamp_delta(f32::NAN), 0.0);
    }

    #[test]
    fn tick_caps_a_stalled_frame() {
        let mut clock = FrameClock::new();
        let later = clock.last + Duration::from_secs(5);
        let time = clock.tick_at(later);
        assert_eq!(time.delta, 1.0);
        assert!(time.elapsed >= 5.0);
    }

    #[test]
    fn tick_passes_short_frames_through() {
        let mut clock = FrameClock::new();
        let later = clock.last + Duration::from_millis(16);
        let time = clock.tick_at(later);
        assert!((time.delta - 0.016).abs() < 1e-4);
    }

    #[test]
    fn stats_report_after_window() {
        let mut stats = FrameStats::new(Duration::from_millis(100));
        let start = stats.window_start;
        assert!(stats.record(start + Duration::from_millis(10), 10.0).is_none());
        let report = stats.record(start + Duration::from_millis(100), 20.0).unwrap();
        assert_eq!(report.fps, 20);
        assert_eq!(report.avg_ms, 15.0);
        assert_eq!(report.min_ms, 10.0);
        assert_eq!(report.max_ms, 20.0);
        assert_eq!(stats.frames, 0);
    }
}
