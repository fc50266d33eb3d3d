// Startup configuration and per-frame flock parameters.
// CLI flags (each also readable from the environment) build a FlockConfig,
// which is validated once and then seeds the mutable FlockParams.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use glam::Vec3;

use super::error::SimulationError;

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser, Debug, Clone)]
#[command(
    name = "flock_stress",
    version,
    about = "GPU-simulated bird flock driven by an external stress signal"
)]
pub struct Args {
    /// glTF/GLB model with morph-target animation.
    #[arg(long, env = "FLOCK_MODEL", default_value = "assets/Parrot.glb")]
    pub model: PathBuf,

    /// Endpoint answering `{"overall_average_stress": <0..100>}`.
    #[arg(long, env = "FLOCK_SIGNAL_URL", default_value = "http://localhost:5001/stress")]
    pub signal_url: String,

    /// Run without polling the stress endpoint.
    #[arg(long)]
    pub no_signal: bool,

    /// Per-request timeout for the stress endpoint.
    #[arg(long, env = "FLOCK_SIGNAL_TIMEOUT_MS", default_value_t = 2000)]
    pub signal_timeout_ms: u64,

    /// Side of the square simulation grid; the flock holds width² birds.
    #[arg(long, env = "FLOCK_WIDTH", default_value_t = 64)]
    pub width: u32,

    /// Edge length of the cubic simulation volume.
    #[arg(long, default_value_t = 800.0)]
    pub bounds: f32,

    #[arg(long, default_value_t = 28.0)]
    pub separation: f32,

    #[arg(long, default_value_t = 20.0)]
    pub alignment: f32,

    #[arg(long, default_value_t = 20.0)]
    pub cohesion: f32,

    /// 0 = fully rule-bound, 1 = flocking steer at half strength.
    #[arg(long, default_value_t = 0.75)]
    pub freedom: f32,

    /// Base scale of each bird.
    #[arg(long, default_value_t = 0.2)]
    pub size: f32,

    /// Initial number of visible birds (defaults to a quarter of the flock).
    #[arg(long)]
    pub count: Option<u32>,

    /// Sampling rate used when baking the animation texture.
    #[arg(long, default_value_t = 60.0)]
    pub frame_rate: f32,
}

impl Args {
    pub fn flock_config(&self) -> Result<FlockConfig, SimulationError> {
        let birds = self.width.saturating_mul(self.width);
        FlockConfig {
            width: self.width,
            bounds: self.bounds,
            separation: self.separation,
            alignment: self.alignment,
            cohesion: self.cohesion,
            freedom: self.freedom,
            size: self.size,
            initial_count: self.count.unwrap_or(birds / 4),
            frame_rate: self.frame_rate,
        }
        .validate()
    }

    /// `None` when signal polling is disabled.
    pub fn signal_endpoint(&self) -> Option<(String, Duration)> {
        if self.no_signal {
            None
        } else {
            Some((self.signal_url.clone(), Duration::from_millis(self.signal_timeout_ms)))
        }
    }
}

// ============================================================================
// FLOCK CONFIG
// ============================================================================

pub const MIN_WIDTH: u32 = 4;
pub const MAX_WIDTH: u32 = 256;

/// Simulation setup. Fields are public, so a hand-built value must go through
/// `validate()` before it reaches the simulator or the mesh expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct FlockConfig {
    pub width:         u32,
    pub bounds:        f32,
    pub separation:    f32,
    pub alignment:     f32,
    pub cohesion:      f32,
    pub freedom:       f32,
    pub size:          f32,
    pub initial_count: u32,
    pub frame_rate:    f32,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            width: 64,
            bounds: 800.0,
            separation: 28.0,
            alignment: 20.0,
            cohesion: 20.0,
            freedom: 0.75,
            size: 0.2,
            initial_count: 64 * 64 / 4,
            frame_rate: 60.0,
        }
    }
}

impl FlockConfig {
    pub fn validate(self) -> Result<Self, SimulationError> {
        let fail = |msg: String| Err(SimulationError::InvalidConfig(msg));

        if !self.width.is_power_of_two() || !(MIN_WIDTH..=MAX_WIDTH).contains(&self.width) {
            return fail(format!(
                "width {} must be a power of two in [{MIN_WIDTH}, {MAX_WIDTH}]",
                self.width
            ));
        }
        if !(self.bounds.is_finite() && self.bounds > 0.0) {
            return fail(format!("bounds {} must be positive", self.bounds));
        }
        for (name, value) in [
            ("separation", self.separation),
            ("alignment", self.alignment),
            ("cohesion", self.cohesion),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return fail(format!("{name} distance {value} must be non-negative"));
            }
        }
        if self.separation + self.alignment + self.cohesion <= 0.0 {
            return fail("at least one flocking distance must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.freedom) {
            return fail(format!("freedom {} must lie in [0, 1]", self.freedom));
        }
        if !(self.size.is_finite() && self.size > 0.0) {
            return fail(format!("size {} must be positive", self.size));
        }
        if self.initial_count > self.bird_count() {
            return fail(format!(
                "count {} exceeds the flock of {} birds",
                self.initial_count,
                self.bird_count()
            ));
        }
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return fail(format!("frame rate {} must be positive", self.frame_rate));
        }
        Ok(self)
    }

    /// Total simulated birds (N = W²).
    pub fn bird_count(&self) -> u32 {
        self.width * self.width
    }

    pub fn half_bounds(&self) -> f32 {
        self.bounds * 0.5
    }

    pub fn initial_params(&self) -> FlockParams {
        FlockParams {
            separation: self.separation,
            alignment: self.alignment,
            cohesion: self.cohesion,
            freedom: self.freedom,
            size: self.size,
            predator: Vec3::splat(10_000.0),
            active_count: self.initial_count,
        }
    }
}

// ============================================================================
// FLOCK PARAMS
// ============================================================================

/// Every parameter the simulation and the bird shader recognize.
/// Written by the behavior controller and the overlay once per frame,
/// read-only to the GPU passes within that frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlockParams {
    /// Birds closer than this push apart.
    pub separation:   f32,
    /// Birds within this band match headings.
    pub alignment:    f32,
    /// Birds within this band pull together.
    pub cohesion:     f32,
    pub freedom:      f32,
    pub size:         f32,
    /// Normalized predator position; scaled by BOUNDS in the velocity pass.
    pub predator:     Vec3,
    /// Number of birds drawn. The rest stay simulated.
    pub active_count: u32,
}
