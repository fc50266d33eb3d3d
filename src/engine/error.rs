// Error types for the flock renderer.
// Asset, simulation and GPU errors are fatal at startup; signal errors are
// recovered inside the poller and only ever logged.

use thiserror::Error;

/// Failures while reading the bird model. There is no fallback geometry,
/// so every variant aborts initialization.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to import glTF '{path}': {source}")]
    Import {
        path: String,
        #[source]
        source: gltf::Error,
    },
    #[error("model contains no mesh primitives")]
    NoMesh,
    #[error("mesh primitive has no POSITION attribute")]
    NoPositions,
    #[error("mesh primitive has no morph targets to animate")]
    NoMorphTargets,
    #[error("morph target {target} has {found} deltas, expected {expected}")]
    MorphTargetMismatch { target: usize, found: usize, expected: usize },
    #[error("model has no animation to derive a duration from")]
    NoAnimation,
    #[error("index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
}

/// Failures while building or validating the GPU flocking simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("texture format {0:?} cannot be used as a storage texture on this adapter")]
    UnsupportedFormat(wgpu::TextureFormat),
    #[error("{label} texture of {width}x{height} exceeds the device limit of {limit}")]
    TextureTooLarge { label: &'static str, width: u32, height: u32, limit: u32 },
    #[error("{label} buffer of {size} bytes exceeds the device limit of {limit}")]
    BufferTooLarge { label: &'static str, size: u64, limit: u64 },
    #[error("flock mesh of {vertices} vertices and {indices} indices does not fit 32-bit indexing")]
    MeshTooLarge { vertices: u64, indices: u64 },
    #[error("{stage} pipeline failed validation: {message}")]
    Pipeline { stage: &'static str, message: String },
}

/// Failures while fetching the behavioral stress signal.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint answered {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed payload: {0}")]
    Payload(String),
    #[error("signal value {0} is not finite")]
    NotFinite(f32),
}

/// Failures while acquiring the window surface, adapter or device.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}
