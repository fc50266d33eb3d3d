// Engine module - flock simulation, rendering and behavior control

pub mod animation;
pub mod asset;
pub mod behavior;
pub mod camera;
pub mod clock;
pub mod compositor;
pub mod config;
pub mod debug_overlay;
pub mod error;
pub mod flock;
#[cfg(test)]
pub mod flock_reference;
pub mod input;
pub mod mesh;
pub mod signal;

#[cfg(test)]
mod shader_check;
