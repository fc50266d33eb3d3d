// Animation texture baker.
// Morph-target frames are resampled at a fixed rate into an RGBA32F texture:
//   column = source vertex, row = animation frame, texel = (dx, dy, dz, valid)
// The bird vertex shader reads it with textureLoad, so no CPU skinning runs
// after load.

use wgpu::util::DeviceExt;

use super::error::SimulationError;

/// Per-vertex position deltas for each morph target, in playback order,
/// plus the clip length they span.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphAnimation {
    pub targets:  Vec<Vec<[f32; 3]>>,
    pub duration: f32,
}

/// Baked (vertex, frame) lookup table. Rows at or beyond `frame_count`
/// are padding and stay zeroed.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationTexture {
    pub width:       u32,
    pub height:      u32,
    pub frame_count: u32,
    pub texels:      Vec<[f32; 4]>,
}

/// Smallest power of two ≥ n (1 for n = 0).
pub fn next_pow2(n: u32) -> u32 {
    n.max(1).next_power_of_two()
}

/// Linear interpolation with the factor clamped to [0, 1].
pub fn lerp_clamped(a: f32, b: f32, t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    a + (b - a) * t
}

/// The two morph targets bracketing `frame` and the blend between them.
fn bracket(frame: u32, frame_count: u32, targets: usize) -> (usize, usize, f32) {
    let pos = frame as f64 / frame_count as f64 * targets as f64;
    let current = (pos.floor() as usize).min(targets - 1);
    let next = (current + 1) % targets;
    let frac = (pos - pos.floor()) as f32;
    (current, next, frac.clamp(0.0, 1.0))
}

impl AnimationTexture {
    /// Resample `anim` at `frame_rate` for a mesh of `vertex_count` vertices.
    ///
    /// Missing deltas (a target shorter than the mesh, or padding columns)
    /// leave that texel's xyz at zero instead of failing the bake.
    pub fn bake(anim: &MorphAnimation, vertex_count: u32, frame_rate: f32) -> Self {
        let frame_count = ((anim.duration * frame_rate).round() as u32).max(1);
        let width = next_pow2(vertex_count);
        let height = next_pow2(frame_count);
        let mut texels = vec![[0.0f32; 4]; (width * height) as usize];

        if anim.targets.is_empty() {
            return Self { width, height, frame_count, texels };
        }

        for frame in 0..frame_count {
            let (cur, next, frac) = bracket(frame, frame_count, anim.targets.len());
            let row = (frame * width) as usize;
            for vertex in 0..width as usize {
                let texel = &mut texels[row + vertex];
                let d0 = anim.targets[cur].get(vertex);
                let d1 = anim.targets[next].get(vertex);
                if let (Some(d0), Some(d1)) = (d0, d1) {
                    for axis in 0..3 {
                        texel[axis] = lerp_clamped(d0[axis], d1[axis], frac);
                    }
                }
                texel[3] = 1.0;
            }
        }

        Self { width, height, frame_count, texels }
    }

    /// Fraction of the texture height holding real frames (`reference.w`).
    pub fn valid_fraction(&self) -> f32 {
        self.frame_count as f32 / self.height as f32
    }

    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    pub fn upload(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<wgpu::Texture, SimulationError> {
        let limit = device.limits().max_texture_dimension_2d;
        if self.width > limit || self.height > limit {
            return Err(SimulationError::TextureTooLarge {
                label: "animation",
                width: self.width,
                height: self.height,
                limit,
            });
        }
        Ok(device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("Animation Texture"),
                size: wgpu::Extent3d {
                    width: self.width,
                    height: self.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba32Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            self.bytes(),
        ))
    }
}

// CPU mirror of the bird shader's row lookup.
#[cfg(test)]
impl AnimationTexture {
    pub fn texel(&self, vertex: u32, frame: u32) -> [f32; 4] {
        self.texels[(frame * self.width + vertex) as usize]
    }

    /// Row read for an instance at `time` seconds. The rate follows the
    /// seeds and the signed x of the heading; the phase wraps on the valid
    /// fraction, so padding rows are never reached.
    pub fn phase_row(&self, time: f32, seeds: [f32; 4], heading_x: f32) -> u32 {
        let rate = 0.0004 + seeds[1] / 10_000.0 + heading_x / 20_000.0;
        let v = (time + seeds[0] * rate).rem_euclid(self.valid_fraction());
        ((v * self.height as f32) as u32).min(self.frame_count - 1)
    }
}
