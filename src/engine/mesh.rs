// Flock geometry.
// The bird's base mesh is replicated once per simulated bird into a single
// vertex/index buffer. Each copy carries the texel address of its bird in
// the simulation textures, so the vertex shader can place it without any
// per-instance CPU work.

use rand::Rng;

use super::animation::AnimationTexture;
use super::asset::BirdModel;
use super::error::SimulationError;

// ============================================================================
// GPU VERTEX
// ============================================================================

/// GPU-ready vertex of one replicated bird.
///   @location(0) position:  vec3<f32>   base-mesh position
///   @location(1) color:     vec3<f32>   static bird color
///   @location(2) reference: vec4<f32>   (gridX/W, gridY/W, vertex/animWidth, frames/animHeight)
///   @location(3) seeds:     vec4<f32>   (instance, shared random, random, random)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BirdVertex {
    pub position:  [f32; 3],
    pub color:     [f32; 3],
    pub reference: [f32; 4],
    pub seeds:     [f32; 4],
}

impl BirdVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x4,
        3 => Float32x4,
    ];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<BirdVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

// ============================================================================
// GRID ADDRESSING
// ============================================================================

/// Texel of bird `instance` in a W×W simulation texture.
/// Must match the compute passes, which index texels the same way.
#[inline]
pub fn grid_coords(instance: u32, width: u32) -> (u32, u32) {
    (instance % width, instance / width)
}

// ============================================================================
// FLOCK MESH
// ============================================================================

/// All birds' geometry in one buffer pair. With V vertices and I indices
/// per bird, bird `i` owns vertices `[i*V, (i+1)*V)` and indices
/// `[i*I, (i+1)*I)`.
pub struct FlockMesh {
    pub vertices:       Vec<BirdVertex>,
    pub indices:        Vec<u32>,
    pub base_indices:   u32,
    pub instance_count: u32,
}

/// Reject a buffer of `size` bytes the device cannot allocate.
pub fn ensure_buffer_fits(label: &'static str, size: u64, limit: u64) -> Result<(), SimulationError> {
    if size > limit {
        return Err(SimulationError::BufferTooLarge { label, size, limit });
    }
    Ok(())
}

/// Buffer bookkeeping that outlives the CPU-side vertex data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshExtent {
    pub base_indices:   u32,
    pub instance_count: u32,
}

impl MeshExtent {
    /// Birds past `active` stay simulated but are never rasterized.
    pub fn draw_range(&self, active: u32) -> std::ops::Range<u32> {
        0..self.base_indices * active.min(self.instance_count)
    }
}

impl FlockMesh {
    /// Replicate `model` for every bird of a `width`×`width` flock.
    ///
    /// Sizes are checked before anything is allocated: every vertex must be
    /// addressable by a u32 index, and neither buffer may exceed
    /// `max_buffer_size` bytes.
    pub fn expand(
        model: &BirdModel,
        width: u32,
        animation: &AnimationTexture,
        max_buffer_size: u64,
        rng: &mut impl Rng,
    ) -> Result<Self, SimulationError> {
        let instance_count = width * width;
        let base_vertices = model.vertex_count();
        let base_indices = model.index_count();

        let total_vertices = u64::from(instance_count) * u64::from(base_vertices);
        let total_indices = u64::from(instance_count) * u64::from(base_indices);
        if total_vertices > u64::from(u32::MAX) + 1 || total_indices > u64::from(u32::MAX) {
            return Err(SimulationError::MeshTooLarge {
                vertices: total_vertices,
                indices: total_indices,
            });
        }
        let vertex_size = total_vertices * std::mem::size_of::<BirdVertex>() as u64;
        let index_size = total_indices * std::mem::size_of::<u32>() as u64;
        ensure_buffer_fits("flock vertex", vertex_size, max_buffer_size)?;
        ensure_buffer_fits("flock index", index_size, max_buffer_size)?;

        let w = width as f32;
        let anim_w = animation.width as f32;
        let frames_fraction = animation.valid_fraction();

        let mut vertices = Vec::with_capacity(total_vertices as usize);
        for instance in 0..instance_count {
            let (gx, gy) = grid_coords(instance, width);
            // Drawn once per bird; shared by all of its vertices.
            let shared: f32 = rng.gen_range(0.0..1.0);
            for (v, (position, color)) in model.positions.iter().zip(&model.colors).enumerate() {
                vertices.push(BirdVertex {
                    position: *position,
                    color: *color,
                    reference: [gx as f32 / w, gy as f32 / w, v as f32 / anim_w, frames_fraction],
                    seeds: [
                        instance as f32,
                        shared,
                        rng.gen_range(0.0..1.0),
                        rng.gen_range(0.0..1.0),
                    ],
                });
            }
        }

        let mut indices = Vec::with_capacity(total_indices as usize);
        for instance in 0..instance_count {
            let offset = instance * base_vertices;
            indices.extend(model.indices.iter().map(|&i| i + offset));
        }

        Ok(Self { vertices, indices, base_indices, instance_count })
    }

    pub fn extent(&self) -> MeshExtent {
        MeshExtent { base_indices: self.base_indices, instance_count: self.instance_count }
    }

    /// Cast vertex slice to raw bytes for wgpu buffer upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Cast index slice to raw bytes for wgpu buffer upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::animation::MorphAnimation;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn quad_bird() -> BirdModel {
        let positions = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]];
        let animation = MorphAnimation { targets: vec![vec![[0.0; 3]; 4]; 2], duration: 0.5 };
        BirdModel::new(positions, None, Some(vec![0, 1, 2, 0, 2, 3]), animation).unwrap()
    }

    /// Default wgpu `max_buffer_size`.
    const LIMIT: u64 = 256 << 20;

    fn expand(width: u32) -> (FlockMesh, AnimationTexture) {
        let model = quad_bird();
        let anim = AnimationTexture::bake(&model.animation, model.vertex_count(), 60.0);
        let mut rng = StdRng::seed_from_u64(7);
        (FlockMesh::expand(&model, width, &anim, LIMIT, &mut rng).unwrap(), anim)
    }

    /// A model of `vertices` points with no real deformation.
    fn dense_bird(vertices: usize) -> BirdModel {
        let positions = vec![[0.0; 3]; vertices];
        let animation = MorphAnimation { targets: vec![Vec::new()], duration: 1.0 };
        BirdModel::new(positions, Some(vec![[1.0; 3]; vertices]), None, animation).unwrap()
    }

    fn expand_dense(vertices: usize, width: u32) -> Result<FlockMesh, SimulationError> {
        let model = dense_bird(vertices);
        let anim = AnimationTexture { width: 1, height: 1, frame_count: 1, texels: vec![[0.0; 4]] };
        let mut rng = StdRng::seed_from_u64(7);
        FlockMesh::expand(&model, width, &anim, LIMIT, &mut rng)
    }

    #[test]
    fn grid_coords_cover_grid_exactly_once() {
        for width in [4u32, 8, 64] {
            let seen: HashSet<(u32, u32)> =
                (0..width * width).map(|i| grid_coords(i, width)).collect();
            assert_eq!(seen.len(), (width * width) as usize);
            assert!(seen.iter().all(|&(x, y)| x < width && y < width));
        }
    }

    #[test]
    fn buffer_sizes_scale_with_instances() {
        let (mesh, _) = expand(4);
        assert_eq!(mesh.instance_count, 16);
        assert_eq!(mesh.vertices.len(), 16 * 4);
        assert_eq!(mesh.indices.len(), 16 * 6);
    }

    #[test]
    fn indices_are_offset_per_instance() {
        let (mesh, _) = expand(4);
        assert_eq!(&mesh.indices[..6], &[0, 1, 2, 0, 2, 3]);
        assert_eq!(&mesh.indices[6..12], &[4, 5, 6, 4, 6, 7]);
        let last = &mesh.indices[15 * 6..];
        assert_eq!(last, &[60, 61, 62, 60, 62, 63]);
    }

    #[test]
    fn instance_vertices_share_reference_and_shared_seed() {
        let (mesh, anim) = expand(4);
        for (instance, bird) in mesh.vertices.chunks(4).enumerate() {
            let (gx, gy) = grid_coords(instance as u32, 4);
            for (v, vertex) in bird.iter().enumerate() {
                assert_eq!(vertex.reference[0], gx as f32 / 4.0);
                assert_eq!(vertex.reference[1], gy as f32 / 4.0);
                assert_eq!(vertex.reference[2], v as f32 / anim.width as f32);
                assert_eq!(vertex.reference[3], anim.valid_fraction());
                assert_eq!(vertex.seeds[0], instance as f32);
                assert_eq!(vertex.seeds[1], bird[0].seeds[1]);
            }
        }
    }

    #[test]
    fn draw_range_is_capped_by_instance_count() {
        let (mesh, _) = expand(4);
        let extent = mesh.extent();
        assert_eq!(extent.draw_range(3), 0..18);
        assert_eq!(extent.draw_range(0), 0..0);
        assert_eq!(extent.draw_range(1000), 0..16 * 6);
    }

    #[test]
    fn vertex_buffer_over_device_limit_is_rejected() {
        // 128² birds × 300 vertices × 56 bytes ≈ 275 MB.
        match expand_dense(300, 128) {
            Err(SimulationError::BufferTooLarge { label, size, limit }) => {
                assert_eq!(label, "flock vertex");
                assert_eq!(size, 128 * 128 * 300 * 56);
                assert_eq!(limit, LIMIT);
            }
            other => panic!("expected BufferTooLarge, got {:?}", other.err()),
        }
    }

    #[test]
    fn vertex_count_past_u32_indexing_is_rejected() {
        // 256² birds × 65537 vertices wraps a u32 product.
        match expand_dense(65_537, 256) {
            Err(SimulationError::MeshTooLarge { vertices, .. }) => {
                assert_eq!(vertices, 65_536 * 65_537);
            }
            other => panic!("expected MeshTooLarge, got {:?}", other.err()),
        }
    }

    #[test]
    fn buffer_limit_is_inclusive() {
        assert!(ensure_buffer_fits("flock index", LIMIT, LIMIT).is_ok());
        assert!(ensure_buffer_fits("flock index", LIMIT + 1, LIMIT).is_err());
    }

    #[test]
    fn vertex_layout_matches_struct_size() {
        assert_eq!(std::mem::size_of::<BirdVertex>(), 56);
        assert_eq!(BirdVertex::desc().array_stride, 56);
    }
}
