// Render compositor.
// Draws the whole flock with one indexed draw. The vertex stage reads the
// simulation state written this frame (selected by slot), the baked
// animation texture and the frame clock; the draw range hides birds past
// the active count without touching the simulation.

use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use super::animation::AnimationTexture;
use super::camera::SceneCamera;
use super::error::SimulationError;
use super::flock::FlockSimulator;
use super::mesh::{ensure_buffer_fits, BirdVertex, FlockMesh, MeshExtent};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

// ============================================================================
// SCENE
// ============================================================================

/// 0xCCFFFF, shared by the clear color and the fog.
const BACKGROUND_SRGB: [f32; 3] = [0.8, 1.0, 1.0];
const FOG_NEAR: f32 = 100.0;
const FOG_FAR: f32 = 1000.0;

const SKY_HSL: [f32; 3] = [0.6, 1.0, 0.6];
const GROUND_HSL: [f32; 3] = [0.095, 1.0, 0.75];
const HEMISPHERE_INTENSITY: f32 = 4.5;
const SUN_HSL: [f32; 3] = [0.1, 1.0, 0.95];
const SUN_INTENSITY: f32 = 2.0;
const SUN_DIRECTION: Vec3 = Vec3::new(-1.0, 1.75, 1.0);

pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) }
}

fn hue_to_rgb(low: f32, high: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        low + (high - low) * 6.0 * t
    } else if t < 0.5 {
        high
    } else if t < 2.0 / 3.0 {
        low + (high - low) * 6.0 * (2.0 / 3.0 - t)
    } else {
        low
    }
}

/// HSL (hue wraps, saturation and lightness clamped) to sRGB.
pub fn hsl_to_rgb([h, s, l]: [f32; 3]) -> [f32; 3] {
    let h = h.rem_euclid(1.0);
    let s = s.clamp(0.0, 1.0);
    let l = l.clamp(0.0, 1.0);
    if s == 0.0 {
        return [l; 3];
    }
    let high = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let low = 2.0 * l - high;
    [
        hue_to_rgb(low, high, h + 1.0 / 3.0),
        hue_to_rgb(low, high, h),
        hue_to_rgb(low, high, h - 1.0 / 3.0),
    ]
}

fn linear_rgb(srgb: [f32; 3], w: f32) -> [f32; 4] {
    [srgb_to_linear(srgb[0]), srgb_to_linear(srgb[1]), srgb_to_linear(srgb[2]), w]
}

pub fn clear_color() -> wgpu::Color {
    let [r, g, b, _] = linear_rgb(BACKGROUND_SRGB, 1.0);
    wgpu::Color { r: r as f64, g: g as f64, b: b as f64, a: 1.0 }
}


// ============================================================================
// UNIFORMS
// ============================================================================

/// Layout matches `BirdUniforms` in bird.wgsl.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BirdUniforms {
    pub view:          [[f32; 4]; 4],
    pub proj:          [[f32; 4]; 4],
    pub model:         [[f32; 4]; 4],
    pub sky_color:     [f32; 4],
    pub ground_color:  [f32; 4],
    pub sun_color:     [f32; 4],
    pub sun_direction: [f32; 4],
    pub fog_color:     [f32; 4],
    pub fog:           [f32; 4],
    pub frame:         [f32; 4],
}

impl BirdUniforms {
    pub fn new(camera: &SceneCamera, time: f32, size: f32) -> Self {
        Self {
            view: camera.view_matrix().to_cols_array_2d(),
            proj: camera.projection_matrix().to_cols_array_2d(),
            model: Mat4::from_rotation_y(FRAC_PI_2).to_cols_array_2d(),
            sky_color: linear_rgb(hsl_to_rgb(SKY_HSL), HEMISPHERE_INTENSITY),
            ground_color: linear_rgb(hsl_to_rgb(GROUND_HSL), 0.0),
            sun_color: linear_rgb(hsl_to_rgb(SUN_HSL), SUN_INTENSITY),
            sun_direction: SUN_DIRECTION.normalize().extend(0.0).to_array(),
            fog_color: linear_rgb(BACKGROUND_SRGB, 0.0),
            fog: [FOG_NEAR, FOG_FAR, 0.0, 0.0],
            frame: [time, size, 0.0, 0.0],
        }
    }
}

/// Everything the draw needs from the current frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs {
    /// Buffer slot written by this frame's simulation step.
    pub slot:         usize,
    pub time:         f32,
    pub size:         f32,
    pub active_count: u32,
}

// ============================================================================
// COMPOSITOR
// ============================================================================

pub struct Compositor {
    pipeline:       wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    // One per simulation slot.
    bind_groups:    [wgpu::BindGroup; 2],
    vertex_buffer:  wgpu::Buffer,
    index_buffer:   wgpu::Buffer,
    extent:         MeshExtent,
    depth_view:     wgpu::TextureView,
    _animation:     wgpu::Texture,
}

impl Compositor {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        size: (u32, u32),
        mesh: &FlockMesh,
        animation: &AnimationTexture,
        simulator: &FlockSimulator,
    ) -> Result<Self, SimulationError> {
        if mesh.instance_count != simulator.width() * simulator.width() {
            return Err(SimulationError::InvalidConfig(format!(
                "mesh holds {} birds but the simulation holds {}",
                mesh.instance_count,
                simulator.width() * simulator.width()
            )));
        }
        let limit = device.limits().max_buffer_size;
        ensure_buffer_fits("flock vertex", mesh.vertex_bytes().len() as u64, limit)?;
        ensure_buffer_fits("flock index", mesh.index_bytes().len() as u64, limit)?;
        let animation_texture = animation.upload(device, queue)?;
        let animation_view = animation_texture.create_view(&wgpu::TextureViewDescriptor::default());

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Bird Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/bird.wgsl").into()),
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bird Uniform Buffer"),
            size: std::mem::size_of::<BirdUniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bird_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(1),
                texture_entry(2),
                texture_entry(3),
            ],
        });

        let bind_group = |slot: usize| {
            let state = simulator.slot(slot);
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(if slot == 0 { "bird_bind_group_a" } else { "bird_bind_group_b" }),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(state.positions) },
                    wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(state.velocities) },
                    wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::TextureView(&animation_view) },
                ],
            })
        };
        let bind_groups = [bind_group(0), bind_group(1)];

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Bird Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Bird Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[BirdVertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // Wings are single sheets seen from both sides.
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Flock Vertex Buffer"),
            contents: mesh.vertex_bytes(),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Flock Index Buffer"),
            contents: mesh.index_bytes(),
            usage: wgpu::BufferUsages::INDEX,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(SimulationError::Pipeline { stage: "bird render", message: err.to_string() });
        }

        log::info!(
            "flock mesh uploaded: {} vertices, {} indices ({} birds x {} indices)",
            mesh.vertices.len(),
            mesh.indices.len(),
            mesh.instance_count,
            mesh.base_indices
        );

        Ok(Self {
            pipeline,
            uniform_buffer,
            bind_groups,
            vertex_buffer,
            index_buffer,
            extent: mesh.extent(),
            depth_view: create_depth_view(device, size),
            _animation: animation_texture,
        })
    }

    /// Recreate the depth buffer for a new surface size.
    pub fn resize(&mut self, device: &wgpu::Device, size: (u32, u32)) {
        if size.0 > 0 && size.1 > 0 {
            self.depth_view = create_depth_view(device, size);
        }
    }

    /// Record the flock draw into `encoder`, clearing `target` first.
    /// Returns the number of birds rasterized.
    pub fn render(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        camera: &SceneCamera,
        frame: &FrameInputs,
    ) -> u32 {
        let uniforms = BirdUniforms::new(camera, frame.time, frame.size);
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let range = self.extent.draw_range(frame.active_count);
        let drawn = range.len() as u32 / self.extent.base_indices.max(1);

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Flock Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear_color()),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        if range.is_empty() {
            return 0;
        }
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.bind_groups[frame.slot & 1], &[]);
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(range, 0, 0..1);
        drawn
    }

    pub fn total_birds(&self) -> u32 {
        self.extent.instance_count
    }
}

fn create_depth_view(device: &wgpu::Device, (width, height): (u32, u32)) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

#[cfg(test)]
mod tests {
    use glam::{Mat3, Vec2};

    use super::*;

    const MIN_HORIZONTAL: f32 = 0.0001;

    /// CPU copy of `orientation` in bird.wgsl: local +X turned toward the
    /// heading. A (near-)vertical or zero velocity keeps yaw at 0.
    fn orientation(velocity: Vec3) -> Mat3 {
        let mut v = velocity.normalize_or_zero();
        v.z = -v.z;
        let xz = Vec2::new(v.x, v.z).length();
        let (cos_y, sin_y) = if xz > MIN_HORIZONTAL { (v.x / xz, v.z / xz) } else { (1.0, 0.0) };
        let sin_z = v.y.clamp(-1.0, 1.0);
        let cos_z = (1.0 - sin_z * sin_z).max(0.0).sqrt();

        let yaw = Mat3::from_cols(
            Vec3::new(cos_y, 0.0, -sin_y),
            Vec3::Y,
            Vec3::new(sin_y, 0.0, cos_y),
        );
        let pitch = Mat3::from_cols(
            Vec3::new(cos_z, sin_z, 0.0),
            Vec3::new(-sin_z, cos_z, 0.0),
            Vec3::Z,
        );
        yaw * pitch
    }

    fn assert_close(a: [f32; 3], b: [f32; 3]) {
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-5, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn uniform_block_is_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<BirdUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<BirdUniforms>(), 3 * 64 + 7 * 16);
    }

    #[test]
    fn hsl_primaries() {
        assert_close(hsl_to_rgb([0.0, 1.0, 0.5]), [1.0, 0.0, 0.0]);
        assert_close(hsl_to_rgb([1.0 / 3.0, 1.0, 0.5]), [0.0, 1.0, 0.0]);
        assert_close(hsl_to_rgb([2.0 / 3.0, 1.0, 0.5]), [0.0, 0.0, 1.0]);
        assert_close(hsl_to_rgb([0.3, 0.0, 0.25]), [0.25; 3]);
        // Hue wraps.
        assert_close(hsl_to_rgb([1.0, 1.0, 0.5]), hsl_to_rgb([0.0, 1.0, 0.5]));
    }

    #[test]
    fn srgb_endpoints_are_fixed() {
        assert_eq!(srgb_to_linear(0.0), 0.0);
        assert!((srgb_to_linear(1.0) - 1.0).abs() < 1e-6);
        assert!(srgb_to_linear(0.5) < 0.5);
    }

    #[test]
    fn still_bird_keeps_identity_basis() {
        let basis = orientation(Vec3::ZERO);
        assert!(basis.abs_diff_eq(Mat3::IDENTITY, 1e-6));
        let basis = orientation(Vec3::new(3.0, 0.0, 0.0));
        assert!(basis.abs_diff_eq(Mat3::IDENTITY, 1e-6));
    }

    #[test]
    fn vertical_flight_is_finite_and_points_up() {
        for velocity in [Vec3::Y, Vec3::NEG_Y * 7.0, Vec3::new(0.0, 1.0, 1e-9)] {
            let basis = orientation(velocity);
            assert!(basis.is_finite());
            let forward = basis * Vec3::X;
            assert!((forward - velocity.normalize()).length() < 1e-4);
        }
    }

    #[test]
    fn basis_stays_orthonormal() {
        for velocity in [Vec3::new(1.0, 2.0, 3.0), Vec3::new(-4.0, 0.5, 0.1), Vec3::new(0.2, -9.0, -1.0)] {
            let basis = orientation(velocity);
            assert!((basis.determinant() - 1.0).abs() < 1e-4);
            assert!((basis * Vec3::X).is_normalized());
        }
    }

    #[test]
    fn clear_color_matches_fog() {
        let c = clear_color();
        let fog = BirdUniforms::new(&SceneCamera::new(800, 600), 0.0, 0.2).fog_color;
        assert!((c.r as f32 - fog[0]).abs() < 1e-6);
        assert!((c.g - 1.0).abs() < 1e-6);
    }
}
