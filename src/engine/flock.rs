// GPU flocking simulation.
// Bird state lives in two W×W RGBA32F feedback textures (position, velocity),
// each double-buffered. Every frame runs two compute passes in fixed order:
//
//   velocity pass: pos[cur], vel[cur]  → vel[next]
//   position pass: pos[cur], vel[next] → pos[next]
//
// then `next` becomes current. A pass never samples the texture it writes,
// and the velocity-before-position ordering comes from recording the passes
// in that order on one encoder.

use rand::Rng;
use wgpu::util::DeviceExt;

use super::config::{FlockConfig, FlockParams};
use super::error::SimulationError;

/// Texel format of both state textures.
pub const STATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Compute workgroup edge; must match `@workgroup_size` in the passes.
const WORKGROUP: u32 = 8;

/// Initial velocities are drawn uniformly from [-INITIAL_SPEED, INITIAL_SPEED)³.
pub const INITIAL_SPEED: f32 = 5.0;

// ============================================================================
// UNIFORMS
// ============================================================================

/// Uniform block shared by both passes. Layout matches `SimParams` in WGSL.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SimUniforms {
    pub predator:   [f32; 3],
    pub delta:      f32,
    pub separation: f32,
    pub alignment:  f32,
    pub cohesion:   f32,
    pub freedom:    f32,
    pub bounds:     f32,
    pub time:       f32,
    pub width:      u32,
    pub _padding:   u32,
}

impl SimUniforms {
    pub fn new(params: &FlockParams, bounds: f32, width: u32, delta: f32, time: f32) -> Self {
        Self {
            predator: params.predator.to_array(),
            delta,
            separation: params.separation.max(0.0),
            alignment: params.alignment.max(0.0),
            cohesion: params.cohesion.max(0.0),
            freedom: params.freedom.clamp(0.0, 1.0),
            bounds,
            time,
            width,
            _padding: 0,
        }
    }
}

// ============================================================================
// INITIAL STATE
// ============================================================================

/// Texel data for both state textures, row-major over the W×W grid.
#[derive(Debug, Clone, PartialEq)]
pub struct FlockSnapshot {
    pub positions:  Vec<[f32; 4]>,
    pub velocities: Vec<[f32; 4]>,
}

impl FlockSnapshot {
    /// Uniform-random positions inside the bounds and velocities inside
    /// the initial speed cube.
    pub fn random(config: &FlockConfig, rng: &mut impl Rng) -> Self {
        let half = config.half_bounds();
        let n = config.bird_count() as usize;
        let positions = (0..n)
            .map(|_| {
                [
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                    1.0,
                ]
            })
            .collect();
        let velocities = (0..n)
            .map(|_| {
                [
                    rng.gen_range(-INITIAL_SPEED..INITIAL_SPEED),
                    rng.gen_range(-INITIAL_SPEED..INITIAL_SPEED),
                    rng.gen_range(-INITIAL_SPEED..INITIAL_SPEED),
                    1.0,
                ]
            })
            .collect();
        Self { positions, velocities }
    }

    #[cfg(test)]
    pub fn position(&self, bird: usize) -> glam::Vec3 {
        glam::Vec3::from_slice(&self.positions[bird][..3])
    }

    #[cfg(test)]
    pub fn velocity(&self, bird: usize) -> glam::Vec3 {
        glam::Vec3::from_slice(&self.velocities[bird][..3])
    }
}

/// Fail early when the adapter cannot write RGBA32F from a compute pass.
pub fn ensure_supported(adapter: &wgpu::Adapter) -> Result<(), SimulationError> {
    let features = adapter.get_texture_format_features(STATE_FORMAT);
    if features.allowed_usages.contains(wgpu::TextureUsages::STORAGE_BINDING) {
        Ok(())
    } else {
        Err(SimulationError::UnsupportedFormat(STATE_FORMAT))
    }
}

// ============================================================================
// SIMULATOR
// ============================================================================

/// Read-only view of the state produced by the latest `advance`.
/// `slot` tells which of the two buffers is current (0 or 1).
pub struct FlockState<'a> {
    pub slot:       usize,
    pub positions:  &'a wgpu::TextureView,
    pub velocities: &'a wgpu::TextureView,
}

pub struct FlockSimulator {
    width:  u32,
    bounds: f32,
    time:   f32,

    // Textures are kept alive alongside their views.
    _positions:      [wgpu::Texture; 2],
    _velocities:     [wgpu::Texture; 2],
    position_views:  [wgpu::TextureView; 2],
    velocity_views:  [wgpu::TextureView; 2],

    uniform_buffer:    wgpu::Buffer,
    velocity_pipeline: wgpu::ComputePipeline,
    position_pipeline: wgpu::ComputePipeline,
    // Indexed by the current slot.
    velocity_groups: [wgpu::BindGroup; 2],
    position_groups: [wgpu::BindGroup; 2],
    current: usize,
}

impl FlockSimulator {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        config: &FlockConfig,
        initial: &FlockSnapshot,
    ) -> Result<Self, SimulationError> {
        let width = config.width;
        let limit = device.limits().max_texture_dimension_2d;
        if width > limit {
            return Err(SimulationError::TextureTooLarge {
                label: "flock state",
                width,
                height: width,
                limit,
            });
        }

        // Pipeline creation errors surface through this scope instead of
        // the uncaptured-error handler.
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let state_texture = |label: &str, texels: &[[f32; 4]]| {
            device.create_texture_with_data(
                queue,
                &wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d { width, height: width, depth_or_array_layers: 1 },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: STATE_FORMAT,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::STORAGE_BINDING
                        | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                },
                wgpu::util::TextureDataOrder::LayerMajor,
                bytemuck::cast_slice(texels),
            )
        };
        let positions = [
            state_texture("Position State A", &initial.positions),
            state_texture("Position State B", &initial.positions),
        ];
        let velocities = [
            state_texture("Velocity State A", &initial.velocities),
            state_texture("Velocity State B", &initial.velocities),
        ];
        let view = |t: &wgpu::Texture| t.create_view(&wgpu::TextureViewDescriptor::default());
        let position_views = [view(&positions[0]), view(&positions[1])];
        let velocity_views = [view(&velocities[0]), view(&velocities[1])];

        let uniforms = SimUniforms::new(&config.initial_params(), config.bounds, width, 0.0, 0.0);
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Flock Uniform Buffer"),
            contents: bytemuck::cast_slice(&[uniforms]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let layout = state_pass_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Flock Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let velocity_pipeline = compute_pipeline(
            device,
            &pipeline_layout,
            "Velocity Pass",
            include_str!("../shaders/flock_velocity.wgsl"),
        );
        let position_pipeline = compute_pipeline(
            device,
            &pipeline_layout,
            "Position Pass",
            include_str!("../shaders/flock_position.wgsl"),
        );

        let group = |label: &str, a: &wgpu::TextureView, b: &wgpu::TextureView, out: &wgpu::TextureView| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(a) },
                    wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(b) },
                    wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::TextureView(out) },
                ],
            })
        };
        let velocity_groups = [
            group("velocity_bg_a", &position_views[0], &velocity_views[0], &velocity_views[1]),
            group("velocity_bg_b", &position_views[1], &velocity_views[1], &velocity_views[0]),
        ];
        let position_groups = [
            group("position_bg_a", &position_views[0], &velocity_views[1], &position_views[1]),
            group("position_bg_b", &position_views[1], &velocity_views[0], &position_views[0]),
        ];

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(SimulationError::Pipeline {
                stage: "flock compute",
                message: err.to_string(),
            });
        }

        log::info!("flock simulation ready: {width}x{width} birds, bounds {}", config.bounds);

        Ok(Self {
            width,
            bounds: config.bounds,
            time: 0.0,
            _positions: positions,
            _velocities: velocities,
            position_views,
            velocity_views,
            uniform_buffer,
            velocity_pipeline,
            position_pipeline,
            velocity_groups,
            position_groups,
            current: 0,
        })
    }

    /// Advance the flock by one step of `delta` seconds (already capped by
    /// the frame clock) and return the freshly written state.
    pub fn advance(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        params: &FlockParams,
        delta: f32,
    ) -> FlockState<'_> {
        self.time += delta;
        let uniforms = SimUniforms::new(params, self.bounds, self.width, delta, self.time);
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let groups = self.width.div_ceil(WORKGROUP);
        let passes = [
            ("velocity pass", &self.velocity_pipeline, &self.velocity_groups[self.current]),
            ("position pass", &self.position_pipeline, &self.position_groups[self.current]),
        ];
        for (label, pipeline, bind_group) in passes {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(groups, groups, 1);
        }

        self.current = 1 - self.current;
        self.state()
    }

    /// State written by the most recent `advance` (the seed before the first).
    pub fn state(&self) -> FlockState<'_> {
        self.slot(self.current)
    }

    /// Views of a given buffer slot, for building read-only bind groups.
    pub fn slot(&self, slot: usize) -> FlockState<'_> {
        FlockState {
            slot,
            positions: &self.position_views[slot],
            velocities: &self.velocity_views[slot],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }
}

// ============================================================================
// PIPELINE HELPERS
// ============================================================================

/// uniforms, two sampled state textures, one storage texture written by the pass.
fn state_pass_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let sampled = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("flock_pass_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            sampled(1),
            sampled(2),
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: STATE_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
        ],
    })
}

fn compute_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    label: &str,
    source: &str,
) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}
