// GPU flock driven by an external stress signal
// Per frame: poll signal -> velocity pass -> position pass -> draw flock -> overlay
// The whole flock is one indexed draw; visible size is a draw range.

mod engine;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use winit::{
    event::{Event as WinitEvent, WindowEvent, ElementState, KeyEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

use engine::animation::AnimationTexture;
use engine::asset::{BirdModel, load_bird};
use engine::behavior::{BehaviorController, CALM, STRESSED, SignalReading};
use engine::camera::SceneCamera;
use engine::clock::{FrameClock, FrameReport, FrameStats, FrameTime};
use engine::compositor::{Compositor, FrameInputs};
use engine::config::{Args, FlockConfig, FlockParams};
use engine::debug_overlay::{DebugOverlay, DebugStats, SignalStatus};
use engine::error::GpuError;
use engine::flock::{FlockSimulator, FlockSnapshot, ensure_supported};
use engine::input::InputState;
use engine::mesh::FlockMesh;
use engine::signal::{HttpStressSource, SignalPoller};

// ============================================================================
// APPLICATION STATE
// ============================================================================

struct State {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: winit::dpi::PhysicalSize<u32>,

    simulator: FlockSimulator,
    compositor: Compositor,
    camera: SceneCamera,
    input: InputState,
    overlay: DebugOverlay,

    params: FlockParams,
    controller: BehaviorController,
    poller: Option<SignalPoller>,
    signal_status: SignalStatus,

    clock: FrameClock,
    frame_stats: FrameStats,
    last_report: FrameReport,
}

impl State {
    async fn new(
        window: Arc<Window>,
        flock: &FlockConfig,
        model: &BirdModel,
        poller: Option<SignalPoller>,
    ) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone()).map_err(GpuError::from)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("adapter: {} ({:?})", info.name, info.backend);
        ensure_supported(&adapter).context("adapter cannot run the flock simulation")?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::from)?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &config);

        let mut rng = StdRng::from_entropy();
        let seed = FlockSnapshot::random(flock, &mut rng);
        let simulator = FlockSimulator::new(&device, &queue, flock, &seed)
            .context("failed to initialize the flock simulation")?;

        let animation = AnimationTexture::bake(&model.animation, model.vertex_count(), flock.frame_rate);
        log::info!(
            "animation baked: {} frames into {}x{}",
            animation.frame_count,
            animation.width,
            animation.height
        );
        let mesh = FlockMesh::expand(
            model,
            flock.width,
            &animation,
            device.limits().max_buffer_size,
            &mut rng,
        )
        .context("failed to build the flock mesh")?;
        let compositor = Compositor::new(
            &device,
            &queue,
            surface_format,
            (config.width, config.height),
            &mesh,
            &animation,
            &simulator,
        )
        .context("failed to initialize the flock renderer")?;

        let overlay = DebugOverlay::new(&window, &device, surface_format);

        Ok(Self {
            camera: SceneCamera::new(config.width, config.height),
            input: InputState::new(size.width, size.height),
            params: flock.initial_params(),
            controller: BehaviorController::new(CALM, STRESSED, flock.bird_count()),
            signal_status: if poller.is_some() { SignalStatus::Pending } else { SignalStatus::Disabled },
            poller,
            clock: FrameClock::new(),
            frame_stats: FrameStats::new(Duration::from_secs(1)),
            last_report: FrameReport::default(),
            window,
            surface,
            device,
            queue,
            config,
            size,
            simulator,
            compositor,
            overlay,
        })
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.camera.set_viewport(new_size.width, new_size.height);
            self.compositor.resize(&self.device, (new_size.width, new_size.height));
        }
    }

    /// Fold in this frame's signal reading and pointer, then return the
    /// capped frame step.
    fn update(&mut self) -> FrameTime {
        let frame = self.clock.tick();

        if let Some(poller) = self.poller.as_mut() {
            let reading = poller.poll();
            match reading {
                Some(SignalReading::Value(_)) => self.signal_status = SignalStatus::Live,
                Some(SignalReading::Unavailable) => self.signal_status = SignalStatus::Unavailable,
                None => {}
            }
            self.controller.apply(reading, &mut self.params);
        }
        self.params.predator = self.input.predator();

        frame
    }

    fn render(&mut self, frame: FrameTime) -> Result<u32, wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        // Velocity then position, recorded before the draw that reads them.
        let slot = self
            .simulator
            .advance(&self.queue, &mut encoder, &self.params, frame.delta)
            .slot;

        let drawn = self.compositor.render(
            &self.queue,
            &mut encoder,
            &view,
            &self.camera,
            &FrameInputs {
                slot,
                time: frame.elapsed,
                size: self.params.size,
                active_count: self.params.active_count,
            },
        );

        if self.overlay.visible {
            let screen_descriptor = egui_wgpu::ScreenDescriptor {
                size_in_pixels: [self.config.width, self.config.height],
                pixels_per_point: self.window.scale_factor() as f32,
            };
            let stats = self.debug_stats(drawn);
            let max_count = self.compositor.total_birds();
            self.overlay.render(
                &self.device,
                &self.queue,
                &mut encoder,
                &self.window,
                &view,
                &screen_descriptor,
                Some(&stats),
                Some(&mut self.params),
                max_count,
            );
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.input.end_frame();
        Ok(drawn)
    }

    fn debug_stats(&self, drawn: u32) -> DebugStats {
        DebugStats {
            fps: self.last_report.fps,
            frame_time_avg_ms: self.last_report.avg_ms,
            frame_time_min_ms: self.last_report.min_ms,
            frame_time_max_ms: self.last_report.max_ms,
            active_birds: drawn,
            total_birds: self.compositor.total_birds(),
            resolution: (self.size.width, self.size.height),
            stress: self.controller.last_value(),
            signal: self.signal_status,
            alignment: self.params.alignment,
            cohesion: self.params.cohesion,
        }
    }

    fn record_frame(&mut self, frame: FrameTime, drawn: u32) {
        if let Some(report) = self.frame_stats.record(Instant::now(), frame.delta * 1000.0) {
            self.last_report = report;
            let stress = self
                .controller
                .last_value()
                .map_or_else(|| "-".to_string(), |s| format!("{s:.1}"));
            log::info!(
                "FPS: {} | Birds: {}/{} | Stress: {} ({})",
                report.fps,
                drawn,
                self.compositor.total_birds(),
                stress,
                self.signal_status.label()
            );
        }
    }
}

// ============================================================================
// MAIN
// ============================================================================

fn start_poller(args: &Args) -> Option<SignalPoller> {
    let Some((url, timeout)) = args.signal_endpoint() else {
        log::info!("stress signal disabled");
        return None;
    };
    match HttpStressSource::new(url.clone(), timeout) {
        Ok(source) => {
            log::info!("polling stress signal at {url}");
            Some(SignalPoller::spawn(source))
        }
        Err(err) => {
            log::warn!("stress signal client unavailable ({err}); running with fixed parameters");
            None
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let flock = args.flock_config().context("invalid flock configuration")?;
    let model = load_bird(&args.model)
        .with_context(|| format!("failed to load bird model {}", args.model.display()))?;
    let poller = start_poller(&args);

    let event_loop = EventLoop::new().context("failed to create event loop")?;

    let window_attributes = Window::default_attributes()
        .with_title(format!("Flock Stress ({} birds)", flock.bird_count()))
        .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

    let window = Arc::new(
        event_loop
            .create_window(window_attributes)
            .context("failed to create window")?,
    );

    let mut state = pollster::block_on(State::new(window.clone(), &flock, &model, poller))?;
    drop(model);

    event_loop.run(move |event, control_flow| {
        match event {
            WinitEvent::WindowEvent {
                ref event,
                window_id,
            } if window_id == window.id() => {
                let response = state.overlay.handle_window_event(&window, event);
                if !(state.overlay.visible && response.consumed) {
                    state.input.process_event(event);
                }

                match event {
                    WindowEvent::CloseRequested
                    | WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                state: ElementState::Pressed,
                                physical_key: PhysicalKey::Code(KeyCode::Escape),
                                ..
                            },
                        ..
                    } => control_flow.exit(),
                    WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                state: ElementState::Pressed,
                                physical_key: PhysicalKey::Code(KeyCode::F3),
                                repeat: false,
                                ..
                            },
                        ..
                    } => state.overlay.toggle(),
                    WindowEvent::Resized(physical_size) => {
                        state.resize(*physical_size);
                    }
                    WindowEvent::RedrawRequested => {
                        let frame = state.update();
                        match state.render(frame) {
                            Ok(drawn) => state.record_frame(frame, drawn),
                            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                                state.resize(state.size)
                            }
                            Err(wgpu::SurfaceError::OutOfMemory) => {
                                log::error!("GPU out of memory");
                                control_flow.exit()
                            }
                            Err(e) => log::warn!("surface error: {e:?}"),
                        }
                    }
                    _ => {}
                }
            }
            WinitEvent::AboutToWait => {
                window.request_redraw();
            }
            _ => {}
        }
    }).context("event loop failed")?;

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
