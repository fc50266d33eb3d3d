use egui::epaint::Shadow;

use super::config::FlockParams;

/// State of the stress signal as shown in the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStatus {
    /// Polling turned off on the command line.
    Disabled,
    /// No fetch has completed yet.
    Pending,
    Live,
    /// Last fetch failed; parameters are held.
    Unavailable,
}

impl SignalStatus {
    pub fn label(self) -> &'static str {
        match self {
            SignalStatus::Disabled => "disabled",
            SignalStatus::Pending => "waiting",
            SignalStatus::Live => "live",
            SignalStatus::Unavailable => "unavailable (holding)",
        }
    }
}

pub struct DebugStats {
    pub fps: u32,
    pub frame_time_avg_ms: f32,
    pub frame_time_min_ms: f32,
    pub frame_time_max_ms: f32,
    pub active_birds: u32,
    pub total_birds: u32,
    pub resolution: (u32, u32),
    /// Last stress value applied by the controller.
    pub stress: Option<f32>,
    pub signal: SignalStatus,
    pub alignment: f32,
    pub cohesion: f32,
}

/// Slider ranges for the tunables window.
pub const DISTANCE_RANGE: std::ops::RangeInclusive<f32> = 0.0..=100.0;
pub const SIZE_RANGE: std::ops::RangeInclusive<f32> = 0.05..=1.0;

pub struct DebugOverlay {
    pub visible: bool,
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl DebugOverlay {
    pub fn new(
        window: &winit::window::Window,
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let egui_ctx = egui::Context::default();

        // Style: dark, semi-transparent, small monospace white font
        let mut visuals = egui::Visuals::dark();
        visuals.window_fill = egui::Color32::from_rgba_premultiplied(0, 0, 0, 180);
        visuals.window_stroke = egui::Stroke::NONE;
        visuals.window_shadow = Shadow::NONE;
        visuals.override_text_color = Some(egui::Color32::WHITE);
        egui_ctx.set_visuals(visuals);

        let mut style = (*egui_ctx.style()).clone();
        style.override_font_id = Some(egui::FontId::monospace(13.0));
        egui_ctx.set_style(style);

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(
            device,
            surface_format,
            None,  // drawn after the flock pass, no depth
            1,     // msaa samples
            false, // no dithering
        );

        Self {
            visible: false,
            egui_ctx,
            egui_state,
            egui_renderer,
        }
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    pub fn handle_window_event(
        &mut self,
        window: &winit::window::Window,
        event: &winit::event::WindowEvent,
    ) -> egui_winit::EventResponse {
        self.egui_state.on_window_event(window, event)
    }

    /// Render one egui frame:
    ///
    /// - `stats`: F3 stats panel (`None` = hidden).
    /// - `params`: tunables window editing the live flock parameters
    ///   (`None` = hidden); `max_count` bounds the count slider.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        window: &winit::window::Window,
        view: &wgpu::TextureView,
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
        stats: Option<&DebugStats>,
        mut params: Option<&mut FlockParams>,
        max_count: u32,
    ) {
        let raw_input = self.egui_state.take_egui_input(window);

        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            // ── F3: stats panel ──────────────────────────────────────────────
            if let Some(stats) = stats {
                egui::Area::new(egui::Id::new("debug_overlay"))
                    .fixed_pos(egui::pos2(10.0, 10.0))
                    .show(ctx, |ui| {
                        egui::Frame::none()
                            .fill(egui::Color32::from_rgba_premultiplied(0, 0, 0, 180))
                            .inner_margin(egui::Margin::same(8.0))
                            .rounding(4.0)
                            .show(ui, |ui: &mut egui::Ui| {
                                ui.label(format!("FPS: {}", stats.fps));
                                ui.label(format!(
                                    "Frame: {:.2} ms (min: {:.1} | max: {:.1})",
                                    stats.frame_time_avg_ms,
                                    stats.frame_time_min_ms,
                                    stats.frame_time_max_ms
                                ));
                                ui.label(format!(
                                    "Birds: {} visible / {} simulated",
                                    stats.active_birds, stats.total_birds
                                ));
                                ui.label(format!(
                                    "Resolution: {} x {}",
                                    stats.resolution.0, stats.resolution.1
                                ));
                                let stress = stats
                                    .stress
                                    .map_or_else(|| "-".to_string(), |s| format!("{s:.1}"));
                                ui.label(format!("Stress: {stress}  [{}]", stats.signal.label()));
                                ui.label(format!(
                                    "Alignment: {:.2}  Cohesion: {:.2}",
                                    stats.alignment, stats.cohesion
                                ));
                            });
                    });
            }

            // ── Tunables ─────────────────────────────────────────────────────
            if let Some(params) = params.as_deref_mut() {
                egui::Window::new("Flock")
                    .default_pos(egui::pos2(10.0, 180.0))
                    .resizable(false)
                    .show(ctx, |ui| {
                        ui.add(egui::Slider::new(&mut params.separation, DISTANCE_RANGE).text("separation"));
                        ui.add(egui::Slider::new(&mut params.alignment, DISTANCE_RANGE).text("alignment"));
                        ui.add(egui::Slider::new(&mut params.cohesion, DISTANCE_RANGE).text("cohesion"));
                        ui.add(egui::Slider::new(&mut params.freedom, 0.0..=1.0).text("freedom"));
                        ui.add(egui::Slider::new(&mut params.size, SIZE_RANGE).text("size"));
                        ui.add(egui::Slider::new(&mut params.active_count, 0..=max_count).text("count"));
                    });
            }
        });

        self.egui_state
            .handle_platform_output(window, full_output.platform_output);

        let tris = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(device, queue, *id, image_delta);
        }

        self.egui_renderer
            .update_buffers(device, queue, encoder, &tris, screen_descriptor);

        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            self.egui_renderer
                .render(&mut render_pass.forget_lifetime(), &tris, screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }
}
