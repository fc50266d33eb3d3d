// Pointer tracking for the predator
// Abstracts winit events into the normalized predator position read by the
// velocity pass. The pointer is parked far outside the window after every
// frame, so the predator only acts on frames where the pointer moved.

use glam::Vec3;
use winit::event::WindowEvent;

/// Parked pointer position; maps to a predator far outside the volume.
pub const POINTER_PARKED: (f32, f32) = (10_000.0, 10_000.0);

pub struct InputState {
    /// Pointer offset from the window centre, in physical pixels.
    pub pointer: (f32, f32),

    // Window dimensions (used to centre and normalize the pointer)
    pub window_size: (u32, u32),
}

impl InputState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pointer: POINTER_PARKED,
            window_size: (width, height),
        }
    }

    /// Feed a winit WindowEvent into the input state.
    pub fn process_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                let (half_w, half_h) = self.half_size();
                self.pointer = (position.x as f32 - half_w, position.y as f32 - half_h);
            }
            WindowEvent::Resized(size) => {
                self.window_size = (size.width, size.height);
            }
            _ => {}
        }
    }

    /// Normalized predator position: x right, y up, z = 0.
    pub fn predator(&self) -> Vec3 {
        let (half_w, half_h) = self.half_size();
        if half_w <= 0.0 || half_h <= 0.0 {
            return Vec3::splat(POINTER_PARKED.0);
        }
        Vec3::new(0.5 * self.pointer.0 / half_w, -0.5 * self.pointer.1 / half_h, 0.0)
    }

    /// Call once per frame after the predator has been read.
    pub fn end_frame(&mut self) {
        self.pointer = POINTER_PARKED;
    }

    fn half_size(&self) -> (f32, f32) {
        (self.window_size.0 as f32 * 0.5, self.window_size.1 as f32 * 0.5)
    }
}
