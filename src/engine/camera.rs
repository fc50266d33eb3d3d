// Fixed perspective camera
//
// Camera model:
//   - Eye on the +Z axis looking at the origin, Y up
//   - Only the aspect ratio changes at runtime (window resize)
//   - Resizing never touches simulation state

use glam::{Mat4, Vec3};

pub struct SceneCamera {
    pub eye: Vec3,
    pub target: Vec3,

    /// Vertical field of view in radians
    pub fov: f32,
    pub near: f32,
    pub far: f32,

    /// Width / height of the surface. Private: kept positive by set_viewport().
    aspect: f32,
}

impl SceneCamera {
    pub fn new(width: u32, height: u32) -> Self {
        let mut camera = Self {
            eye: Vec3::new(0.0, 0.0, 350.0),
            target: Vec3::ZERO,
            fov: 75.0_f32.to_radians(),
            near: 1.0,
            far: 3000.0,
            aspect: 1.0,
        };
        camera.set_viewport(width, height);
        camera
    }

    /// Track the surface size. A minimized window (zero extent) keeps the
    /// previous aspect.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// View matrix: looks from the eye toward the target.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, Vec3::Y)
    }

    /// Perspective projection matrix (wgpu depth range 0..1).
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }
}
