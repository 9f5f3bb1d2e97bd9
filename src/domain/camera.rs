// Orthographic projection used to turn pointer pixels into world positions.

use super::math::{Vec2, Vec3};

#[derive(Debug, Clone, Copy)]
pub struct CameraProjection {
    /// World-space center of the view.
    pub position: Vec3,
    /// Half of the visible height in world units.
    pub ortho_size: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
}

impl CameraProjection {
    /// Maps a screen point (pixels, origin bottom-left) onto the z = 0 plane.
    pub fn screen_to_world(&self, screen: Vec2) -> Vec3 {
        let width = self.viewport_width.max(1.0);
        let height = self.viewport_height.max(1.0);
        let aspect = width / height;

        let nx = screen.x / width - 0.5;
        let ny = screen.y / height - 0.5;
        Vec3::new(
            self.position.x + nx * 2.0 * self.ortho_size * aspect,
            self.position.y + ny * 2.0 * self.ortho_size,
            0.0,
        )
    }
}
