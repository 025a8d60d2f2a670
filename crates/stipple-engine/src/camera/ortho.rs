use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::error::{GraphicsError, Result};

/// Eye distance behind the `z = 0` plane.
const EYE_Z: f32 = -10.0;
const NEAR: f32 = 1.0;
const FAR: f32 = 1000.0;

/// Orthographic camera looking down +Z at the `z = 0` plane.
///
/// The visible area is `window_size * zoom` world units centered on `position`, so a
/// larger zoom shows more of the world. Rotation turns the view around the camera center.
///
/// Every mutator recomputes the cached view-projection; reads never see stale state.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec2,
    zoom: f32,
    rotation: f32,
    window_size: Vec2,
    view_proj: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec2::ZERO)
    }
}

impl Camera {
    pub fn new(window_size: Vec2) -> Self {
        let mut camera = Self {
            position: Vec2::ZERO,
            zoom: 1.0,
            rotation: 0.0,
            window_size,
            view_proj: Mat4::IDENTITY,
        };
        camera.recompute();
        camera
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.recompute();
    }

    #[inline]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Sets the zoom scale. Rejects values that are not finite or not positive.
    pub fn set_zoom(&mut self, zoom: f32) -> Result<()> {
        if !zoom.is_finite() || zoom <= 0.0 {
            return Err(GraphicsError::invalid(format!(
                "camera zoom must be positive and finite, got {zoom}"
            )));
        }
        self.zoom = zoom;
        self.recompute();
        Ok(())
    }

    /// Rotation in radians, counter-clockwise.
    #[inline]
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn set_rotation(&mut self, radians: f32) {
        self.rotation = radians;
        self.recompute();
    }

    #[inline]
    pub fn window_size(&self) -> Vec2 {
        self.window_size
    }

    /// Captures a new client size. A zero-sized (minimized) window keeps the previous
    /// matrix.
    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_size = Vec2::new(width as f32, height as f32);
        self.recompute();
    }

    /// Cached `projection * rotation * view`.
    #[inline]
    pub fn view_proj(&self) -> Mat4 {
        self.view_proj
    }

    /// Matrix for the `world` slot of the per-draw constants.
    ///
    /// glam stores columns, which is the layout the shaders read, so no transpose is needed.
    #[inline]
    pub fn world_matrix(&self) -> Mat4 {
        self.view_proj
    }

    /// Converts a window point (physical pixels, origin top-left, +Y down) to world space.
    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        if !self.has_area() {
            return self.position;
        }

        let ndc = Vec4::new(
            2.0 * screen.x / self.window_size.x - 1.0,
            -(2.0 * screen.y / self.window_size.y - 1.0),
            1.0,
            0.0,
        );
        let world = self.view_proj.inverse() * ndc;
        Vec2::new(world.x, world.y) + self.position
    }

    fn has_area(&self) -> bool {
        self.window_size.x > 0.0 && self.window_size.y > 0.0
    }

    fn recompute(&mut self) {
        if !self.has_area() {
            return;
        }

        let eye = Vec3::new(self.position.x, self.position.y, EYE_Z);
        let target = Vec3::new(self.position.x, self.position.y, 0.0);
        let view = Mat4::look_at_lh(eye, target, Vec3::Y);
        let rotation = Mat4::from_rotation_z(self.rotation);

        let extent = self.window_size * self.zoom;
        let projection = Mat4::orthographic_lh(
            -extent.x * 0.5,
            extent.x * 0.5,
            -extent.y * 0.5,
            extent.y * 0.5,
            NEAR,
            FAR,
        );

        self.view_proj = projection * rotation * view;
    }
}
