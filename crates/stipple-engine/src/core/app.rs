use winit::event::WindowEvent;

use crate::device::GpuBackend;
use crate::render::Graphics;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract.
///
/// Hooks are generic over the backend so the same app runs on a window or headless.
pub trait App {
    /// Called once after graphics is initialized. Create meshes, textures and shaders here.
    fn on_init<B: GpuBackend>(&mut self, graphics: &mut Graphics<B>) -> AppControl {
        let _ = graphics;
        AppControl::Continue
    }

    /// Called for window events before the runtime handles them.
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }

    /// Called once per frame between `start_drawing` and `finish_drawing`.
    fn on_frame<B: GpuBackend>(&mut self, ctx: &mut FrameCtx<'_, B>) -> AppControl;

    /// Called before shutdown. Free everything created in `on_init` here.
    fn on_exit<B: GpuBackend>(&mut self, graphics: &mut Graphics<B>) {
        let _ = graphics;
    }
}
