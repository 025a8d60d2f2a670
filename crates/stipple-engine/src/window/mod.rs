//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and the window, and wires them to [`Graphics`](crate::render::Graphics).

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
pub use winit::dpi::LogicalSize;
pub use winit::event::WindowEvent;
