//! Application-facing contracts.
//!
//! The runtime calls into an [`App`] at three points: once after graphics is
//! initialized, once per frame inside the draw session, and once before shutdown.

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::{run_frame, FrameCtx};
