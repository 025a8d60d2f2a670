use crate::device::GpuBackend;
use crate::render::Graphics;
use crate::time::FrameTime;

use super::app::{App, AppControl};

/// Per-frame context passed to [`App::on_frame`].
///
/// The draw session is already open when the app sees it.
pub struct FrameCtx<'a, B: GpuBackend> {
    pub graphics: &'a mut Graphics<B>,
    pub time: FrameTime,
}

/// Drives one frame: opens the draw session, calls the app, presents.
///
/// A fatal graphics error on either end of the session stops the loop.
pub fn run_frame<A, B>(app: &mut A, graphics: &mut Graphics<B>, time: FrameTime) -> AppControl
where
    A: App,
    B: GpuBackend,
{
    if let Err(err) = graphics.start_drawing() {
        return if err.is_fatal() {
            AppControl::Exit
        } else {
            AppControl::Continue
        };
    }

    let control = app.on_frame(&mut FrameCtx { graphics, time });

    match graphics.finish_drawing() {
        Err(err) if err.is_fatal() => AppControl::Exit,
        _ => control,
    }
}
