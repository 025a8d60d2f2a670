//! Frame timing.
//!
//! One `FrameClock` per render loop:
//! - call `tick()` once per presented frame to obtain `FrameTime`
//! - call `pace()` after presenting to honour a maximum frame rate

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
