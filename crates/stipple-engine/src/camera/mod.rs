//! 2D orthographic camera.
//!
//! The camera is pure math: it computes the view-projection matrix and unprojects
//! screen points. Pushing the matrix into the per-draw constants is the orchestrator's job.

mod ortho;

pub use ortho::Camera;
