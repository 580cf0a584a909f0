//! Simulation kernel for soilife: Conway's Life on a torus, gated by a
//! diffusing soil fertility field.
//!
//! One tick runs neighbor aggregation, the birth/survival transition with
//! soil bookkeeping, diffusion/decay, and finally a liveness buffer swap.
//! Rendering is independent of ticking and never mutates state.

mod command;
mod error;
mod grid;
mod params;
mod render;

pub use command::{Kernel, KernelCommand, KernelReply, StepReport};
pub use error::KernelError;
pub use grid::{Generation, SoilGrid, TickSummary};
pub use params::{ParamsPatch, SoilParams};
pub use render::{Frame, FramePalette, render_frame, try_render_frame};
