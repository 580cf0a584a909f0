//! Native hosting for the soilife kernel: a dedicated worker thread fed by
//! an ordered command bus, and a headless runner built on top of it.

pub mod headless;
pub mod worker;

pub use headless::{FrameStats, HeadlessOptions, HeadlessReport, ReportSummary};
pub use worker::KernelWorker;
