use thiserror::Error;

/// Errors surfaced by kernel operations.
///
/// Interactive noise (out-of-bounds edits, commands before init) is tolerated
/// silently and never produces one of these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Width or height is zero, or the cell/pixel count overflows `usize`.
    #[error("invalid grid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    /// The allocator refused the grid buffers.
    #[error("failed to allocate grid buffers for {cells} cells")]
    Allocation { cells: usize },
    /// A parameter value is out of range or not finite.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
}
