use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::KernelError;
use crate::grid::{SoilGrid, TickSummary};
use crate::params::{ParamsPatch, SoilParams};
use crate::render::{Frame, FramePalette, render_frame, try_render_frame};

/// Commands a host issues to the kernel, one at a time and in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelCommand {
    /// Allocate a fresh grid, replacing any existing one.
    Init { width: u32, height: u32 },
    /// Advance one generation.
    Step,
    /// Render the current state.
    Render,
    /// Write a single cell; out-of-bounds is ignored.
    SetCell { x: u32, y: u32, alive: bool },
    /// Zero liveness and fertility.
    Clear,
    /// Zero liveness and reseed fertility.
    Reset,
    /// Reseed fertility but keep the live pattern.
    ResetSoil,
    /// Seed a random live pattern.
    Randomize { density: f64, seed: u64 },
    /// Merge a partial parameter set.
    SetParameters(ParamsPatch),
}

/// Result of advancing one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub summary: TickSummary,
    pub frame: Frame,
}

/// What the kernel hands back for a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelReply {
    Frame(Frame),
    Stepped(StepReport),
    /// The command was applied and produces no output.
    Ack,
    /// The kernel is uninitialized and dropped the command.
    Ignored,
}

/// Lifecycle of the kernel. There is no terminal state.
#[derive(Debug, Clone, Default)]
enum KernelState {
    #[default]
    Uninitialized,
    Ready(SoilGrid),
}

/// Owns the grid, the parameters and the palette, and applies commands.
///
/// The kernel is synchronous and expects exclusive access for each
/// operation; hosts that share it across threads must serialize calls.
#[derive(Debug, Clone, Default)]
pub struct Kernel {
    params: SoilParams,
    palette: FramePalette,
    state: KernelState,
}

impl Kernel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uninitialized kernel that will seed grids from `params`.
    #[must_use]
    pub fn with_params(params: SoilParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_palette(mut self, palette: FramePalette) -> Self {
        self.palette = palette;
        self
    }

    #[must_use]
    pub fn params(&self) -> &SoilParams {
        &self.params
    }

    /// The grid, if initialized.
    #[must_use]
    pub fn grid(&self) -> Option<&SoilGrid> {
        match &self.state {
            KernelState::Ready(grid) => Some(grid),
            KernelState::Uninitialized => None,
        }
    }

    /// Mutable grid access, if initialized.
    #[must_use]
    pub fn grid_mut(&mut self) -> Option<&mut SoilGrid> {
        match &mut self.state {
            KernelState::Ready(grid) => Some(grid),
            KernelState::Uninitialized => None,
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, KernelState::Ready(_))
    }

    /// Allocates a new grid and returns its first frame. On error the
    /// previous state, initialized or not, is left untouched.
    pub fn init(&mut self, width: u32, height: u32) -> Result<Frame, KernelError> {
        let grid = SoilGrid::new(width, height, self.params.initial_fertility)?;
        let frame = try_render_frame(&grid, &self.palette)?;
        info!(width, height, "initialized soil grid");
        self.state = KernelState::Ready(grid);
        Ok(frame)
    }

    /// Runs one tick and renders the result.
    pub fn step(&mut self) -> Option<StepReport> {
        let KernelState::Ready(grid) = &mut self.state else {
            return None;
        };
        let summary = grid.step(&self.params);
        debug!(
            generation = summary.generation.0,
            alive = summary.alive_count,
            births = summary.births,
            deaths = summary.deaths,
            fertility = summary.total_fertility,
            "tick complete"
        );
        let frame = render_frame(grid, &self.palette);
        Some(StepReport { summary, frame })
    }

    /// Renders the current state without advancing it.
    #[must_use]
    pub fn render(&self) -> Option<Frame> {
        self.grid().map(|grid| render_frame(grid, &self.palette))
    }

    pub fn set_cell(&mut self, x: u32, y: u32, alive: bool) {
        if let Some(grid) = self.grid_mut() {
            grid.set_cell(x, y, alive);
        }
    }

    pub fn clear(&mut self) -> Option<Frame> {
        self.grid_mut()?.clear();
        self.render()
    }

    pub fn reset(&mut self) -> Option<Frame> {
        let initial = self.params.initial_fertility;
        self.grid_mut()?.reset(initial);
        self.render()
    }

    pub fn reset_soil(&mut self) -> Option<Frame> {
        let initial = self.params.initial_fertility;
        self.grid_mut()?.reset_soil(initial);
        self.render()
    }

    pub fn randomize(&mut self, density: f64, seed: u64) -> Option<Frame> {
        self.grid_mut()?.randomize(density, seed);
        self.render()
    }

    /// Merges `patch` into the parameters; effective from the next tick.
    /// Returns false while uninitialized, when the patch is dropped.
    pub fn set_parameters(&mut self, patch: &ParamsPatch) -> bool {
        if !self.is_ready() {
            return false;
        }
        if patch.is_empty() {
            debug!("empty parameter patch");
        } else {
            self.params.apply_patch(patch);
        }
        true
    }

    /// Applies one command. Only `Init` can fail; every other command is
    /// ignored while the kernel is uninitialized.
    pub fn apply(&mut self, command: KernelCommand) -> Result<KernelReply, KernelError> {
        debug!(?command, "applying kernel command");
        let reply = match command {
            KernelCommand::Init { width, height } => {
                Some(KernelReply::Frame(self.init(width, height)?))
            }
            KernelCommand::Step => self.step().map(KernelReply::Stepped),
            KernelCommand::Render => self.render().map(KernelReply::Frame),
            KernelCommand::SetCell { x, y, alive } => self.is_ready().then(|| {
                self.set_cell(x, y, alive);
                KernelReply::Ack
            }),
            KernelCommand::Clear => self.clear().map(KernelReply::Frame),
            KernelCommand::Reset => self.reset().map(KernelReply::Frame),
            KernelCommand::ResetSoil => self.reset_soil().map(KernelReply::Frame),
            KernelCommand::Randomize { density, seed } => {
                self.randomize(density, seed).map(KernelReply::Frame)
            }
            KernelCommand::SetParameters(patch) => {
                self.set_parameters(&patch).then_some(KernelReply::Ack)
            }
        };
        Ok(reply.unwrap_or_else(|| {
            warn!("kernel not initialized; command ignored");
            KernelReply::Ignored
        }))
    }
}
