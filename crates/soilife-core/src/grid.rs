use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::params::SoilParams;

/// Number of completed ticks since the last init, clear or reset.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Generation(pub u64);

impl Generation {
    /// Returns the next sequential generation.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Per-tick statistics gathered while the tick runs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TickSummary {
    pub generation: Generation,
    pub alive_count: usize,
    pub births: usize,
    pub deaths: usize,
    pub total_fertility: f32,
}

/// Authoritative per-cell state of a toroidal grid.
///
/// Liveness is double buffered and swapped at the end of every tick. The
/// fertility field is single buffered and updated in place, which is safe
/// because every fertility update reads neighbor sums captured before the
/// first mutation of the tick.
#[derive(Debug, Clone)]
pub struct SoilGrid {
    width: u32,
    height: u32,
    alive: Vec<u8>,
    alive_next: Vec<u8>,
    fertility: Vec<f32>,
    neighbor_alive: Vec<u8>,
    neighbor_fertility: Vec<f32>,
    generation: Generation,
    alive_count: usize,
}

impl SoilGrid {
    /// Allocates a `width * height` grid with every cell dead and every
    /// fertility set to `initial_fertility`.
    pub fn new(width: u32, height: u32, initial_fertility: f32) -> Result<Self, KernelError> {
        let cells = cell_count(width, height)?;
        Ok(Self {
            width,
            height,
            alive: try_filled(cells, 0_u8)?,
            alive_next: try_filled(cells, 0_u8)?,
            fertility: try_filled(cells, initial_fertility.max(0.0))?,
            neighbor_alive: try_filled(cells, 0_u8)?,
            neighbor_fertility: try_filled(cells, 0.0_f32)?,
            generation: Generation::zero(),
            alive_count: 0,
        })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.alive.len()
    }

    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Live cells in the active buffer.
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Active liveness buffer, one byte (0 or 1) per cell in row-major order.
    #[must_use]
    pub fn alive(&self) -> &[u8] {
        &self.alive
    }

    #[must_use]
    pub fn fertility(&self) -> &[f32] {
        &self.fertility
    }

    /// Direct fertility access for hosts that paint soil. Callers must keep
    /// every value non-negative.
    #[must_use]
    pub fn fertility_mut(&mut self) -> &mut [f32] {
        &mut self.fertility
    }

    /// Live-neighbor counts from the most recent aggregation pass.
    #[must_use]
    pub fn neighbor_counts(&self) -> &[u8] {
        &self.neighbor_alive
    }

    /// Neighbor fertility sums from the most recent aggregation pass.
    #[must_use]
    pub fn neighbor_fertility_sums(&self) -> &[f32] {
        &self.neighbor_fertility
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Returns whether `(x, y)` is alive; out-of-bounds reads as dead.
    #[must_use]
    pub fn is_alive(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.alive[self.offset(x, y)] == 1
    }

    /// Fertility at `(x, y)`, or `None` when out of bounds.
    #[must_use]
    pub fn fertility_at(&self, x: u32, y: u32) -> Option<f32> {
        if x < self.width && y < self.height {
            Some(self.fertility[self.offset(x, y)])
        } else {
            None
        }
    }

    /// Writes a cell of the active buffer. Out-of-bounds coordinates are ignored.
    pub fn set_cell(&mut self, x: u32, y: u32, alive: bool) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = self.offset(x, y);
        let value = u8::from(alive);
        let previous = self.alive[idx];
        if previous == value {
            return;
        }
        self.alive[idx] = value;
        if alive {
            self.alive_count += 1;
        } else {
            self.alive_count -= 1;
        }
    }

    /// Zeroes liveness and fertility and restarts the generation counter.
    pub fn clear(&mut self) {
        self.alive.fill(0);
        self.fertility.fill(0.0);
        self.alive_count = 0;
        self.generation = Generation::zero();
    }

    /// Kills every cell, reseeds fertility to `initial_fertility` and
    /// restarts the generation counter.
    pub fn reset(&mut self, initial_fertility: f32) {
        self.alive.fill(0);
        self.alive_count = 0;
        self.reset_soil(initial_fertility);
    }

    /// Keeps the live pattern but reseeds fertility and restarts the
    /// generation counter.
    pub fn reset_soil(&mut self, initial_fertility: f32) {
        self.fertility.fill(initial_fertility.max(0.0));
        self.generation = Generation::zero();
    }

    /// Replaces liveness with a Bernoulli pattern of the given density.
    ///
    /// The same seed always yields the same pattern. Fertility is untouched.
    pub fn randomize(&mut self, density: f64, seed: u64) {
        let density = if density.is_nan() {
            0.0
        } else {
            density.clamp(0.0, 1.0)
        };
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut count = 0;
        for cell in &mut self.alive {
            let alive = rng.random_bool(density);
            *cell = u8::from(alive);
            count += usize::from(alive);
        }
        self.alive_count = count;
        self.generation = Generation::zero();
    }

    /// Runs one full tick and returns its statistics.
    pub fn step(&mut self, params: &SoilParams) -> TickSummary {
        self.aggregate_neighbors();
        let (births, deaths) = self.apply_transitions(params);
        let total_fertility = self.apply_diffusion(params);
        std::mem::swap(&mut self.alive, &mut self.alive_next);
        self.generation = self.generation.next();
        TickSummary {
            generation: self.generation,
            alive_count: self.alive_count,
            births,
            deaths,
            total_fertility,
        }
    }

    /// Fills both neighbor scratch buffers from the current liveness and
    /// fertility over the wrapped 8-neighborhood of every cell.
    pub fn aggregate_neighbors(&mut self) {
        let width = self.width as usize;
        let height = self.height as usize;
        let alive = &self.alive;
        let fertility = &self.fertility;

        for y in 0..height {
            let up_row = (if y == 0 { height - 1 } else { y - 1 }) * width;
            let row = y * width;
            let down_row = (if y + 1 == height { 0 } else { y + 1 }) * width;
            for x in 0..width {
                let left = if x == 0 { width - 1 } else { x - 1 };
                let right = if x + 1 == width { 0 } else { x + 1 };
                let neighbors = [
                    up_row + left,
                    up_row + x,
                    up_row + right,
                    row + left,
                    row + right,
                    down_row + left,
                    down_row + x,
                    down_row + right,
                ];

                let mut count = 0_u8;
                let mut soil = 0.0_f32;
                for idx in neighbors {
                    count += alive[idx];
                    soil += fertility[idx];
                }
                self.neighbor_alive[row + x] = count;
                self.neighbor_fertility[row + x] = soil;
            }
        }
    }

    /// Applies the birth/survival rule into the next liveness buffer and
    /// settles soil costs and deposits. Returns `(births, deaths)` and
    /// refreshes the live count for the upcoming generation.
    fn apply_transitions(&mut self, params: &SoilParams) -> (usize, usize) {
        let self_weight = params.self_weight();
        let neighbor_weight = params.neighbor_weight();
        let mut alive_count = 0;
        let mut births = 0;
        let mut deaths = 0;

        for idx in 0..self.alive.len() {
            let neighbors = self.neighbor_alive[idx];
            let neighbor_avg = self.neighbor_fertility[idx] / 8.0;
            let soil = self.fertility[idx];
            let effective = self_weight * soil + neighbor_weight * neighbor_avg;
            let was_alive = self.alive[idx] == 1;

            let next_alive = if was_alive {
                (neighbors == 2 || neighbors == 3) && effective >= params.survival_floor
            } else {
                neighbors == 3 && effective >= params.birth_threshold
            };

            self.fertility[idx] = match (was_alive, next_alive) {
                (true, false) => {
                    deaths += 1;
                    soil + params.death_deposit
                }
                (false, true) => {
                    births += 1;
                    (soil - params.birth_cost).max(0.0)
                }
                (true, true) => (soil - params.survival_cost).max(0.0),
                (false, false) => soil,
            };

            self.alive_next[idx] = u8::from(next_alive);
            alive_count += usize::from(next_alive);
        }

        self.alive_count = alive_count;
        (births, deaths)
    }

    /// Relaxes fertility toward the pre-tick neighbor average, then decays it.
    /// Returns the total fertility after the pass.
    fn apply_diffusion(&mut self, params: &SoilParams) -> f32 {
        let diffusion = params.diffusion_rate;
        let retain = 1.0 - params.decay_rate;
        let mut total = 0.0_f32;

        for (soil, neighbor_sum) in self.fertility.iter_mut().zip(&self.neighbor_fertility) {
            let neighbor_avg = neighbor_sum / 8.0;
            let relaxed = *soil + diffusion * (neighbor_avg - *soil);
            *soil = (relaxed * retain).max(0.0);
            total += *soil;
        }

        total
    }
}

/// Validates dimensions and returns the cell count, guarding the 4-byte
/// pixel buffer size as well.
fn cell_count(width: u32, height: u32) -> Result<usize, KernelError> {
    let invalid = KernelError::InvalidDimensions { width, height };
    if width == 0 || height == 0 {
        return Err(invalid);
    }
    let cells = (width as usize)
        .checked_mul(height as usize)
        .ok_or(invalid.clone())?;
    cells.checked_mul(4).ok_or(invalid)?;
    Ok(cells)
}

fn try_filled<T: Clone>(cells: usize, value: T) -> Result<Vec<T>, KernelError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(cells)
        .map_err(|_| KernelError::Allocation { cells })?;
    buffer.resize(cells, value);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gating_disabled() -> SoilParams {
        let mut params = SoilParams::default();
        params.birth_threshold = 0.0;
        params.survival_floor = 0.0;
        params.death_deposit = 0.0;
        params.birth_cost = 0.0;
        params.survival_cost = 0.0;
        params
    }

    #[test]
    fn new_grid_is_dead_and_seeded() {
        let grid = SoilGrid::new(6, 3, 0.7).expect("grid");
        assert_eq!(grid.cell_count(), 18);
        assert_eq!(grid.alive_count(), 0);
        assert_eq!(grid.generation(), Generation(0));
        assert!(grid.alive().iter().all(|&cell| cell == 0));
        assert!(grid.fertility().iter().all(|&soil| soil == 0.7));
        assert_eq!(grid.neighbor_counts().len(), 18);
        assert_eq!(grid.neighbor_fertility_sums().len(), 18);
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert_eq!(
            SoilGrid::new(0, 4, 0.7).unwrap_err(),
            KernelError::InvalidDimensions {
                width: 0,
                height: 4
            }
        );
        assert!(SoilGrid::new(4, 0, 0.7).is_err());
    }

    #[test]
    fn pixel_count_overflow_is_invalid() {
        assert_eq!(
            SoilGrid::new(u32::MAX, u32::MAX, 0.7).unwrap_err(),
            KernelError::InvalidDimensions {
                width: u32::MAX,
                height: u32::MAX
            }
        );
    }

    #[test]
    fn refused_allocation_is_reported() {
        let err = SoilGrid::new(1 << 30, u32::MAX, 0.7).unwrap_err();
        assert_eq!(
            err,
            KernelError::Allocation {
                cells: (1_usize << 30) * (u32::MAX as usize)
            }
        );
    }

    #[test]
    fn set_cell_ignores_out_of_bounds() {
        let mut grid = SoilGrid::new(4, 4, 0.7).expect("grid");
        grid.set_cell(4, 0, true);
        grid.set_cell(0, 4, true);
        grid.set_cell(u32::MAX, u32::MAX, true);
        assert_eq!(grid.alive_count(), 0);

        grid.set_cell(3, 3, true);
        grid.set_cell(3, 3, true);
        assert!(grid.is_alive(3, 3));
        assert_eq!(grid.alive_count(), 1);
        grid.set_cell(3, 3, false);
        assert_eq!(grid.alive_count(), 0);
    }

    #[test]
    fn corner_cell_counts_for_exactly_its_wrapped_neighbors() {
        let (width, height) = (5_u32, 4_u32);
        let mut grid = SoilGrid::new(width, height, 0.0).expect("grid");
        grid.set_cell(0, 0, true);
        grid.aggregate_neighbors();

        let expected = [
            (width - 1, height - 1),
            (width - 1, 0),
            (0, height - 1),
            (1, 0),
            (0, 1),
            (1, 1),
            (width - 1, 1),
            (1, height - 1),
        ];
        for y in 0..height {
            for x in 0..width {
                let count = grid.neighbor_counts()[(y * width + x) as usize];
                let want = u8::from(expected.contains(&(x, y)));
                assert_eq!(count, want, "neighbor count at ({x}, {y})");
            }
        }
    }

    #[test]
    fn neighbor_fertility_sum_wraps() {
        let mut grid = SoilGrid::new(3, 3, 0.0).expect("grid");
        grid.fertility_mut()[0] = 2.0;
        grid.aggregate_neighbors();
        let sums = grid.neighbor_fertility_sums();
        assert_eq!(sums[0], 0.0);
        assert!(sums[1..].iter().all(|&sum| sum == 2.0));
    }

    #[test]
    fn birth_and_survival_are_exclusive() {
        let params = SoilParams::default();
        let mut grid = SoilGrid::new(24, 24, 0.7).expect("grid");
        grid.randomize(0.35, 0xC0FFEE);
        for _ in 0..12 {
            let before = grid.clone();
            let mut probe = before.clone();
            probe.aggregate_neighbors();
            grid.step(&params);

            for idx in 0..grid.cell_count() {
                let n = probe.neighbor_counts()[idx];
                let favg = probe.neighbor_fertility_sums()[idx] / 8.0;
                let effective = params.self_weight() * before.fertility()[idx]
                    + params.neighbor_weight() * favg;
                let was_alive = before.alive()[idx] == 1;
                let birth = !was_alive && n == 3 && effective >= params.birth_threshold;
                let survival = was_alive
                    && (n == 2 || n == 3)
                    && effective >= params.survival_floor;
                assert!(!(birth && survival));
                assert_eq!(grid.alive()[idx] == 1, birth || survival, "cell {idx}");
            }
        }
    }

    #[test]
    fn blinker_oscillates_without_gating() {
        let params = gating_disabled();
        let mut grid = SoilGrid::new(5, 5, 0.7).expect("grid");
        for x in 1..4 {
            grid.set_cell(x, 2, true);
        }
        let summary = grid.step(&params);
        assert_eq!(summary.alive_count, 3);
        assert_eq!(summary.births, 2);
        assert_eq!(summary.deaths, 2);
        assert!((1..4).all(|y| grid.is_alive(2, y)));
        grid.step(&params);
        assert!((1..4).all(|x| grid.is_alive(x, 2)));
        assert_eq!(grid.generation(), Generation(2));
    }

    #[test]
    fn barren_soil_blocks_birth() {
        let mut params = SoilParams::default();
        params.diffusion_rate = 0.0;
        let mut grid = SoilGrid::new(6, 6, 0.0).expect("grid");
        for x in 1..4 {
            grid.set_cell(x, 2, true);
        }
        let summary = grid.step(&params);
        assert_eq!(summary.births, 0);
        assert_eq!(summary.deaths, 3);
        assert_eq!(summary.alive_count, 0);
    }

    #[test]
    fn survival_cost_clamps_at_zero() {
        let mut params = gating_disabled();
        params.survival_cost = 5.0;
        params.diffusion_rate = 0.0;
        params.decay_rate = 0.0;
        let mut grid = SoilGrid::new(6, 6, 0.2).expect("grid");
        for (x, y) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
            grid.set_cell(x, y, true);
        }
        grid.step(&params);
        assert_eq!(grid.alive_count(), 4);
        assert_eq!(grid.fertility_at(1, 1), Some(0.0));
        assert!(grid.fertility().iter().all(|&soil| soil >= 0.0));
    }

    #[test]
    fn reset_soil_keeps_pattern() {
        let mut grid = SoilGrid::new(8, 8, 0.7).expect("grid");
        grid.randomize(0.5, 7);
        grid.step(&SoilParams::default());
        let pattern = grid.alive().to_vec();
        let count = grid.alive_count();

        grid.reset_soil(0.3);
        assert_eq!(grid.alive(), pattern.as_slice());
        assert_eq!(grid.alive_count(), count);
        assert_eq!(grid.generation(), Generation(0));
        assert!(grid.fertility().iter().all(|&soil| soil == 0.3));
    }

    #[test]
    fn randomize_is_deterministic_per_seed() {
        let mut a = SoilGrid::new(16, 16, 0.7).expect("grid");
        let mut b = SoilGrid::new(16, 16, 0.7).expect("grid");
        a.randomize(0.4, 99);
        b.randomize(0.4, 99);
        assert_eq!(a.alive(), b.alive());
        assert_eq!(a.alive_count(), b.alive().iter().filter(|&&c| c == 1).count());

        a.randomize(0.0, 1);
        assert_eq!(a.alive_count(), 0);
        a.randomize(1.0, 1);
        assert_eq!(a.alive_count(), 256);
    }
}
