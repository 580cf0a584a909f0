use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::grid::{Generation, SoilGrid};

/// Colors and scaling used to turn a grid into pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FramePalette {
    /// Fertility at or above this value renders as full soil tint.
    pub fertility_cap: f32,
    /// Color of barren soil.
    pub bare_soil: [u8; 3],
    /// Color approached by fertile soil.
    pub soil_tint: [u8; 3],
    /// Color of live cells, drawn without soil blending.
    pub live: [u8; 3],
}

impl Default for FramePalette {
    fn default() -> Self {
        Self {
            fertility_cap: 1.5,
            bare_soil: [14, 12, 10],
            soil_tint: [96, 140, 52],
            live: [236, 232, 214],
        }
    }
}

impl FramePalette {
    /// Soil color for a fertility value: clamp to the cap, normalize, take
    /// the square root and blend from bare soil toward the tint.
    #[must_use]
    pub fn soil_color(&self, fertility: f32) -> [u8; 3] {
        let cap = if self.fertility_cap > 0.0 {
            self.fertility_cap
        } else {
            1.0
        };
        let level = (fertility.clamp(0.0, cap) / cap).sqrt();
        let mut rgb = [0_u8; 3];
        for (channel, out) in rgb.iter_mut().enumerate() {
            let from = f32::from(self.bare_soil[channel]);
            let to = f32::from(self.soil_tint[channel]);
            *out = (from + (to - from) * level).round().clamp(0.0, 255.0) as u8;
        }
        rgb
    }
}

/// One rendered RGBA image of the grid plus the counters it was taken at.
///
/// The pixel buffer is a fresh allocation owned by whoever receives the
/// frame; the kernel keeps no reference to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub generation: Generation,
    pub alive_count: usize,
    /// Fertility summed in cell order, as the tick summary reports it.
    pub total_fertility: f32,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// RGBA of the pixel at `(x, y)`.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        let px = self.pixels.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Renders the current liveness and fertility. Never mutates the grid, so
/// repeated calls on unchanged state produce identical bytes.
///
/// The 4-byte-per-cell size was checked for overflow when the grid was
/// built; use [`try_render_frame`] where the allocation may be refused.
#[must_use]
pub fn render_frame(grid: &SoilGrid, palette: &FramePalette) -> Frame {
    paint(grid, palette, vec![0_u8; grid.cell_count() * 4])
}

/// Like [`render_frame`], but reserves the pixel buffer fallibly.
pub fn try_render_frame(grid: &SoilGrid, palette: &FramePalette) -> Result<Frame, KernelError> {
    let cells = grid.cell_count();
    let len = cells * 4;
    let mut pixels = Vec::new();
    pixels
        .try_reserve_exact(len)
        .map_err(|_| KernelError::Allocation { cells })?;
    pixels.resize(len, 0);
    Ok(paint(grid, palette, pixels))
}

fn paint(grid: &SoilGrid, palette: &FramePalette, mut pixels: Vec<u8>) -> Frame {
    let mut total_fertility = 0.0_f32;
    for ((px, &alive), &soil) in pixels
        .chunks_exact_mut(4)
        .zip(grid.alive())
        .zip(grid.fertility())
    {
        let rgb = if alive == 1 {
            palette.live
        } else {
            palette.soil_color(soil)
        };
        px[..3].copy_from_slice(&rgb);
        px[3] = u8::MAX;
        total_fertility += soil;
    }

    Frame {
        width: grid.width(),
        height: grid.height(),
        generation: grid.generation(),
        alive_count: grid.alive_count(),
        total_fertility,
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soil_color_spans_bare_to_tint() {
        let palette = FramePalette::default();
        assert_eq!(palette.soil_color(0.0), palette.bare_soil);
        assert_eq!(palette.soil_color(palette.fertility_cap), palette.soil_tint);
        assert_eq!(palette.soil_color(50.0), palette.soil_tint);
        assert_eq!(palette.soil_color(-1.0), palette.bare_soil);
    }

    #[test]
    fn square_root_lifts_low_fertility() {
        let palette = FramePalette {
            fertility_cap: 1.0,
            bare_soil: [0, 0, 0],
            soil_tint: [200, 200, 200],
            live: [255, 255, 255],
        };
        // sqrt(0.25) = 0.5
        assert_eq!(palette.soil_color(0.25), [100, 100, 100]);
    }

    #[test]
    fn live_cells_override_soil_and_alpha_is_opaque() {
        let palette = FramePalette::default();
        let mut grid = SoilGrid::new(3, 2, 0.7).expect("grid");
        grid.set_cell(2, 1, true);
        let frame = render_frame(&grid, &palette);

        assert_eq!(frame.pixels.len(), 3 * 2 * 4);
        assert_eq!(frame.alive_count, 1);
        let [r, g, b, a] = frame.pixel(2, 1).expect("pixel");
        assert_eq!([r, g, b], palette.live);
        assert_eq!(a, 255);
        let soil = palette.soil_color(0.7);
        assert_eq!(frame.pixel(0, 0), Some([soil[0], soil[1], soil[2], 255]));
        assert!(frame.pixels.chunks_exact(4).all(|px| px[3] == 255));
        assert_eq!(frame.pixel(3, 0), None);
    }

    #[test]
    fn rendering_twice_is_identical() {
        let mut grid = SoilGrid::new(12, 9, 0.7).expect("grid");
        grid.randomize(0.3, 5);
        grid.step(&crate::params::SoilParams::default());
        let palette = FramePalette::default();
        let first = render_frame(&grid, &palette);
        let second = render_frame(&grid, &palette);
        assert_eq!(first, second);
    }

    #[test]
    fn fallible_render_matches_infallible() {
        let mut grid = SoilGrid::new(9, 7, 0.7).expect("grid");
        grid.randomize(0.4, 11);
        let palette = FramePalette::default();
        let frame = try_render_frame(&grid, &palette).expect("frame");
        assert_eq!(frame, render_frame(&grid, &palette));
        assert_eq!(frame.pixels.len(), 9 * 7 * 4);
    }

    #[test]
    fn frame_total_matches_tick_summary() {
        let mut grid = SoilGrid::new(10, 10, 0.7).expect("grid");
        let palette = FramePalette::default();
        let seeded = render_frame(&grid, &palette);
        let summed = grid.fertility().iter().fold(0.0_f32, |acc, &soil| acc + soil);
        assert_eq!(seeded.total_fertility, summed);

        grid.randomize(0.3, 21);
        let summary = grid.step(&crate::params::SoilParams::default());
        let frame = render_frame(&grid, &palette);
        assert_eq!(frame.total_fertility.to_bits(), summary.total_fertility.to_bits());
    }
}
