//! Spatial occupancy index and food field for the world grid.

use crate::error::SimError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Grid extents shared by the occupancy index and the food field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub width: u16,
    pub height: u16,
}

impl Bounds {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width as i32 && y < self.height as i32
    }

    /// Clamp an arbitrary coordinate to the nearest in-bounds cell.
    /// Agent decisions are not guaranteed valid, so moves clamp instead of
    /// failing.
    #[inline]
    pub fn clamp(&self, x: i32, y: i32) -> (u16, u16) {
        (
            x.clamp(0, self.width as i32 - 1) as u16,
            y.clamp(0, self.height as i32 - 1) as u16,
        )
    }

    #[inline]
    pub fn cells(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Non-owning position -> agent-id index, rebuilt once per tick.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    bounds: Bounds,
    cells: Vec<Vec<u64>>,
}

impl SpatialIndex {
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            cells: vec![Vec::new(); bounds.cells()],
        }
    }

    #[inline]
    fn cell(&self, x: u16, y: u16) -> usize {
        y as usize * self.bounds.width as usize + x as usize
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    /// Register an agent at a position, failing if the position is outside
    /// the grid. This is the only out-of-bounds condition that surfaces to
    /// the caller.
    pub fn place(&mut self, id: u64, x: i32, y: i32) -> Result<(), SimError> {
        if !self.bounds.contains(x, y) {
            return Err(SimError::OutOfBounds {
                x,
                y,
                width: self.bounds.width,
                height: self.bounds.height,
            });
        }
        let cell = self.cell(x as u16, y as u16);
        self.cells[cell].push(id);
        Ok(())
    }

    /// Agent ids registered at a cell.
    #[inline]
    pub fn ids_at(&self, x: u16, y: u16) -> &[u64] {
        if self.bounds.contains(x as i32, y as i32) {
            &self.cells[self.cell(x, y)]
        } else {
            &[]
        }
    }

    #[inline]
    pub fn is_occupied(&self, x: u16, y: u16) -> bool {
        !self.ids_at(x, y).is_empty()
    }

    /// Count agents within a Chebyshev radius, including any at the center.
    pub fn count_radius(&self, x: u16, y: u16, radius: u8) -> usize {
        let r = radius as i32;
        let mut count = 0;
        for dy in -r..=r {
            for dx in -r..=r {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if self.bounds.contains(nx, ny) {
                    count += self.cells[self.cell(nx as u16, ny as u16)].len();
                }
            }
        }
        count
    }
}

/// Fractional rectangle describing a food cluster. Rewritten only by the
/// population balancer, never by agents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoodZone {
    pub x0: f32,
    pub x1: f32,
    pub y0: f32,
    pub y1: f32,
}

impl FoodZone {
    pub fn new(x0: f32, x1: f32, y0: f32, y1: f32) -> Self {
        Self { x0, x1, y0, y1 }
    }

    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.x0)
            && (0.0..=1.0).contains(&self.y0)
            && self.x0 < self.x1
            && self.y0 < self.y1
            && self.x1 <= 1.0
            && self.y1 <= 1.0
    }

    /// Cell-space rectangle `(x_lo, x_hi, y_lo, y_hi)`, upper bounds
    /// exclusive.
    pub fn cell_rect(&self, bounds: &Bounds) -> (u16, u16, u16, u16) {
        let x_lo = (self.x0 * bounds.width as f32) as u16;
        let x_hi = ((self.x1 * bounds.width as f32) as u16).max(x_lo + 1).min(bounds.width);
        let y_lo = (self.y0 * bounds.height as f32) as u16;
        let y_hi = ((self.y1 * bounds.height as f32) as u16).max(y_lo + 1).min(bounds.height);
        (x_lo, x_hi, y_lo, y_hi)
    }

    pub fn contains_cell(&self, bounds: &Bounds, x: u16, y: u16) -> bool {
        let (x_lo, x_hi, y_lo, y_hi) = self.cell_rect(bounds);
        x >= x_lo && x < x_hi && y >= y_lo && y < y_hi
    }
}

/// Per-cell food presence plus a regrowth cooldown started when the cell is
/// eaten.
#[derive(Debug, Clone)]
pub struct FoodField {
    bounds: Bounds,
    regrowth_delay: u32,
    present: Vec<bool>,
    cooldown: Vec<u32>,
}

impl FoodField {
    pub fn new(bounds: Bounds, regrowth_delay: u32) -> Self {
        Self {
            bounds,
            regrowth_delay,
            present: vec![false; bounds.cells()],
            cooldown: vec![0; bounds.cells()],
        }
    }

    #[inline]
    fn cell(&self, x: u16, y: u16) -> usize {
        y as usize * self.bounds.width as usize + x as usize
    }

    #[inline]
    pub fn has_food(&self, x: u16, y: u16) -> bool {
        self.bounds.contains(x as i32, y as i32) && self.present[self.cell(x, y)]
    }

    /// Seed the zone with food at the given density, skipping occupied cells.
    pub fn seed<R: Rng>(
        &mut self,
        zone: &FoodZone,
        density: f32,
        occupied: &HashSet<(u16, u16)>,
        rng: &mut R,
    ) {
        let (x_lo, x_hi, y_lo, y_hi) = zone.cell_rect(&self.bounds);
        for y in y_lo..y_hi {
            for x in x_lo..x_hi {
                if !occupied.contains(&(x, y)) && rng.gen::<f32>() < density {
                    let cell = self.cell(x, y);
                    self.present[cell] = true;
                }
            }
        }
    }

    /// Resolve same-tick contention for the food at a cell.
    ///
    /// The lowest agent id wins, the cell is cleared and its regrowth
    /// cooldown starts. Re-running on the same claimant set always yields
    /// the same winner; losers see no side effects.
    pub fn resolve_eat(&mut self, x: u16, y: u16, claimants: &[u64]) -> Option<u64> {
        if !self.has_food(x, y) {
            return None;
        }
        let winner = claimants.iter().min().copied()?;
        let cell = self.cell(x, y);
        self.present[cell] = false;
        self.cooldown[cell] = self.regrowth_delay;
        Some(winner)
    }

    /// Probabilistic per-cell regrowth inside the active zone, driven by the
    /// balancer-owned spawn rate. Cells still cooling down only count down;
    /// occupied cells never sprout.
    pub fn regrow<R: Rng>(
        &mut self,
        zone: &FoodZone,
        spawn_rate: f32,
        occupied: &HashSet<(u16, u16)>,
        rng: &mut R,
    ) {
        let (x_lo, x_hi, y_lo, y_hi) = zone.cell_rect(&self.bounds);
        for y in y_lo..y_hi {
            for x in x_lo..x_hi {
                let cell = self.cell(x, y);
                if self.present[cell] {
                    continue;
                }
                if self.cooldown[cell] > 0 {
                    self.cooldown[cell] -= 1;
                    continue;
                }
                if !occupied.contains(&(x, y)) && rng.gen::<f32>() < spawn_rate {
                    self.present[cell] = true;
                }
            }
        }
    }

    /// Remove food outside the given zone (applied when the balancer
    /// rotates zones).
    pub fn clear_outside(&mut self, zone: &FoodZone) {
        for y in 0..self.bounds.height {
            for x in 0..self.bounds.width {
                if !zone.contains_cell(&self.bounds, x, y) {
                    let cell = self.cell(x, y);
                    self.present[cell] = false;
                    self.cooldown[cell] = 0;
                }
            }
        }
    }

    pub fn count(&self) -> usize {
        self.present.iter().filter(|&&p| p).count()
    }

    /// Positions of all food cells, for snapshot consumers.
    pub fn positions(&self) -> Vec<(u16, u16)> {
        let mut out = Vec::new();
        for y in 0..self.bounds.height {
            for x in 0..self.bounds.width {
                if self.present[self.cell(x, y)] {
                    out.push((x, y));
                }
            }
        }
        out
    }

    #[cfg(test)]
    pub fn set(&mut self, x: u16, y: u16, present: bool) {
        let cell = self.cell(x, y);
        self.present[cell] = present;
    }
}
