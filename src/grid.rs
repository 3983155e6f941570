//! Spatial grid over grain positions and the single-colour line clear.

use std::collections::HashSet;

use crate::config::SimConfig;
use crate::physics::{BodyHandle, PhysicsWorld};
use crate::piece::Rgb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrainRef {
    pub handle: BodyHandle,
    pub color: Rgb,
}

/// A saturated (row, colour) pair and how many grains it took with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearedRow {
    pub row: usize,
    pub color: Rgb,
    pub grains: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub rows: Vec<ClearedRow>,
    /// Distinct grains removed this pass.
    pub removed: usize,
}

impl ClearReport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Grain-sized cells over the playfield, row 0 at the floor.
/// Rebuilt from scratch every tick and never used by the solver.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    width: usize,
    height: usize,
    /// `cells[row][col]`, last writer wins.
    cells: Vec<Vec<Option<GrainRef>>>,
    /// Every in-bounds grain per row, including overwritten occupants.
    members: Vec<Vec<GrainRef>>,
}

impl SpatialGrid {
    pub fn new(config: &SimConfig) -> Self {
        let cell_size = config.grain_diameter();
        let (w, h) = config.playfield_size();
        let width = (w / cell_size).floor() as usize;
        let height = (h / cell_size).floor() as usize;
        Self {
            cell_size,
            width,
            height,
            cells: vec![vec![None; width]; height],
            members: vec![Vec::new(); height],
        }
    }

    #[cfg(test)]
    pub(crate) fn width(&self) -> usize {
        self.width
    }

    #[cfg(test)]
    pub(crate) fn height(&self) -> usize {
        self.height
    }

    #[cfg(test)]
    pub(crate) fn cell(&self, col: usize, row: usize) -> Option<GrainRef> {
        self.cells.get(row)?.get(col).copied().flatten()
    }

    /// Grid cell of a world position, if it lies on the grid.
    pub fn locate(&self, x: f32, y: f32) -> Option<(usize, usize)> {
        let col = (x / self.cell_size).floor();
        let row = (y / self.cell_size).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        (col < self.width && row < self.height).then_some((col, row))
    }

    pub fn rebuild(&mut self, world: &PhysicsWorld) {
        for row in &mut self.cells {
            row.fill(None);
        }
        for row in &mut self.members {
            row.clear();
        }
        for grain in world.grains() {
            let Some((col, row)) = self.locate(grain.position.x, grain.position.y) else {
                continue;
            };
            let r = GrainRef {
                handle: grain.handle,
                color: grain.color,
            };
            self.cells[row][col] = Some(r);
            self.members[row].push(r);
        }
    }

    /// Rows in which one colour holds every cell, bottom row first.
    pub fn full_lines(&self) -> Vec<(usize, Rgb)> {
        let mut out = Vec::new();
        for (row, cells) in self.cells.iter().enumerate() {
            // Few colours per row; a small vec beats hashing here.
            let mut counts: Vec<(Rgb, usize)> = Vec::new();
            for r in cells.iter().flatten() {
                match counts.iter_mut().find(|(c, _)| *c == r.color) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((r.color, 1)),
                }
            }
            out.extend(
                counts
                    .into_iter()
                    .filter(|&(_, n)| n >= self.width)
                    .map(|(c, _)| (row, c)),
            );
        }
        out
    }

    /// Removes every grain of a saturating colour that was mapped into its row.
    /// All rows are scanned before anything is removed.
    pub fn clear_full_lines(&self, world: &mut PhysicsWorld) -> ClearReport {
        let mut doomed: HashSet<BodyHandle> = HashSet::new();
        let mut rows = Vec::new();
        for (row, color) in self.full_lines() {
            let before = doomed.len();
            doomed.extend(
                self.members[row]
                    .iter()
                    .filter(|r| r.color == color)
                    .map(|r| r.handle),
            );
            rows.push(ClearedRow {
                row,
                color,
                grains: doomed.len() - before,
            });
        }
        let removed = doomed
            .into_iter()
            .filter(|&handle| world.remove(handle).is_some())
            .count();
        if removed > 0 {
            log::debug!("cleared {} rows, {removed} grains", rows.len());
        }
        ClearReport { rows, removed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::Vec2;
    use crate::piece::PALETTE;
    
    const RED: Rgb = PALETTE[0];
    const BLUE: Rgb = PALETTE[2];

    fn setup() -> (SimConfig, PhysicsWorld, SpatialGrid) {
        let cfg = SimConfig::default();
        let world = PhysicsWorld::new(&cfg);
        let grid = SpatialGrid::new(&cfg);
        (cfg, world, grid)
    }

    fn put(world: &mut PhysicsWorld, col: usize, row: usize, color: Rgb) -> BodyHandle {
        let at = Vec2::new(col as f32 * 4.0 + 2.0, row as f32 * 4.0 + 2.0);
        world.add_grain(at, 2.0, color)
    }

    #[test]
    fn grid_dimensions_follow_grain_diameter() {
        let (_, _, grid) = setup();
        assert_eq!((grid.width(), grid.height()), (50, 100));
        assert_eq!(grid.locate(-0.1, 5.0), None);
        assert_eq!(grid.locate(199.9, 399.9), Some((49, 99)));
        assert_eq!(grid.locate(200.0, 5.0), None);
    }

    #[test]
    fn rebuild_is_last_writer_wins_and_forgets_old_state() {
        let (_, mut world, mut grid) = setup();
        put(&mut world, 3, 1, RED);
        let second = put(&mut world, 3, 1, BLUE);
        grid.rebuild(&world);
        assert_eq!(grid.cell(3, 1).map(|r| r.handle), Some(second));

        world.remove(second);
        grid.rebuild(&world);
        assert_eq!(grid.cell(3, 1).map(|r| r.color), Some(RED));
    }

    #[test]
    fn row_missing_one_column_is_kept_until_filled() {
        let (_, mut world, mut grid) = setup();
        for col in 0..49 {
            put(&mut world, col, 0, RED);
        }
        grid.rebuild(&world);
        let report = grid.clear_full_lines(&mut world);
        assert!(report.is_empty());
        assert_eq!(world.grain_count(), 49);

        put(&mut world, 49, 0, RED);
        grid.rebuild(&world);
        let report = grid.clear_full_lines(&mut world);
        assert_eq!(report.rows, vec![ClearedRow { row: 0, color: RED, grains: 50 }]);
        assert_eq!(report.removed, 50);
        assert_eq!(world.grain_count(), 0);
    }

    #[test]
    fn clear_spares_other_colours_and_other_rows() {
        let (_, mut world, mut grid) = setup();
        // Hidden under a red grain in the same cell.
        let blue = put(&mut world, 10, 2, BLUE);
        // Overwritten red occupant still counts as being in the row.
        let buried_red = put(&mut world, 11, 2, RED);
        for col in 0..50 {
            put(&mut world, col, 2, RED);
        }
        let above = put(&mut world, 0, 3, RED);
        grid.rebuild(&world);

        let report = grid.clear_full_lines(&mut world);
        assert_eq!(report.removed, 51);
        assert!(world.contains(blue));
        assert!(world.contains(above));
        assert!(!world.contains(buried_red));
    }

    #[test]
    fn two_rows_clear_in_one_pass() {
        let (_, mut world, mut grid) = setup();
        for col in 0..50 {
            put(&mut world, col, 0, RED);
            put(&mut world, col, 5, BLUE);
        }
        grid.rebuild(&world);
        assert_eq!(grid.full_lines(), vec![(0, RED), (5, BLUE)]);
        let report = grid.clear_full_lines(&mut world);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(world.grain_count(), 0);
    }
}
