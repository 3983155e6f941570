//! Logical board view of the physics state and the board-full rule.

use crate::config::SimConfig;
use crate::physics::PhysicsWorld;
use crate::piece::{PALETTE, Piece, Rgb, palette_index};

/// `rows × columns` colour codes, row 0 at the top. 0 is empty, otherwise palette slot + 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    rows: usize,
    columns: usize,
    cells: Vec<u8>,
}

impl Observation {
    pub fn empty(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            cells: vec![0; rows * columns],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn get(&self, row: usize, col: usize) -> u8 {
        if row < self.rows && col < self.columns {
            self.cells[row * self.columns + col]
        } else {
            0
        }
    }

    fn set(&mut self, row: usize, col: usize, code: u8) {
        if row < self.rows && col < self.columns {
            self.cells[row * self.columns + col] = code;
        }
    }

    pub fn row(&self, row: usize) -> &[u8] {
        let start = row.min(self.rows) * self.columns;
        &self.cells[start..(start + self.columns).min(self.cells.len())]
    }

    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|&&c| c != 0).count()
    }

    /// Highest occupied row counted from the floor (0 when empty).
    pub fn stack_height(&self) -> usize {
        (0..self.rows)
            .find(|&r| self.row(r).iter().any(|&c| c != 0))
            .map_or(0, |r| self.rows - r)
    }

    /// Cell holding world point `(x, y)`, if on the board.
    fn cell_of(&self, x: f32, y: f32, block_size: f32) -> Option<(usize, usize)> {
        let col = (x / block_size).floor();
        let up = (y / block_size).floor();
        if col < 0.0 || up < 0.0 {
            return None;
        }
        let (col, up) = (col as usize, up as usize);
        (col < self.columns && up < self.rows).then(|| (self.rows - 1 - up, col))
    }
}

pub fn color_code(color: Rgb) -> u8 {
    palette_index(color).map_or(0, |i| i as u8 + 1)
}

/// Board built from grains alone. A cell counts once enough grain centres sit
/// inside it; its code is the most common colour there, ties to the lower slot.
pub fn settled_board(world: &PhysicsWorld, config: &SimConfig) -> Observation {
    let rows = usize::from(config.rows);
    let columns = usize::from(config.columns);
    let mut board = Observation::empty(rows, columns);
    let mut counts = vec![[0usize; PALETTE.len()]; rows * columns];
    for grain in world.grains() {
        let (Some((row, col)), Some(slot)) = (
            board.cell_of(grain.position.x, grain.position.y, config.block_size),
            palette_index(grain.color),
        ) else {
            continue;
        };
        counts[row * columns + col][slot] += 1;
    }

    let per_block = config.grains_per_row().pow(2);
    let needed = ((per_block as f32 * config.fill_fraction).ceil() as usize).max(1);
    for (i, slots) in counts.iter().enumerate() {
        if slots.iter().sum::<usize>() < needed {
            continue;
        }
        let mut best = 0;
        for (slot, &n) in slots.iter().enumerate() {
            if n > slots[best] {
                best = slot;
            }
        }
        board.cells[i] = best as u8 + 1;
    }
    board
}

/// Paints the falling piece's cells over a board.
pub fn overlay_piece(board: &mut Observation, piece: &Piece, block_size: f32) {
    let code = color_code(piece.color());
    for block in piece.blocks() {
        if let Some((row, col)) = board.cell_of(block.position.x, block.position.y, block_size) {
            board.set(row, col, code);
        }
    }
}

/// Settled grains reaching any of the top `spawn_rows` rows end the game.
pub fn board_full(settled: &Observation, spawn_rows: usize) -> bool {
    (0..spawn_rows.min(settled.rows())).any(|r| settled.row(r).iter().any(|&c| c != 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::Vec2;
    use crate::piece::TetrominoKind;
    
    #[test]
    fn sparse_grains_do_not_fill_a_cell() {
        let cfg = SimConfig::default();
        let mut world = PhysicsWorld::new(&cfg);
        // 12 of 25 is under half a block.
        for i in 0..12 {
            world.add_grain(Vec2::new(2.0 + (i % 5) as f32 * 4.0, 2.0 + (i / 5) as f32 * 4.0), 2.0, PALETTE[0]);
        }
        let board = settled_board(&world, &cfg);
        assert_eq!(board.occupied(), 0);

        world.add_grain(Vec2::new(18.0, 18.0), 2.0, PALETTE[0]);
        let board = settled_board(&world, &cfg);
        assert_eq!(board.get(19, 0), 1);
        assert_eq!(board.occupied(), 1);
        assert_eq!(board.stack_height(), 1);
    }

    #[test]
    fn majority_colour_wins_with_ties_to_lower_slot() {
        let cfg = SimConfig::default();
        let mut world = PhysicsWorld::new(&cfg);
        for i in 0..14 {
            let color = if i % 2 == 0 { PALETTE[3] } else { PALETTE[1] };
            world.add_grain(Vec2::new(42.0 + (i % 4) as f32 * 4.0, 2.0 + (i / 4) as f32 * 4.0), 2.0, color);
        }
        let board = settled_board(&world, &cfg);
        assert_eq!(board.get(19, 2), 2);
    }

    #[test]
    fn piece_overlay_and_board_full() {
        let cfg = SimConfig::default();
        let mut world = PhysicsWorld::new(&cfg);
        let piece = Piece::spawn(&mut world, &cfg, TetrominoKind::O, PALETTE[2]);
        let settled = settled_board(&world, &cfg);
        assert!(!board_full(&settled, cfg.spawn_rows));

        let mut board = settled.clone();
        overlay_piece(&mut board, &piece, cfg.block_size);
        assert_eq!(board.row(0), &[0, 0, 0, 0, 3, 3, 0, 0, 0, 0]);
        assert_eq!(board.row(1), &[0, 0, 0, 0, 3, 3, 0, 0, 0, 0]);

        let mut top = Observation::empty(20, 10);
        top.set(1, 7, 4);
        assert!(board_full(&top, 2));
        assert!(!board_full(&top, 1));
    }
}
