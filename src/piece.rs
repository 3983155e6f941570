//! Tetrominoes: shape templates, the falling piece and its blocks, landing.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimConfig;
use crate::physics::{BodyHandle, BodyKind, PhysicsError, PhysicsWorld, Vec2};

/// 8-bit colour carried by blocks and grains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Game colours in play order. `--colors N` uses the first N.
pub const PALETTE: [Rgb; 7] = [
    Rgb(255, 0, 0),
    Rgb(0, 255, 0),
    Rgb(0, 0, 255),
    Rgb(255, 255, 0),
    Rgb(255, 165, 0),
    Rgb(128, 0, 128),
    Rgb(0, 255, 255),
];

/// Palette slot of a colour, if it is one of the game colours.
pub fn palette_index(color: Rgb) -> Option<usize> {
    PALETTE.iter().position(|c| *c == color)
}

/// Tetromino kinds (I, O, T, S, Z, J, L).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TetrominoKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl TetrominoKind {
    pub const ALL: [Self; 7] = [Self::I, Self::O, Self::T, Self::S, Self::Z, Self::J, Self::L];

    /// 4 cells relative to the spawn anchor, in block units, y up.
    /// The first cell is the rotation pivot.
    pub fn cells(&self) -> &[(i8, i8); 4] {
        match self {
            Self::I => &[(-2, 0), (-1, 0), (0, 0), (1, 0)],
            Self::O => &[(-1, 0), (0, 0), (-1, 1), (0, 1)],
            Self::T => &[(-1, 0), (0, 0), (1, 0), (0, 1)],
            Self::S => &[(0, 0), (1, 0), (-1, 1), (0, 1)],
            Self::Z => &[(-1, 0), (0, 0), (0, 1), (1, 1)],
            Self::J => &[(-1, 0), (-1, 1), (0, 0), (1, 0)],
            Self::L => &[(-1, 0), (0, 0), (1, 0), (1, 1)],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::I => "I",
            Self::O => "O",
            Self::T => "T",
            Self::S => "S",
            Self::Z => "Z",
            Self::J => "J",
            Self::L => "L",
        }
    }
}

/// Uniform random shape and colour, reproducible from a seed.
#[derive(Debug, Clone)]
pub struct PieceGenerator {
    rng: StdRng,
    colors: usize,
}

impl PieceGenerator {
    pub fn new(seed: Option<u64>, colors: usize) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            colors: colors.clamp(1, PALETTE.len()),
        }
    }

    pub fn next(&mut self) -> (TetrominoKind, Rgb) {
        let kind = TetrominoKind::ALL[self.rng.gen_range(0..TetrominoKind::ALL.len())];
        let color = PALETTE[self.rng.gen_range(0..self.colors)];
        (kind, color)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    /// Moved by game logic.
    Controlled,
    /// Handed over to the solver. Never goes back.
    Landed,
}

/// One cell of a piece, bound to exactly one body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub position: Vec2,
    pub color: Rgb,
    mode: BlockMode,
    body: BodyHandle,
}

impl Block {
    pub fn landed(&self) -> bool {
        self.mode == BlockMode::Landed
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }
}

/// The falling piece. Owns its four controlled blocks until [`Piece::land`].
#[derive(Debug, Clone)]
pub struct Piece {
    kind: TetrominoKind,
    color: Rgb,
    blocks: [Block; 4],
    block_size: f32,
    field_width: f32,
}

impl Piece {
    /// Creates the four controlled bodies with the template anchor on column
    /// `columns / 2` and the top row flush with the playfield top. Does not check for overlap.
    pub fn spawn(world: &mut PhysicsWorld, config: &SimConfig, kind: TetrominoKind, color: Rgb) -> Self {
        let bs = config.block_size;
        let (field_width, field_height) = config.playfield_size();
        let anchor_x = f32::from(config.columns / 2) * bs + bs / 2.0;
        let top = kind.cells().iter().map(|&(_, oy)| oy).max().unwrap_or(0);
        let anchor_y = field_height - bs / 2.0 - f32::from(top) * bs;

        let blocks = kind.cells().map(|(ox, oy)| {
            let position = Vec2::new(
                anchor_x + f32::from(ox) * bs,
                anchor_y + f32::from(oy) * bs,
            );
            let body = world.add_box(position, bs / 2.0, color, BodyKind::Controlled);
            Block {
                position,
                color,
                mode: BlockMode::Controlled,
                body,
            }
        });
        log::debug!("spawned {} piece at ({anchor_x}, {anchor_y})", kind.name());
        Self {
            kind,
            color,
            blocks,
            block_size: bs,
            field_width,
        }
    }

    pub fn kind(&self) -> TetrominoKind {
        self.kind
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn blocks(&self) -> &[Block; 4] {
        &self.blocks
    }

    pub fn positions(&self) -> [Vec2; 4] {
        self.blocks.map(|b| b.position)
    }

    fn handles(&self) -> [BodyHandle; 4] {
        self.blocks.map(|b| b.body)
    }

    fn place(&mut self, world: &mut PhysicsWorld, index: usize, position: Vec2) {
        let block = &mut self.blocks[index];
        block.position = position;
        world.set_position(block.body, position);
    }

    /// Shifts every block by `(dx, dy)` blocks. Unchecked; see [`Piece::try_move`].
    pub fn move_by(&mut self, world: &mut PhysicsWorld, dx: i32, dy: i32) {
        let delta = Vec2::new(dx as f32 * self.block_size, dy as f32 * self.block_size);
        for i in 0..self.blocks.len() {
            let position = self.blocks[i].position + delta;
            self.place(world, i, position);
        }
    }

    /// Quarter turn counter-clockwise about the first block. Unchecked.
    pub fn rotate(&mut self, world: &mut PhysicsWorld) {
        let pivot = self.blocks[0].position;
        for i in 1..self.blocks.len() {
            let rel = self.blocks[i].position - pivot;
            self.place(world, i, pivot + Vec2::new(-rel.y, rel.x));
        }
    }

    /// True when a block touches or sinks below the floor, leaves the side
    /// bounds, or penetrates any shape that is not part of this piece.
    pub fn check_collision(&self, world: &PhysicsWorld) -> Result<bool, PhysicsError> {
        let half = self.block_size / 2.0;
        let out_of_bounds = self.blocks.iter().any(|b| {
            let p = b.position;
            p.y - half <= 0.0 || p.x - half < 0.0 || p.x + half > self.field_width
        });
        if out_of_bounds {
            return Ok(true);
        }
        let own = self.handles();
        for block in &self.blocks {
            if world.box_overlaps(block.position, half, &own)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Moves, then rolls back if the new placement collides. Returns whether the move stuck.
    pub fn try_move(&mut self, world: &mut PhysicsWorld, dx: i32, dy: i32) -> Result<bool, PhysicsError> {
        self.move_by(world, dx, dy);
        if self.check_collision(world)? {
            self.move_by(world, -dx, -dy);
            return Ok(false);
        }
        Ok(true)
    }

    /// Rotates, then undoes a colliding rotation by turning three more times.
    pub fn try_rotate(&mut self, world: &mut PhysicsWorld) -> Result<bool, PhysicsError> {
        self.rotate(world);
        if self.check_collision(world)? {
            for _ in 0..3 {
                self.rotate(world);
            }
            return Ok(false);
        }
        Ok(true)
    }

    /// Swaps every controlled body for a dynamic box at the same spot.
    pub fn land(self, world: &mut PhysicsWorld) -> LandedPiece {
        let half = self.block_size / 2.0;
        let blocks = self.blocks.map(|block| {
            world.remove(block.body);
            let body = world.add_box(block.position, half, block.color, BodyKind::Dynamic);
            Block {
                mode: BlockMode::Landed,
                body,
                ..block
            }
        });
        log::debug!("landed {} piece", self.kind.name());
        LandedPiece {
            kind: self.kind,
            blocks,
        }
    }
}

/// A piece whose blocks are dynamic bodies, waiting to shatter.
#[derive(Debug, Clone)]
pub struct LandedPiece {
    pub kind: TetrominoKind,
    pub blocks: [Block; 4],
}
