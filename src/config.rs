//! Simulation constants: playfield geometry, physics tolerances, timing.

use thiserror::Error;

/// Every tunable of a sandtris session. Defaults mirror the classic desktop
/// build (20 px blocks, 2 px grains, 60 Hz, 500 ms drop timer).
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Playfield width in blocks.
    pub columns: u16,
    /// Playfield height in blocks.
    pub rows: u16,
    /// Edge length of one tetromino block, in world units.
    pub block_size: f32,
    pub grain_radius: f32,
    /// Vertical gravity (world units / s²). Negative pulls towards the floor.
    pub gravity: f32,
    pub solver_iterations: usize,
    /// Seconds a body must stay slow before the solver lets it sleep.
    pub sleep_time_threshold: f32,
    /// Penetration tolerated by the solver and by the piece overlap test.
    pub collision_slop: f32,
    pub fps: u32,
    /// Interval of the automatic gravity drop of the falling piece.
    pub drop_interval_ms: u64,
    /// Grains whose centre falls below this height are swept.
    pub offscreen_threshold: f32,
    /// Number of palette colours in play (1..=7).
    pub colors: usize,
    pub seed: Option<u64>,
    /// Static walls just outside the left and right playfield edges.
    pub side_walls: bool,
    /// Top rows watched by the board-full policy.
    pub spawn_rows: usize,
    /// Share of a block's grain lattice that must be present for a logical
    /// cell to count as occupied.
    pub fill_fraction: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            columns: 10,
            rows: 20,
            block_size: 20.0,
            grain_radius: 2.0,
            gravity: -1000.0,
            solver_iterations: 30,
            sleep_time_threshold: 0.5,
            collision_slop: 0.5,
            fps: 60,
            drop_interval_ms: 500,
            offscreen_threshold: -10.0,
            colors: 4,
            seed: None,
            side_walls: true,
            spawn_rows: 2,
            fill_fraction: 0.5,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("playfield must be at least 4x4 blocks, got {columns}x{rows}")]
    PlayfieldTooSmall { columns: u16, rows: u16 },
    #[error("grain diameter {diameter} does not fit in block size {block_size}")]
    GrainTooLarge { diameter: f32, block_size: f32 },
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("colour count must be in 1..=7, got {0}")]
    ColorCount(usize),
    #[error("fill fraction must be in (0, 1], got {0}")]
    FillFraction(f32),
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.columns < 4 || self.rows < 4 {
            return Err(ConfigError::PlayfieldTooSmall {
                columns: self.columns,
                rows: self.rows,
            });
        }
        for (name, value) in [
            ("block size", self.block_size),
            ("grain radius", self.grain_radius),
            ("collision slop", self.collision_slop),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::NotPositive {
                    name,
                    value: value as f64,
                });
            }
        }
        if self.grain_diameter() > self.block_size {
            return Err(ConfigError::GrainTooLarge {
                diameter: self.grain_diameter(),
                block_size: self.block_size,
            });
        }
        if self.fps == 0 {
            return Err(ConfigError::NotPositive { name: "fps", value: 0.0 });
        }
        if self.solver_iterations == 0 {
            return Err(ConfigError::NotPositive {
                name: "solver iterations",
                value: 0.0,
            });
        }
        if self.drop_interval_ms == 0 {
            return Err(ConfigError::NotPositive {
                name: "drop interval",
                value: 0.0,
            });
        }
        if !(1..=crate::piece::PALETTE.len()).contains(&self.colors) {
            return Err(ConfigError::ColorCount(self.colors));
        }
        if !(self.fill_fraction > 0.0 && self.fill_fraction <= 1.0) {
            return Err(ConfigError::FillFraction(self.fill_fraction));
        }
        Ok(())
    }

    #[inline]
    pub fn grain_diameter(&self) -> f32 {
        self.grain_radius * 2.0
    }

    /// Fixed physics timestep in seconds.
    #[inline]
    pub fn dt(&self) -> f32 {
        1.0 / self.fps as f32
    }

    /// Playfield size in world units (width, height).
    pub fn playfield_size(&self) -> (f32, f32) {
        (
            self.columns as f32 * self.block_size,
            self.rows as f32 * self.block_size,
        )
    }

    /// Grains along one edge of a shattered block.
    pub fn grains_per_row(&self) -> usize {
        (self.block_size / self.grain_diameter()).floor() as usize
    }

    /// Ticks between two automatic drops (never zero).
    pub fn drop_interval_ticks(&self) -> u64 {
        (self.drop_interval_ms * self.fps as u64 / 1000).max(1)
    }
}
