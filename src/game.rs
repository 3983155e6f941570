//! Game session: owns the world, grid and falling piece and runs one tick at a time.

use thiserror::Error;

use crate::config::{ConfigError, SimConfig};
use crate::grain;
use crate::grid::{ClearReport, SpatialGrid};
use crate::observe::{self, Observation};
use crate::physics::{PhysicsError, PhysicsWorld, Vec2};
use crate::piece::{Piece, PieceGenerator};
use crate::render::{self, DrawPrimitive};

/// Reward added on the tick the episode ends.
const GAME_OVER_PENALTY: f32 = -10.0;

/// Discrete controls, applied once per tick before the automatic drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    MoveLeft,
    MoveRight,
    Rotate,
    /// One row down. Never lands the piece; only the drop timer does.
    SoftDrop,
    NoOp,
}

impl Action {
    pub const ALL: [Self; 5] = [
        Self::MoveLeft,
        Self::MoveRight,
        Self::Rotate,
        Self::SoftDrop,
        Self::NoOp,
    ];

    /// Action by numeric id (0 left, 1 right, 2 rotate, 3 drop, 4 noop).
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

}

/// Steps of the piece cycle: `Spawning → Falling → Landing → Shattering → Spawning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Spawning,
    Falling,
    Landing,
    Shattering,
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error("physics step failed")]
    Physics(#[from] PhysicsError),
    #[error("session halted after a fatal error; reset to continue")]
    Halted,
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Phases entered this tick, in order. Empty while the piece just falls.
    pub phases: Vec<Phase>,
    /// Grains created by a shatter this tick.
    pub shattered: usize,
    pub cleared: ClearReport,
    pub swept: usize,
}

impl TickReport {
    /// The falling piece landed (and shattered) this tick.
    pub fn landed(&self) -> bool {
        self.phases.contains(&Phase::Landing)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f32,
    pub done: bool,
    pub report: TickReport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub ticks: u64,
    pub pieces_spawned: u32,
    pub pieces_landed: u32,
    pub grains_created: u64,
    pub grains_cleared: u64,
    /// Saturated (row, colour) pairs.
    pub rows_cleared: u64,
    pub grains_swept: u64,
    pub live_grains: usize,
}

pub struct Session {
    config: SimConfig,
    world: PhysicsWorld,
    grid: SpatialGrid,
    generator: PieceGenerator,
    piece: Option<Piece>,
    drop_timer: u64,
    drop_interval: u64,
    observation: Observation,
    stats: SessionStats,
    done: bool,
    halted: bool,
}

impl Session {
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut session = Self {
            world: PhysicsWorld::new(&config),
            grid: SpatialGrid::new(&config),
            generator: PieceGenerator::new(config.seed, config.colors),
            piece: None,
            drop_timer: 0,
            drop_interval: config.drop_interval_ticks(),
            observation: Observation::empty(usize::from(config.rows), usize::from(config.columns)),
            stats: SessionStats::default(),
            done: false,
            halted: false,
            config,
        };
        session.reset();
        Ok(session)
    }

    /// Drops the whole world and starts over with boundaries and a first piece.
    /// The piece generator keeps its sequence across resets.
    pub fn reset(&mut self) -> &Observation {
        self.world = PhysicsWorld::new(&self.config);
        self.grid = SpatialGrid::new(&self.config);
        self.add_boundaries();
        self.piece = None;
        self.drop_timer = 0;
        self.stats = SessionStats::default();
        self.halted = false;
        self.done = false;
        match self.spawn_next() {
            Ok(blocked) => self.done = blocked,
            Err(e) => {
                log::error!("reset failed: {e}");
                self.halted = true;
            }
        }
        if self.refresh_observation() {
            self.done = true;
        }
        log::info!(
            "session reset: {}x{} blocks, {} colours",
            self.config.columns,
            self.config.rows,
            self.config.colors
        );
        &self.observation
    }

    fn add_boundaries(&mut self) {
        let (w, h) = self.config.playfield_size();
        // Thick capsules whose inner surface is flush with the playfield edge.
        let r = self.config.block_size / 2.0;
        self.world.add_boundary(Vec2::new(0.0, -r), Vec2::new(w, -r), r);
        if self.config.side_walls {
            self.world.add_boundary(Vec2::new(-r, 0.0), Vec2::new(-r, h), r);
            self.world.add_boundary(Vec2::new(w + r, 0.0), Vec2::new(w + r, h), r);
        }
    }

    /// Spawns a fresh piece. Returns true if it already collides.
    fn spawn_next(&mut self) -> Result<bool, PhysicsError> {
        let (kind, color) = self.generator.next();
        let piece = Piece::spawn(&mut self.world, &self.config, kind, color);
        let blocked = piece.check_collision(&self.world)?;
        self.piece = Some(piece);
        self.stats.pieces_spawned += 1;
        if blocked {
            log::info!("spawn blocked, board is full");
        }
        Ok(blocked)
    }

    /// Runs one tick: action, drop timer, physics step, grid rebuild, line clear, sweep.
    pub fn step(&mut self, action: Action) -> Result<StepOutcome, GameError> {
        if self.halted {
            return Err(GameError::Halted);
        }
        if self.done {
            return Ok(StepOutcome {
                observation: self.observation.clone(),
                reward: 0.0,
                done: true,
                report: TickReport::default(),
            });
        }
        let report = match self.tick(action) {
            Ok(report) => report,
            Err(e) => {
                self.halted = true;
                log::error!("stopping session at tick {}: {e}", self.stats.ticks);
                return Err(e.into());
            }
        };

        if self.refresh_observation() {
            self.done = true;
        }

        let mut reward = report.cleared.removed as f32;
        if self.done {
            reward += GAME_OVER_PENALTY;
            log::info!(
                "game over after {} ticks, {} grains cleared",
                self.stats.ticks,
                self.stats.grains_cleared
            );
        }
        Ok(StepOutcome {
            observation: self.observation.clone(),
            reward,
            done: self.done,
            report,
        })
    }

    fn tick(&mut self, action: Action) -> Result<TickReport, PhysicsError> {
        let mut report = TickReport::default();
        self.apply(action)?;

        self.drop_timer += 1;
        if self.drop_timer >= self.drop_interval {
            self.drop_timer = 0;
            self.gravity_drop(&mut report)?;
        }

        self.world.step()?;
        self.grid.rebuild(&self.world);
        report.cleared = self.grid.clear_full_lines(&mut self.world);
        for row in &report.cleared.rows {
            log::debug!("row {} full of {:?}: {} grains", row.row, row.color, row.grains);
        }
        report.swept = grain::sweep_offscreen(&mut self.world, self.config.offscreen_threshold);

        let stats = &mut self.stats;
        stats.ticks += 1;
        stats.grains_created += report.shattered as u64;
        stats.grains_cleared += report.cleared.removed as u64;
        stats.rows_cleared += report.cleared.rows.len() as u64;
        stats.grains_swept += report.swept as u64;
        stats.live_grains = self.world.grain_count();
        log::trace!(
            "tick {}: {} grains, {} bodies",
            stats.ticks,
            stats.live_grains,
            self.world.body_count()
        );
        Ok(report)
    }

    fn apply(&mut self, action: Action) -> Result<(), PhysicsError> {
        let Some(piece) = self.piece.as_mut() else {
            return Ok(());
        };
        let world = &mut self.world;
        match action {
            Action::MoveLeft => piece.try_move(world, -1, 0)?,
            Action::MoveRight => piece.try_move(world, 1, 0)?,
            Action::Rotate => piece.try_rotate(world)?,
            Action::SoftDrop => piece.try_move(world, 0, -1)?,
            Action::NoOp => true,
        };
        Ok(())
    }

    /// Timer drop. A blocked drop walks the rest of the cycle within the tick:
    /// land, shatter, spawn the next piece, which starts falling.
    fn gravity_drop(&mut self, report: &mut TickReport) -> Result<(), PhysicsError> {
        let mut phase = Phase::Falling;
        let mut blocked = None;
        let mut landed = None;
        loop {
            phase = match phase {
                Phase::Falling => {
                    let Some(mut piece) = self.piece.take() else {
                        return Ok(());
                    };
                    if piece.try_move(&mut self.world, 0, -1)? {
                        self.piece = Some(piece);
                        return Ok(());
                    }
                    blocked = Some(piece);
                    Phase::Landing
                }
                Phase::Landing => {
                    if let Some(piece) = blocked.take() {
                        landed = Some(piece.land(&mut self.world));
                        self.stats.pieces_landed += 1;
                    }
                    Phase::Shattering
                }
                Phase::Shattering => {
                    if let Some(piece) = landed.take() {
                        report.shattered += grain::shatter(piece, &mut self.world, &self.config);
                    }
                    Phase::Spawning
                }
                Phase::Spawning => {
                    if self.spawn_next()? {
                        self.done = true;
                    }
                    Phase::Falling
                }
            };
            report.phases.push(phase);
            if phase == Phase::Falling {
                return Ok(());
            }
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn piece(&self) -> Option<&Piece> {
        self.piece.as_ref()
    }

    pub fn observation(&self) -> &Observation {
        &self.observation
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn draw_list(&self) -> Vec<DrawPrimitive> {
        render::draw_list(&self.world)
    }

    /// Rebuilds the logical board. Returns true when settled grains reach the spawn rows.
    fn refresh_observation(&mut self) -> bool {
        let settled = observe::settled_board(&self.world, &self.config);
        let full = observe::board_full(&settled, self.config.spawn_rows);
        self.observation = settled;
        if let Some(piece) = &self.piece {
            observe::overlay_piece(&mut self.observation, piece, self.config.block_size);
        }
        full
    }

    #[cfg(test)]
    pub(crate) fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }

    /// Swaps the falling piece for a freshly spawned one of the given kind.
    #[cfg(test)]
    pub(crate) fn replace_piece(&mut self, kind: crate::piece::TetrominoKind, color: crate::piece::Rgb) {
        if let Some(old) = self.piece.take() {
            for block in old.blocks() {
                self.world.remove(block.body());
            }
        }
        self.piece = Some(Piece::spawn(&mut self.world, &self.config, kind, color));
        self.refresh_observation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::Entity;
    use crate::piece::{PALETTE, Rgb, TetrominoKind};

    fn session(seed: u64) -> Session {
        Session::new(SimConfig {
            seed: Some(seed),
            ..SimConfig::default()
        })
        .unwrap()
    }

    fn land_first_piece(s: &mut Session) -> Rgb {
        let color = s.piece().unwrap().color();
        for _ in 0..200 {
            if s.stats().pieces_landed > 0 {
                return color;
            }
            s.step(Action::SoftDrop).unwrap();
        }
        panic!("piece never landed");
    }

    #[test]
    fn reset_builds_boundaries_and_one_piece() {
        let s = session(1);
        let draws = s.draw_list();
        let segments = draws
            .iter()
            .filter(|d| matches!(d, DrawPrimitive::Segment { .. }))
            .count();
        let boxes = draws
            .iter()
            .filter(|d| matches!(d, DrawPrimitive::Box { .. }))
            .count();
        assert_eq!((segments, boxes), (3, 4));
        assert_eq!(s.stats().pieces_spawned, 1);
        assert_eq!(s.observation().occupied(), 4);
        assert!(!s.is_done());
    }

    #[test]
    fn first_landing_shatters_into_one_colour() {
        let mut s = session(42);
        let color = land_first_piece(&mut s);
        assert_eq!(s.stats().grains_created, 100);
        assert_eq!(s.stats().pieces_spawned, 2);
        let grains: Vec<_> = s
            .draw_list()
            .into_iter()
            .filter_map(|d| match d {
                DrawPrimitive::Circle { color, .. } => Some(color),
                _ => None,
            })
            .collect();
        assert_eq!(grains.len(), 100);
        assert!(grains.iter().all(|c| *c == color));
    }

    #[test]
    fn i_piece_lands_and_shatters_into_a_hundred_grains() {
        let mut s = session(11);
        s.replace_piece(TetrominoKind::I, PALETTE[3]);
        let xs: Vec<f32> = s.piece().unwrap().positions().iter().map(|p| p.x).collect();
        assert_eq!(xs, [70.0, 90.0, 110.0, 130.0]);

        let mut landing = None;
        for _ in 0..2_000 {
            let out = s.step(Action::NoOp).unwrap();
            if out.report.landed() {
                landing = Some(out.report);
                break;
            }
        }
        let report = landing.expect("I piece never landed");
        let per_block = (s.config().block_size / s.config().grain_diameter()).powi(2) as usize;
        assert_eq!(report.shattered, per_block * 4);
        assert_eq!(report.shattered, 100);
        assert_eq!(s.world.grain_count(), 100);
        assert!(s.world.grains().all(|g| g.color == PALETTE[3]));
        assert_eq!(
            report.phases,
            [Phase::Landing, Phase::Shattering, Phase::Spawning, Phase::Falling]
        );
        assert_eq!(s.stats().pieces_spawned, 2);
    }

    #[test]
    fn plain_drops_report_no_phase_change() {
        let mut s = session(12);
        for _ in 0..s.config().drop_interval_ticks() * 3 {
            let out = s.step(Action::NoOp).unwrap();
            assert!(out.report.phases.is_empty());
        }
    }

    #[test]
    fn filling_the_last_column_clears_on_the_next_tick() {
        let mut s = session(13);
        let gap = 17;
        for col in (0..50).filter(|&c| c != gap) {
            s.world_mut().add_grain(Vec2::new(col as f32 * 4.0 + 2.0, 2.0), 2.0, PALETTE[1]);
        }
        let out = s.step(Action::NoOp).unwrap();
        assert!(out.report.cleared.is_empty());
        assert_eq!(out.reward, 0.0);
        assert_eq!(s.stats().live_grains, 49);

        s.world_mut().add_grain(Vec2::new(gap as f32 * 4.0 + 2.0, 2.0), 2.0, PALETTE[1]);
        let out = s.step(Action::NoOp).unwrap();
        assert_eq!(out.report.cleared.rows.len(), 1);
        assert_eq!(out.report.cleared.removed, 50);
        assert_eq!(out.reward, 50.0);
        assert_eq!(s.stats().live_grains, 0);
    }

    #[test]
    fn soft_drop_alone_never_lands() {
        let mut s = Session::new(SimConfig {
            seed: Some(3),
            drop_interval_ms: 60_000,
            ..SimConfig::default()
        })
        .unwrap();
        for _ in 0..40 {
            let out = s.step(Action::SoftDrop).unwrap();
            assert!(!out.report.landed());
        }
        assert_eq!(s.stats().pieces_landed, 0);
        assert_eq!(s.world.grain_count(), 0);
    }

    #[test]
    fn full_row_clears_and_pays_out() {
        let mut s = session(5);
        let world = s.world_mut();
        for col in 0..50 {
            world.add_grain(Vec2::new(col as f32 * 4.0 + 2.0, 2.0), 2.0, PALETTE[0]);
        }
        let out = s.step(Action::NoOp).unwrap();
        assert_eq!(out.report.cleared.removed, 50);
        assert_eq!(out.reward, 50.0);
        assert_eq!(s.stats().rows_cleared, 1);
        assert_eq!(s.stats().live_grains, 0);
    }

    #[test]
    fn offscreen_grains_are_gone_after_the_tick() {
        let mut s = session(6);
        s.world_mut().add_grain(Vec2::new(100.0, -50.0), 2.0, PALETTE[1]);
        let out = s.step(Action::NoOp).unwrap();
        assert_eq!(out.report.swept, 1);
        assert_eq!(s.stats().grains_swept, 1);
        assert!(!s
            .draw_list()
            .iter()
            .any(|d| matches!(d, DrawPrimitive::Circle { .. })));
    }

    #[test]
    fn grains_in_spawn_rows_end_the_episode() {
        let mut s = session(7);
        let lattice = grain::lattice(Vec2::new(10.0, 390.0), s.config());
        for p in lattice {
            s.world_mut().add_grain(p, 2.0, PALETTE[2]);
        }
        let out = s.step(Action::NoOp).unwrap();
        assert!(out.done);
        assert_eq!(out.reward, GAME_OVER_PENALTY);
        assert_eq!(out.observation.get(0, 0), 3);

        let again = s.step(Action::MoveLeft).unwrap();
        assert!(again.done);
        assert_eq!(again.reward, 0.0);
        assert_eq!(s.stats().ticks, 1);

        s.reset();
        assert!(!s.is_done());
        assert_eq!(s.stats().ticks, 0);
        assert_eq!(s.world.grain_count(), 0);
    }

    #[test]
    fn divergence_halts_until_reset() {
        let mut s = session(8);
        let g = s.world_mut().add_grain(Vec2::new(20.0, 200.0), 2.0, PALETTE[0]);
        s.world_mut().set_velocity(g, Vec2::new(f32::NAN, 0.0));
        assert!(matches!(s.step(Action::NoOp), Err(GameError::Physics(PhysicsError::Diverged { .. }))));
        assert!(s.is_halted());
        assert!(matches!(s.step(Action::NoOp), Err(GameError::Halted)));
        s.reset();
        assert!(s.step(Action::NoOp).is_ok());
    }

    #[test]
    fn same_seed_same_pieces() {
        let a = session(99);
        let b = session(99);
        let kind = |s: &Session| s.piece().map(|p| (p.kind(), p.color()));
        assert_eq!(kind(&a), kind(&b));
        assert!(matches!(
            a.world.placed().next().map(|p| p.entity),
            Some(Entity::Boundary { .. })
        ));
    }

    #[test]
    fn action_ids_match_their_order() {
        for (i, a) in Action::ALL.iter().enumerate() {
            assert_eq!(Action::from_index(i), Some(*a));
        }
        assert_eq!(Action::from_index(5), None);
    }
}
