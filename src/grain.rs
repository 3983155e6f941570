//! Sand grains: shattering landed blocks and sweeping grains that left the field.

use crate::config::SimConfig;
use crate::physics::{PhysicsWorld, Vec2};
use crate::piece::LandedPiece;

/// Lattice of grain centres filling the square block footprint at `center`.
pub fn lattice(center: Vec2, config: &SimConfig) -> Vec<Vec2> {
    let per_row = config.grains_per_row();
    if per_row == 0 {
        return Vec::new();
    }
    let bs = config.block_size;
    let spacing = bs / per_row as f32;
    let origin = center - Vec2::new(bs / 2.0, bs / 2.0);
    let mut out = Vec::with_capacity(per_row * per_row);
    for row in 0..per_row {
        for col in 0..per_row {
            let offset = Vec2::new((col as f32 + 0.5) * spacing, (row as f32 + 0.5) * spacing);
            out.push(origin + offset);
        }
    }
    out
}

/// Removes each landed block's body and fills its footprint with grains of the block's colour.
/// The only place grains are created. Returns the number of grains added.
pub fn shatter(piece: LandedPiece, world: &mut PhysicsWorld, config: &SimConfig) -> usize {
    let mut grains = 0;
    for block in piece.blocks {
        let center = world.position(block.body()).unwrap_or(block.position);
        world.remove(block.body());
        for p in lattice(center, config) {
            world.add_grain(p, config.grain_radius, block.color);
            grains += 1;
        }
    }
    log::debug!("shattered {} piece into {grains} grains", piece.kind.name());
    grains
}

/// Deletes every grain whose centre is below `threshold`. Returns how many went.
pub fn sweep_offscreen(world: &mut PhysicsWorld, threshold: f32) -> usize {
    let doomed: Vec<_> = world
        .grains()
        .filter(|g| g.position.y < threshold)
        .map(|g| g.handle)
        .collect();
    for &handle in &doomed {
        world.remove(handle);
    }
    if !doomed.is_empty() {
        log::debug!("swept {} grains below {threshold}", doomed.len());
    }
    doomed.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::{PALETTE, Piece, TetrominoKind};

    #[test]
    fn lattice_fills_footprint_evenly() {
        let cfg = SimConfig::default();
        let pts = lattice(Vec2::new(50.0, 70.0), &cfg);
        assert_eq!(pts.len(), 25);
        assert_eq!(pts[0], Vec2::new(42.0, 62.0));
        assert_eq!(pts[24], Vec2::new(58.0, 78.0));
        for p in &pts {
            assert!(p.x - cfg.grain_radius >= 40.0 && p.x + cfg.grain_radius <= 60.0);
            assert!(p.y - cfg.grain_radius >= 60.0 && p.y + cfg.grain_radius <= 80.0);
        }
    }

    #[test]
    fn lattice_uses_floor_of_grains_per_row() {
        let cfg = SimConfig {
            grain_radius: 3.0,
            ..SimConfig::default()
        };
        // 20 / 6 = 3 per row, spacing 20/3.
        assert_eq!(lattice(Vec2::new(10.0, 10.0), &cfg).len(), 9);
    }

    #[test]
    fn shatter_replaces_blocks_with_coloured_grains() {
        let cfg = SimConfig::default();
        let mut world = PhysicsWorld::new(&cfg);
        let piece = Piece::spawn(&mut world, &cfg, TetrominoKind::L, PALETTE[4]);
        let landed = piece.land(&mut world);
        let handles: Vec<_> = landed.blocks.iter().map(|b| b.body()).collect();
        let grains = shatter(landed, &mut world, &cfg);

        assert_eq!(grains, 100);
        assert_eq!(world.grain_count(), 100);
        assert_eq!(world.body_count(), 100);
        assert!(world.grains().all(|g| g.color == PALETTE[4]));
        assert!(handles.iter().all(|h| !world.contains(*h)));
    }

    #[test]
    fn sweep_only_takes_grains_below_threshold() {
        let cfg = SimConfig::default();
        let mut world = PhysicsWorld::new(&cfg);
        world.add_grain(Vec2::new(10.0, -10.5), 2.0, PALETTE[0]);
        world.add_grain(Vec2::new(20.0, -50.0), 2.0, PALETTE[0]);
        let kept = world.add_grain(Vec2::new(30.0, -9.5), 2.0, PALETTE[0]);

        assert_eq!(sweep_offscreen(&mut world, cfg.offscreen_threshold), 2);
        assert_eq!(world.grain_count(), 1);
        assert!(world.contains(kept));
        assert_eq!(sweep_offscreen(&mut world, cfg.offscreen_threshold), 0);
    }
}
