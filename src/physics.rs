//! Physics world: rigid-body pipeline, body registry and the handle → entity table.
//!
//! This is the only module that talks to the physics backend. Everything else
//! works with [`BodyHandle`], [`Vec2`] and the [`Entity`] records kept here.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use rapier2d::parry::bounding_volume::{Aabb, BoundingVolume};
use rapier2d::parry::query;
use rapier2d::prelude::*;
use thiserror::Error;

use crate::config::SimConfig;
use crate::piece::Rgb;

/// World-space vector (y grows upwards, the floor sits at y = 0).
pub type Vec2 = Vector<Real>;

const BLOCK_MASS: Real = 1.0;
const GRAIN_MASS: Real = 0.1;
const FRICTION: Real = 0.5;
const ELASTICITY: Real = 0.0;
const BOUNDARY_FRICTION: Real = 1.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    /// Non-finite position or velocity after a step. The world can no longer be trusted.
    #[error("simulation diverged: {bodies} bodies with non-finite state after step {step}")]
    Diverged { bodies: usize, step: u64 },
    #[error("no overlap test between these shape kinds")]
    UnsupportedQuery,
}

/// Opaque reference to one body and its single shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle {
    body: RigidBodyHandle,
    collider: ColliderHandle,
}

/// How the solver treats a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Position set directly by game logic; pushes others, never pushed.
    Controlled,
    /// Gravity and collision responsive.
    Dynamic,
    Static,
}

/// What a body stands for in the game. Stored next to the handle so shapes
/// never carry pointers back into game records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Entity {
    Boundary { a: Vec2, b: Vec2, radius: Real },
    Block { color: Rgb, half_extent: Real },
    Grain { color: Rgb, radius: Real },
}

/// Snapshot of one live grain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainView {
    pub handle: BodyHandle,
    pub position: Vec2,
    pub color: Rgb,
}

/// Entity plus its current pose, in registry order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placed {
    pub handle: BodyHandle,
    pub entity: Entity,
    pub position: Vec2,
    pub angle: Real,
}

pub struct PhysicsWorld {
    gravity: Vec2,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    time_until_sleep: Real,
    overlap_tolerance: Real,
    entities: HashMap<RigidBodyHandle, (ColliderHandle, Entity)>,
    grain_count: usize,
    steps: u64,
}

impl PhysicsWorld {
    pub fn new(config: &SimConfig) -> Self {
        let mut params = IntegrationParameters::default();
        params.dt = config.dt();
        params.num_solver_iterations =
            NonZeroUsize::new(config.solver_iterations).unwrap_or(NonZeroUsize::MIN);
        // Tolerances are normalised by the typical object size.
        params.length_unit = config.block_size;
        params.normalized_allowed_linear_error = config.collision_slop / config.block_size;
        Self {
            gravity: Vec2::new(0.0, config.gravity),
            params,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            time_until_sleep: config.sleep_time_threshold,
            overlap_tolerance: config.collision_slop,
            entities: HashMap::new(),
            grain_count: 0,
            steps: 0,
        }
    }

    /// Static segment with rounded thickness `radius` (floor, walls).
    pub fn add_boundary(&mut self, a: Vec2, b: Vec2, radius: Real) -> BodyHandle {
        let body = RigidBodyBuilder::fixed().build();
        let collider = ColliderBuilder::capsule_from_endpoints(
            Point::new(a.x, a.y),
            Point::new(b.x, b.y),
            radius,
        )
        .friction(BOUNDARY_FRICTION)
        .restitution(ELASTICITY);
        self.insert(body, collider, Entity::Boundary { a, b, radius })
    }

    /// Square box for a tetromino block, either controlled or dynamic.
    pub fn add_box(&mut self, center: Vec2, half_extent: Real, color: Rgb, kind: BodyKind) -> BodyHandle {
        let body = match kind {
            BodyKind::Controlled => RigidBodyBuilder::kinematic_position_based(),
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
            BodyKind::Static => RigidBodyBuilder::fixed(),
        }
        .translation(center)
        .build();
        let collider = ColliderBuilder::cuboid(half_extent, half_extent)
            .mass(BLOCK_MASS)
            .friction(FRICTION)
            .restitution(ELASTICITY);
        self.insert(body, collider, Entity::Block { color, half_extent })
    }

    pub fn add_grain(&mut self, center: Vec2, radius: Real, color: Rgb) -> BodyHandle {
        let body = RigidBodyBuilder::dynamic().translation(center).build();
        let collider = ColliderBuilder::ball(radius)
            .mass(GRAIN_MASS)
            .friction(FRICTION)
            .restitution(ELASTICITY);
        self.grain_count += 1;
        self.insert(body, collider, Entity::Grain { color, radius })
    }

    fn insert(&mut self, mut body: RigidBody, collider: ColliderBuilder, entity: Entity) -> BodyHandle {
        if body.is_dynamic() {
            body.activation_mut().time_until_sleep = self.time_until_sleep;
        }
        let body = self.bodies.insert(body);
        let collider = self
            .colliders
            .insert_with_parent(collider.build(), body, &mut self.bodies);
        self.entities.insert(body, (collider, entity));
        BodyHandle { body, collider }
    }

    /// Unregisters a body and its shape. Returns what it was, or `None` if already gone.
    pub fn remove(&mut self, handle: BodyHandle) -> Option<Entity> {
        let (_, entity) = self.entities.remove(&handle.body)?;
        self.bodies.remove(
            handle.body,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        if matches!(entity, Entity::Grain { .. }) {
            self.grain_count -= 1;
        }
        Some(entity)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, handle: BodyHandle) -> bool {
        self.entities.contains_key(&handle.body)
    }

    #[cfg(test)]
    pub(crate) fn entity(&self, handle: BodyHandle) -> Option<Entity> {
        self.entities.get(&handle.body).map(|(_, e)| *e)
    }

    #[cfg(test)]
    pub(crate) fn body_kind(&self, handle: BodyHandle) -> Option<BodyKind> {
        let rb = self.bodies.get(handle.body)?;
        Some(match rb.body_type() {
            RigidBodyType::Dynamic => BodyKind::Dynamic,
            RigidBodyType::Fixed => BodyKind::Static,
            RigidBodyType::KinematicPositionBased | RigidBodyType::KinematicVelocityBased => {
                BodyKind::Controlled
            }
        })
    }

    pub fn position(&self, handle: BodyHandle) -> Option<Vec2> {
        self.bodies.get(handle.body).map(|rb| *rb.translation())
    }

    /// Teleports a body. Used for controlled blocks; the solver does not interpolate.
    pub fn set_position(&mut self, handle: BodyHandle, position: Vec2) {
        if let Some(rb) = self.bodies.get_mut(handle.body) {
            rb.set_translation(position, true);
        }
    }

    pub fn grain_count(&self) -> usize {
        self.grain_count
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Live grains in registry order.
    pub fn grains(&self) -> impl Iterator<Item = GrainView> + '_ {
        self.bodies.iter().filter_map(|(body, rb)| {
            match self.entities.get(&body)? {
                (collider, Entity::Grain { color, .. }) => Some(GrainView {
                    handle: BodyHandle {
                        body,
                        collider: *collider,
                    },
                    position: *rb.translation(),
                    color: *color,
                }),
                _ => None,
            }
        })
    }

    /// Every registered entity with its pose, in registry order.
    pub fn placed(&self) -> impl Iterator<Item = Placed> + '_ {
        self.bodies.iter().filter_map(|(body, rb)| {
            let (collider, entity) = self.entities.get(&body)?;
            Some(Placed {
                handle: BodyHandle {
                    body,
                    collider: *collider,
                },
                entity: *entity,
                position: *rb.translation(),
                angle: rb.rotation().angle(),
            })
        })
    }

    /// True if an axis-aligned square at `center` penetrates any shape whose body
    /// is not listed in `ignore` by more than the collision slop.
    pub fn box_overlaps(
        &self,
        center: Vec2,
        half_extent: Real,
        ignore: &[BodyHandle],
    ) -> Result<bool, PhysicsError> {
        let shape = Cuboid::new(Vec2::new(half_extent, half_extent));
        let pose = Isometry::new(center, 0.0);
        let probe = Aabb::new(
            Point::new(center.x - half_extent, center.y - half_extent),
            Point::new(center.x + half_extent, center.y + half_extent),
        );
        for (_, collider) in self.colliders.iter() {
            let Some(parent) = collider.parent() else {
                continue;
            };
            if ignore.iter().any(|h| h.body == parent) {
                continue;
            }
            let Some(rb) = self.bodies.get(parent) else {
                continue;
            };
            // Kinematic moves only reach collider poses at the next step, so read the body.
            let other_pose = rb.position();
            if !collider.shape().compute_aabb(other_pose).intersects(&probe) {
                continue;
            }
            let contact = query::contact(&pose, &shape, other_pose, collider.shape(), 0.0)
                .map_err(|_| PhysicsError::UnsupportedQuery)?;
            if contact.is_some_and(|c| c.dist < -self.overlap_tolerance) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Advances the simulation by one fixed timestep.
    pub fn step(&mut self) -> Result<(), PhysicsError> {
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
        self.steps += 1;

        let diverged = self
            .bodies
            .iter()
            .filter(|(_, rb)| rb.is_dynamic())
            .filter(|(_, rb)| {
                let (p, v) = (rb.translation(), rb.linvel());
                !(p.x.is_finite() && p.y.is_finite() && v.x.is_finite() && v.y.is_finite())
            })
            .count();
        if diverged > 0 {
            log::warn!("physics diverged at step {}: {diverged} bodies", self.steps);
            return Err(PhysicsError::Diverged {
                bodies: diverged,
                step: self.steps,
            });
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2) {
        if let Some(rb) = self.bodies.get_mut(handle.body) {
            rb.set_linvel(velocity, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = Rgb(255, 0, 0);

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(&SimConfig::default())
    }

    #[test]
    fn add_and_remove_grain_updates_counts() {
        let mut w = world();
        let g = w.add_grain(Vec2::new(10.0, 10.0), 2.0, RED);
        assert_eq!(w.grain_count(), 1);
        assert_eq!(w.body_count(), 1);
        assert_eq!(w.entity(g), Some(Entity::Grain { color: RED, radius: 2.0 }));
        assert!(w.remove(g).is_some());
        assert!(w.remove(g).is_none());
        assert_eq!(w.grain_count(), 0);
        assert!(!w.contains(g));
    }

    #[test]
    fn grain_falls_under_gravity() {
        let mut w = world();
        let g = w.add_grain(Vec2::new(50.0, 300.0), 2.0, RED);
        for _ in 0..10 {
            w.step().unwrap();
        }
        assert!(w.position(g).unwrap().y < 300.0);
    }

    #[test]
    fn controlled_box_ignores_gravity() {
        let mut w = world();
        let b = w.add_box(Vec2::new(50.0, 300.0), 10.0, RED, BodyKind::Controlled);
        for _ in 0..10 {
            w.step().unwrap();
        }
        assert_eq!(w.position(b), Some(Vec2::new(50.0, 300.0)));
        assert_eq!(w.body_kind(b), Some(BodyKind::Controlled));
    }

    #[test]
    fn floor_stops_grain() {
        let mut w = world();
        w.add_boundary(Vec2::new(-10.0, -10.0), Vec2::new(210.0, -10.0), 10.0);
        let g = w.add_grain(Vec2::new(100.0, 40.0), 2.0, RED);
        for _ in 0..120 {
            w.step().unwrap();
        }
        let y = w.position(g).unwrap().y;
        assert!(y > 0.0 && y < 4.0, "grain should rest on the floor, y = {y}");
    }

    #[test]
    fn overlap_respects_ignore_list_and_touching() {
        let mut w = world();
        let a = w.add_box(Vec2::new(50.0, 50.0), 10.0, RED, BodyKind::Controlled);
        // Same spot: overlaps unless ignored.
        assert!(w.box_overlaps(Vec2::new(50.0, 50.0), 10.0, &[]).unwrap());
        assert!(!w.box_overlaps(Vec2::new(50.0, 50.0), 10.0, &[a]).unwrap());
        // Flush neighbour only touches.
        assert!(!w.box_overlaps(Vec2::new(70.0, 50.0), 10.0, &[]).unwrap());
        // Overlap after teleport is seen without stepping.
        w.set_position(a, Vec2::new(100.0, 100.0));
        assert!(!w.box_overlaps(Vec2::new(50.0, 50.0), 10.0, &[]).unwrap());
        assert!(w.box_overlaps(Vec2::new(95.0, 100.0), 10.0, &[]).unwrap());
    }

    #[test]
    fn overlap_sees_grains() {
        let mut w = world();
        w.add_grain(Vec2::new(50.0, 50.0), 2.0, RED);
        assert!(w.box_overlaps(Vec2::new(50.0, 45.0), 10.0, &[]).unwrap());
        assert!(!w.box_overlaps(Vec2::new(50.0, 70.0), 10.0, &[]).unwrap());
    }

    #[test]
    fn non_finite_state_is_fatal() {
        let mut w = world();
        let g = w.add_grain(Vec2::new(50.0, 50.0), 2.0, RED);
        w.set_velocity(g, Vec2::new(Real::NAN, 0.0));
        assert!(matches!(w.step(), Err(PhysicsError::Diverged { .. })));
    }
}
