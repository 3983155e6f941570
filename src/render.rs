//! Draw list handed to whatever renders the session.

use crate::physics::{Entity, PhysicsWorld, Vec2};
use crate::piece::Rgb;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawPrimitive {
    /// Square block; `angle` in radians, counter-clockwise.
    Box {
        center: Vec2,
        half_extent: f32,
        angle: f32,
        color: Rgb,
    },
    Circle {
        center: Vec2,
        radius: f32,
        color: Rgb,
    },
    Segment {
        a: Vec2,
        b: Vec2,
        radius: f32,
    },
}

impl DrawPrimitive {
    /// Corners of a box in drawing order, rotated about its centre.
    pub fn box_corners(center: Vec2, half_extent: f32, angle: f32) -> [Vec2; 4] {
        let (s, c) = angle.sin_cos();
        [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)].map(|(sx, sy): (f32, f32)| {
            let (x, y) = (sx * half_extent, sy * half_extent);
            center + Vec2::new(x * c - y * s, x * s + y * c)
        })
    }
}

/// Every live body as a primitive, in registry order.
pub fn draw_list(world: &PhysicsWorld) -> Vec<DrawPrimitive> {
    world
        .placed()
        .map(|p| match p.entity {
            Entity::Boundary { a, b, radius } => DrawPrimitive::Segment { a, b, radius },
            Entity::Block { color, half_extent } => DrawPrimitive::Box {
                center: p.position,
                half_extent,
                angle: p.angle,
                color,
            },
            Entity::Grain { color, radius } => DrawPrimitive::Circle {
                center: p.position,
                radius,
                color,
            },
        })
        .collect()
}
