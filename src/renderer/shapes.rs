//! Geometric stand-ins for players in the desocialized variant

use std::f32::consts::{PI, TAU};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::Rect;

/// Segments used to approximate a circle
const CIRCLE_SEGMENTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Circle,
    Square,
    Triangle,
    Diamond,
}

impl ShapeKind {
    /// Shapes handed out to players in order
    pub const ROTATION: [ShapeKind; 4] = [
        ShapeKind::Circle,
        ShapeKind::Square,
        ShapeKind::Triangle,
        ShapeKind::Diamond,
    ];

    /// Fill color for the idle and ball-holding states
    pub fn color(&self, active: bool) -> &'static str {
        match (self, active) {
            (_, true) => "#f5c542",
            (ShapeKind::Circle, false) => "#4a90d9",
            (ShapeKind::Square, false) => "#50b36b",
            (ShapeKind::Triangle, false) => "#c65ad6",
            (ShapeKind::Diamond, false) => "#d9694a",
        }
    }
}

/// Closed outline of `shape` inscribed in `dst`, clockwise from the top
pub fn shape_outline(shape: ShapeKind, dst: Rect) -> Vec<Vec2> {
    let c = dst.center();
    let half = dst.size / 2.0;
    match shape {
        ShapeKind::Circle => (0..CIRCLE_SEGMENTS)
            .map(|i| {
                let a = i as f32 / CIRCLE_SEGMENTS as f32 * TAU - PI / 2.0;
                c + Vec2::new(a.cos() * half.x, a.sin() * half.y)
            })
            .collect(),
        ShapeKind::Square => vec![
            dst.pos,
            dst.pos + Vec2::new(dst.size.x, 0.0),
            dst.pos + dst.size,
            dst.pos + Vec2::new(0.0, dst.size.y),
        ],
        ShapeKind::Triangle => vec![
            Vec2::new(c.x, dst.pos.y),
            dst.pos + dst.size,
            Vec2::new(dst.pos.x, dst.pos.y + dst.size.y),
        ],
        ShapeKind::Diamond => vec![
            Vec2::new(c.x, dst.pos.y),
            Vec2::new(dst.pos.x + dst.size.x, c.y),
            Vec2::new(c.x, dst.pos.y + dst.size.y),
            Vec2::new(dst.pos.x, c.y),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outlines_stay_inside_rect() {
        let dst = Rect::new(Vec2::new(10.0, 20.0), Vec2::new(100.0, 80.0));
        for shape in ShapeKind::ROTATION {
            let outline = shape_outline(shape, dst);
            assert!(outline.len() >= 3, "{shape:?}");
            for p in outline {
                assert!(p.x >= dst.pos.x - 0.01 && p.x <= dst.pos.x + dst.size.x + 0.01);
                assert!(p.y >= dst.pos.y - 0.01 && p.y <= dst.pos.y + dst.size.y + 0.01);
            }
        }
    }

    #[test]
    fn test_active_color_shared() {
        assert_eq!(ShapeKind::Circle.color(true), ShapeKind::Square.color(true));
        assert_ne!(ShapeKind::Circle.color(false), ShapeKind::Square.color(false));
    }
}
