//! Cyberball - a ball-tossing social-exclusion experiment
//!
//! Core modules:
//! - `bus`: Named publish/subscribe channels shared by every game entity
//! - `choice`: Weighted random selection and time-unit parsing
//! - `recorder`: Append-only session log with a single terminal flush
//! - `sim`: Sprites, players, turn-taking engine, scheduler, session loop
//! - `renderer`: Drawing surface abstraction (recording + HTML canvas)
//! - `config`: Options, strings and condition documents
//! - `transport`: Delivery of the recorded session to the data server

pub mod bus;
pub mod choice;
pub mod config;
pub mod error;
pub mod recorder;
pub mod renderer;
pub mod sim;
pub mod transport;

pub use config::{Condition, Options, Strings};
pub use error::{Error, fatal};

use glam::Vec2;

/// Layout constants for the game board
pub mod consts {
    /// Participant sprite height as a fraction of the short canvas side
    pub const PLAYER_SCALE_FRACTION: f32 = 0.1666;
    /// Ball sprite height as a fraction of the short canvas side
    pub const BALL_SCALE_FRACTION: f32 = 0.04;

    /// Participant anchor (fraction of canvas width, height)
    pub const PARTICIPANT_ANCHOR: (f32, f32) = (0.5, 0.75);
    /// Radius of the confederate half circle as a fraction of the short side
    pub const CONFEDERATE_RADIUS_FRACTION: f32 = 0.5;

    /// Where the ball sits relative to the holder's top-left corner (sheet pixels)
    pub const BALL_HAND_OFFSET: (f32, f32) = (165.0, 48.0);

    /// Delay before the loop restarts after a probe closes
    pub const RESUME_DELAY_MS: u64 = 16;
}

/// Convert a fraction of the canvas into pixel coordinates
#[inline]
pub fn pct2px(px: f32, py: f32, size: Vec2) -> Vec2 {
    Vec2::new(px * size.x, py * size.y)
}

/// Offset relative to a top-left origin
#[inline]
pub fn relpx(x: f32, y: f32, origin: Vec2) -> Vec2 {
    origin + Vec2::new(x, y)
}

/// Centers for `count` confederates on the upper half circle around `center`
pub fn confederate_positions(count: usize, r: f32, center: Vec2) -> Vec<Vec2> {
    use std::f32::consts::{FRAC_PI_2, PI};
    (0..count)
        .map(|i| {
            let angle = (i + 1) as f32 * PI / (count + 1) as f32 + FRAC_PI_2;
            Vec2::new(center.x - r * angle.sin(), center.y + r * angle.cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confederates_sit_above_participant() {
        let center = Vec2::new(500.0, 750.0);
        let positions = confederate_positions(2, 100.0, center);
        assert_eq!(positions.len(), 2);
        for p in &positions {
            assert!(p.y < center.y);
            assert!((p.distance(center) - 100.0).abs() < 0.01);
        }
        // Left to right
        assert!(positions[0].x < center.x);
        assert!(positions[1].x > center.x);
    }

    #[test]
    fn test_pct2px() {
        let p = pct2px(0.5, 0.75, Vec2::new(800.0, 600.0));
        assert_eq!(p, Vec2::new(400.0, 450.0));
    }
}
