//! Positioned, scalable, clickable visual entities
//!
//! A sprite knows its sheet (frame size, named visual states, layout), where
//! it sits on the canvas and how big it is drawn. Players and the ball are
//! built on top of it.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::renderer::{Rect, ShapeKind, Surface};

/// Identity shared by sprites and players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpriteError {
    #[error("visual state \"{name}\" is not in the sprite list")]
    UnknownVisualState { name: String },
}

/// Visual states on the player sheet
pub const PLAYER_STATES: [&str; 6] = ["idle", "throw1", "throw2", "throw3", "throw4", "catch"];

/// A sheet of equally sized frames laid out in rows
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteSheet {
    pub path: String,
    pub states: Vec<String>,
    /// Frame width and height on the sheet
    pub frame: Vec2,
    pub columns: usize,
}

impl SpriteSheet {
    pub fn player() -> Self {
        Self {
            path: "assets/spritesheet.svg".to_string(),
            states: PLAYER_STATES.iter().map(|s| s.to_string()).collect(),
            frame: Vec2::new(200.0, 191.0),
            columns: PLAYER_STATES.len(),
        }
    }

    pub fn ball() -> Self {
        Self {
            path: "assets/ball.svg".to_string(),
            states: vec!["ball".to_string()],
            frame: Vec2::new(78.0, 78.0),
            columns: 1,
        }
    }

    /// Source rectangle of frame `index`
    pub fn frame_rect(&self, index: usize) -> Rect {
        let columns = self.columns.max(1);
        let col = (index % columns) as f32;
        let row = (index / columns) as f32;
        Rect::new(Vec2::new(col * self.frame.x, row * self.frame.y), self.frame)
    }
}

/// How a sprite is drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Appearance {
    /// Frames from the sheet image
    Sheet,
    /// A flat geometric shape sized like the sheet frame
    Shape(ShapeKind),
}

#[derive(Debug, Clone)]
pub struct Sprite {
    pub id: EntityId,
    sheet: SpriteSheet,
    appearance: Appearance,
    /// Selected visual state
    index: usize,
    /// Top-left corner on the canvas
    pub pos: Vec2,
    pub center: Vec2,
    /// Drawn size
    pub size: Vec2,
    /// Mirror horizontally about the center
    pub flip: bool,
}

impl Sprite {
    pub fn new(id: EntityId, sheet: SpriteSheet, appearance: Appearance) -> Self {
        let size = sheet.frame;
        Self {
            id,
            sheet,
            appearance,
            index: 0,
            pos: Vec2::ZERO,
            center: size / 2.0,
            size,
            flip: false,
        }
    }

    /// Frame size on the sheet
    pub fn frame(&self) -> Vec2 {
        self.sheet.frame
    }

    pub fn appearance(&self) -> Appearance {
        self.appearance
    }

    /// Scale relative to the sheet frame, keeping the center fixed
    pub fn scale(&mut self, factor: f32) {
        self.size = self.sheet.frame * factor;
        self.pos = self.center - self.size / 2.0;
    }

    /// Place the sprite's center at `center`
    pub fn set_position(&mut self, center: Vec2) {
        self.center = center;
        self.pos = center - self.size / 2.0;
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.pos, self.size)
    }

    pub fn in_bounds(&self, p: Vec2) -> bool {
        self.bounds().contains(p)
    }

    /// Switch to the named visual state
    pub fn set_sprite(&mut self, name: &str) -> Result<(), SpriteError> {
        let index = self
            .sheet
            .states
            .iter()
            .position(|s| s == name)
            .ok_or_else(|| SpriteError::UnknownVisualState {
                name: name.to_string(),
            })?;
        self.index = index;
        Ok(())
    }

    pub fn current_state(&self) -> &str {
        &self.sheet.states[self.index]
    }

    /// Draw inside a save/restore scope.
    ///
    /// `decorate` runs first with the untransformed surface (labels), then
    /// the mirror transform is applied if flipped and the current state is
    /// drawn. Nothing leaks into later draws.
    pub fn render(&self, surface: &mut dyn Surface, decorate: impl FnOnce(&Self, &mut dyn Surface)) {
        surface.save();
        decorate(self, &mut *surface);
        if self.flip {
            surface.translate(Vec2::new(self.center.x, 0.0));
            surface.scale(Vec2::new(-1.0, 1.0));
            surface.translate(Vec2::new(-self.center.x, 0.0));
        }
        match self.appearance {
            Appearance::Sheet => {
                surface.draw_image(&self.sheet.path, self.sheet.frame_rect(self.index), self.bounds());
            }
            Appearance::Shape(shape) => {
                surface.draw_shape(shape, self.bounds(), self.index != 0);
            }
        }
        surface.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{DrawOp, RecordingSurface};

    fn player_sprite() -> Sprite {
        Sprite::new(EntityId(1), SpriteSheet::player(), Appearance::Sheet)
    }

    #[test]
    fn test_scale_and_position() {
        let mut s = player_sprite();
        s.scale(0.5);
        assert_eq!(s.size, Vec2::new(100.0, 95.5));
        s.set_position(Vec2::new(300.0, 200.0));
        assert_eq!(s.pos, Vec2::new(250.0, 152.25));
        assert!(s.in_bounds(Vec2::new(300.0, 200.0)));
        assert!(s.in_bounds(Vec2::new(250.0, 152.25)));
        assert!(!s.in_bounds(Vec2::new(351.0, 200.0)));
    }

    #[test]
    fn test_set_sprite_unknown_state_fails() {
        let mut s = player_sprite();
        s.set_sprite("throw3").unwrap();
        assert_eq!(s.current_state(), "throw3");
        let err = s.set_sprite("wave").unwrap_err();
        assert_eq!(err, SpriteError::UnknownVisualState { name: "wave".into() });
        assert_eq!(s.current_state(), "throw3");
    }

    #[test]
    fn test_frame_rect_layout() {
        let sheet = SpriteSheet::player();
        let rect = sheet.frame_rect(2);
        assert_eq!(rect.pos, Vec2::new(400.0, 0.0));
        assert_eq!(rect.size, Vec2::new(200.0, 191.0));
    }

    #[test]
    fn test_render_is_scoped() {
        let mut surface = RecordingSurface::new(800.0, 600.0);
        let mut s = player_sprite();
        s.flip = true;
        s.render(&mut surface, |_, surf| surf.fill_text("Player 1", Vec2::ZERO));

        let ops = surface.ops();
        assert_eq!(ops.first(), Some(&DrawOp::Save));
        assert_eq!(ops.last(), Some(&DrawOp::Restore));
        // Label is drawn before the mirror transform
        let text = ops.iter().position(|o| matches!(o, DrawOp::Text { .. })).unwrap();
        let mirror = ops.iter().position(|o| matches!(o, DrawOp::Scale(_))).unwrap();
        assert!(text < mirror);
        assert_eq!(surface.depth(), 0);
    }

    #[test]
    fn test_shape_appearance_marks_active() {
        let mut surface = RecordingSurface::new(800.0, 600.0);
        let mut s = Sprite::new(EntityId(2), SpriteSheet::player(), Appearance::Shape(ShapeKind::Diamond));
        s.render(&mut surface, |_, _| {});
        s.set_sprite("throw1").unwrap();
        s.render(&mut surface, |_, _| {});
        let active: Vec<bool> = surface
            .ops()
            .into_iter()
            .filter_map(|o| match o {
                DrawOp::Shape { active, .. } => Some(active),
                _ => None,
            })
            .collect();
        assert_eq!(active, vec![false, true]);
    }
}
