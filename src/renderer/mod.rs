//! Drawing surfaces
//!
//! Sprites draw through the `Surface` trait. The browser build uses an HTML
//! canvas 2D context; headless runs and tests use `RecordingSurface`, which
//! keeps a log of draw operations.

#[cfg(target_arch = "wasm32")]
pub mod canvas2d;
pub mod shapes;

#[cfg(target_arch = "wasm32")]
pub use canvas2d::CanvasSurface;
pub use shapes::{ShapeKind, shape_outline};

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;

/// Axis-aligned rectangle (top-left + size)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub pos: Vec2,
    pub size: Vec2,
}

impl Rect {
    pub fn new(pos: Vec2, size: Vec2) -> Self {
        Self { pos, size }
    }

    pub fn center(&self) -> Vec2 {
        self.pos + self.size / 2.0
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.pos.x
            && p.x <= self.pos.x + self.size.x
            && p.y >= self.pos.y
            && p.y <= self.pos.y + self.size.y
    }
}

pub trait Surface {
    /// Drawable size in pixels
    fn size(&self) -> Vec2;
    /// Last known pointer position, if any
    fn pointer(&self) -> Option<Vec2>;
    fn clear(&mut self);
    fn save(&mut self);
    fn restore(&mut self);
    fn translate(&mut self, offset: Vec2);
    fn scale(&mut self, factor: Vec2);
    /// Copy `src` from a sprite sheet into `dst`
    fn draw_image(&mut self, sheet: &str, src: Rect, dst: Rect);
    /// Fill a geometric stand-in; `active` marks the ball holder
    fn draw_shape(&mut self, shape: ShapeKind, dst: Rect, active: bool);
    fn fill_text(&mut self, text: &str, at: Vec2);
}

/// A draw operation captured by `RecordingSurface`
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear,
    Save,
    Restore,
    Translate(Vec2),
    Scale(Vec2),
    Image { sheet: String, src: Rect, dst: Rect },
    Shape { shape: ShapeKind, dst: Rect, active: bool },
    Text { text: String, at: Vec2 },
}

/// Surface that logs operations instead of drawing. Clones share the log.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    size: Vec2,
    pointer: Rc<RefCell<Option<Vec2>>>,
    ops: Rc<RefCell<Vec<DrawOp>>>,
    depth: Rc<RefCell<i32>>,
}

impl RecordingSurface {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            size: Vec2::new(width, height),
            pointer: Rc::default(),
            ops: Rc::default(),
            depth: Rc::default(),
        }
    }

    pub fn set_pointer(&self, pointer: Option<Vec2>) {
        *self.pointer.borrow_mut() = pointer;
    }

    pub fn ops(&self) -> Vec<DrawOp> {
        self.ops.borrow().clone()
    }

    /// Operations since the most recent `Clear`
    pub fn last_frame(&self) -> Vec<DrawOp> {
        let ops = self.ops.borrow();
        let start = ops.iter().rposition(|op| *op == DrawOp::Clear).unwrap_or(0);
        ops[start..].to_vec()
    }

    /// Open save scopes; zero when every save was restored
    pub fn depth(&self) -> i32 {
        *self.depth.borrow()
    }

    pub fn clear_log(&self) {
        self.ops.borrow_mut().clear();
    }

    fn push(&self, op: DrawOp) {
        self.ops.borrow_mut().push(op);
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> Vec2 {
        self.size
    }

    fn pointer(&self) -> Option<Vec2> {
        *self.pointer.borrow()
    }

    fn clear(&mut self) {
        self.push(DrawOp::Clear);
    }

    fn save(&mut self) {
        *self.depth.borrow_mut() += 1;
        self.push(DrawOp::Save);
    }

    fn restore(&mut self) {
        *self.depth.borrow_mut() -= 1;
        self.push(DrawOp::Restore);
    }

    fn translate(&mut self, offset: Vec2) {
        self.push(DrawOp::Translate(offset));
    }

    fn scale(&mut self, factor: Vec2) {
        self.push(DrawOp::Scale(factor));
    }

    fn draw_image(&mut self, sheet: &str, src: Rect, dst: Rect) {
        self.push(DrawOp::Image {
            sheet: sheet.to_string(),
            src,
            dst,
        });
    }

    fn draw_shape(&mut self, shape: ShapeKind, dst: Rect, active: bool) {
        self.push(DrawOp::Shape { shape, dst, active });
    }

    fn fill_text(&mut self, text: &str, at: Vec2) {
        self.push(DrawOp::Text {
            text: text.to_string(),
            at,
        });
    }
}
