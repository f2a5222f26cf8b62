//! HTML canvas 2D surface

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use glam::Vec2;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement};

use super::{Rect, ShapeKind, Surface, shape_outline};

const FONT: &str = "1em BlinkMacSystemFont, -apple-system, \"Segoe UI\", \"Roboto\", \
\"Helvetica Neue\", \"Helvetica\", \"Arial\", sans-serif";

pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    images: HashMap<String, HtmlImageElement>,
    pointer: Rc<Cell<Option<Vec2>>>,
}

impl CanvasSurface {
    pub fn new(canvas: HtmlCanvasElement) -> Option<Self> {
        let ctx = canvas
            .get_context("2d")
            .ok()??
            .dyn_into::<CanvasRenderingContext2d>()
            .ok()?;
        Some(Self {
            canvas,
            ctx,
            images: HashMap::new(),
            pointer: Rc::new(Cell::new(None)),
        })
    }

    /// Handle the page's mousemove listener writes into
    pub fn pointer_handle(&self) -> Rc<Cell<Option<Vec2>>> {
        Rc::clone(&self.pointer)
    }

    /// Match the backing store to the element's client size
    pub fn fit_to_client(&self) {
        let w = self.canvas.client_width().max(1) as u32;
        let h = self.canvas.client_height().max(1) as u32;
        if self.canvas.width() != w {
            self.canvas.set_width(w);
        }
        if self.canvas.height() != h {
            self.canvas.set_height(h);
        }
    }

    fn image(&mut self, sheet: &str) -> Option<&HtmlImageElement> {
        if !self.images.contains_key(sheet) {
            let img = HtmlImageElement::new().ok()?;
            img.set_src(sheet);
            self.images.insert(sheet.to_string(), img);
        }
        self.images.get(sheet)
    }
}

impl Surface for CanvasSurface {
    fn size(&self) -> Vec2 {
        Vec2::new(self.canvas.width() as f32, self.canvas.height() as f32)
    }

    fn pointer(&self) -> Option<Vec2> {
        self.pointer.get()
    }

    fn clear(&mut self) {
        self.fit_to_client();
        let size = self.size();
        self.ctx
            .clear_rect(0.0, 0.0, size.x as f64, size.y as f64);
    }

    fn save(&mut self) {
        self.ctx.save();
    }

    fn restore(&mut self) {
        self.ctx.restore();
    }

    fn translate(&mut self, offset: Vec2) {
        let _ = self.ctx.translate(offset.x as f64, offset.y as f64);
    }

    fn scale(&mut self, factor: Vec2) {
        let _ = self.ctx.scale(factor.x as f64, factor.y as f64);
    }

    fn draw_image(&mut self, sheet: &str, src: Rect, dst: Rect) {
        let ctx = self.ctx.clone();
        let Some(img) = self.image(sheet) else {
            log::warn!("Could not create image for {sheet}");
            return;
        };
        // Not loaded yet; the next frame will catch it
        if !img.complete() {
            return;
        }
        let _ = ctx.draw_image_with_html_image_element_and_sw_and_sh_and_dx_and_dy_and_dw_and_dh(
            img,
            src.pos.x as f64,
            src.pos.y as f64,
            src.size.x as f64,
            src.size.y as f64,
            dst.pos.x as f64,
            dst.pos.y as f64,
            dst.size.x as f64,
            dst.size.y as f64,
        );
    }

    fn draw_shape(&mut self, shape: ShapeKind, dst: Rect, active: bool) {
        let outline = shape_outline(shape, dst);
        let Some((first, rest)) = outline.split_first() else {
            return;
        };
        self.ctx.begin_path();
        self.ctx.move_to(first.x as f64, first.y as f64);
        for p in rest {
            self.ctx.line_to(p.x as f64, p.y as f64);
        }
        self.ctx.close_path();
        self.ctx.set_fill_style_str(shape.color(active));
        self.ctx.fill();
    }

    fn fill_text(&mut self, text: &str, at: Vec2) {
        self.ctx.set_font(FONT);
        self.ctx.set_fill_style_str("white");
        let _ = self.ctx.fill_text(text, at.x as f64, at.y as f64);
    }
}
