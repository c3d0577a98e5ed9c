//! Drawing primitives shared by the bid document and the shop drawing
//! templates: a buffered page/operation model plus the title block,
//! dimension leader and fit-to-area helpers.
//!
//! Coordinates are PDF points with the origin at the bottom-left corner.

use glazebid_protocol::dimension::format_inches;

/// US letter, in points.
pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;

pub const MARGIN: f32 = 36.0;
pub const TITLE_BLOCK_HEIGHT: f32 = 86.0;

/// The region templates may draw panels into, above the title block.
pub const DRAWING_AREA_LEFT: f32 = MARGIN;
pub const DRAWING_AREA_BOTTOM: f32 = MARGIN + TITLE_BLOCK_HEIGHT + 14.0;
pub const DRAWING_AREA_RIGHT: f32 = PAGE_WIDTH - MARGIN;
pub const DRAWING_AREA_TOP: f32 = PAGE_HEIGHT - MARGIN - 72.0;

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        x: f32,
        y: f32,
        size: f32,
        bold: bool,
        text: String,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: f32,
    },
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        stroke_width: f32,
        filled: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Page {
    pub width_pt: f32,
    pub height_pt: f32,
    pub ops: Vec<DrawOp>,
}

impl Page {
    /// A standalone letter-sized page, pushed into a [`Document`] once
    /// fully drawn.
    pub fn letter() -> Self {
        Page {
            width_pt: PAGE_WIDTH,
            height_pt: PAGE_HEIGHT,
            ops: Vec::new(),
        }
    }

    pub fn text(&mut self, x: f32, y: f32, size: f32, text: impl Into<String>) {
        self.ops.push(DrawOp::Text {
            x,
            y,
            size,
            bold: false,
            text: text.into(),
        });
    }

    pub fn text_bold(&mut self, x: f32, y: f32, size: f32, text: impl Into<String>) {
        self.ops.push(DrawOp::Text {
            x,
            y,
            size,
            bold: true,
            text: text.into(),
        });
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, width: f32) {
        self.ops.push(DrawOp::Line { x1, y1, x2, y2, width });
    }

    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32, stroke_width: f32) {
        self.ops.push(DrawOp::Rect {
            x,
            y,
            w,
            h,
            stroke_width,
            filled: false,
        });
    }

    pub fn rect_filled(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.ops.push(DrawOp::Rect {
            x,
            y,
            w,
            h,
            stroke_width: 0.5,
            filled: true,
        });
    }

    /// All text content on the page, for assertions.
    pub fn text_content(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.text_content().iter().any(|t| t.contains(needle))
    }
}

/// A buffered document: pages of draw operations, materialized to a PDF
/// file by the engine.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pages: Vec<Page>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a letter-sized page and return it for drawing.
    pub fn add_page(&mut self) -> &mut Page {
        self.add_page_sized(PAGE_WIDTH, PAGE_HEIGHT)
    }

    pub fn add_page_sized(&mut self, width_pt: f32, height_pt: f32) -> &mut Page {
        self.pages.push(Page {
            width_pt,
            height_pt,
            ops: Vec::new(),
        });
        self.pages.last_mut().unwrap()
    }

    /// Append a page drawn off-document.
    pub fn push_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Scale a (width, height) in inches to fit the drawing area, leaving
/// room for dimension leaders. Returns (scale, x, y) where (x, y) is the
/// bottom-left corner of the centered panel in points.
pub fn fit_to_drawing_area(width_in: f64, height_in: f64) -> (f32, f32, f32) {
    let area_w = DRAWING_AREA_RIGHT - DRAWING_AREA_LEFT - 90.0;
    let area_h = DRAWING_AREA_TOP - DRAWING_AREA_BOTTOM - 90.0;

    let w = width_in.max(1.0) as f32;
    let h = height_in.max(1.0) as f32;
    let scale = (area_w / w).min(area_h / h);

    let panel_w = w * scale;
    let panel_h = h * scale;
    let x = DRAWING_AREA_LEFT + (DRAWING_AREA_RIGHT - DRAWING_AREA_LEFT - panel_w) / 2.0;
    let y = DRAWING_AREA_BOTTOM + (DRAWING_AREA_TOP - DRAWING_AREA_BOTTOM - panel_h) / 2.0;
    (scale, x, y)
}

/// Title block in the bottom-right corner of a drawing sheet.
pub fn draw_title_block(
    page: &mut Page,
    drawing_num: &str,
    project_name: &str,
    client_name: &str,
    date: &str,
) {
    let w = 288.0;
    let h = TITLE_BLOCK_HEIGHT;
    let x = PAGE_WIDTH - MARGIN - w;
    let y = MARGIN;

    page.rect(x, y, w, h, 1.0);
    page.line(x, y + h - 20.0, x + w, y + h - 20.0, 0.5);

    page.text_bold(x + 6.0, y + h - 15.0, 10.0, drawing_num);
    page.text(x + 6.0, y + h - 34.0, 8.0, format!("Project: {}", project_name));
    page.text(x + 6.0, y + h - 48.0, 8.0, format!("Client: {}", client_name));
    page.text(x + 6.0, y + h - 62.0, 8.0, format!("Date: {}", date));
    page.text(x + 6.0, y + h - 76.0, 8.0, "Scale: NTS    Drawn by: System");
}

/// Revision box in the top-right corner of a drawing sheet.
pub fn draw_revision_box(page: &mut Page, revision: &str, date: &str) {
    let w = 144.0;
    let h = 48.0;
    let x = PAGE_WIDTH - MARGIN - w;
    let y = PAGE_HEIGHT - MARGIN - h;

    page.rect(x, y, w, h, 0.8);
    page.line(x, y + h - 16.0, x + w, y + h - 16.0, 0.5);
    page.text_bold(x + 6.0, y + h - 12.0, 8.0, "REVISIONS");
    page.text(x + 6.0, y + h - 30.0, 8.0, format!("Rev {}  {}", revision, date));
}

/// Horizontal dimension leader under a panel, with tick marks and the
/// formatted value (or TBV) centered beneath.
pub fn draw_horizontal_leader(page: &mut Page, x: f32, y: f32, length: f32, value: Option<f64>) {
    let leader_y = y - 18.0;
    page.line(x, leader_y, x + length, leader_y, 0.5);
    page.line(x, leader_y - 4.0, x, leader_y + 4.0, 0.5);
    page.line(x + length, leader_y - 4.0, x + length, leader_y + 4.0, 0.5);
    page.text(x + length / 2.0 - 14.0, leader_y - 12.0, 8.0, format_inches(value));
}

/// Vertical dimension leader to the right of a panel.
pub fn draw_vertical_leader(page: &mut Page, x: f32, y: f32, length: f32, value: Option<f64>) {
    let leader_x = x + 18.0;
    page.line(leader_x, y, leader_x, y + length, 0.5);
    page.line(leader_x - 4.0, y, leader_x + 4.0, y, 0.5);
    page.line(leader_x - 4.0, y + length, leader_x + 4.0, y + length, 0.5);
    page.text(leader_x + 6.0, y + length / 2.0 - 3.0, 8.0, format_inches(value));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_accumulate_ops() {
        let mut doc = Document::new();
        let page = doc.add_page();
        page.text(10.0, 10.0, 12.0, "hello");
        page.line(0.0, 0.0, 10.0, 10.0, 1.0);
        assert_eq!(doc.pages().len(), 1);
        assert_eq!(doc.pages()[0].ops.len(), 2);
        assert!(doc.pages()[0].contains_text("hello"));
    }

    #[test]
    fn fit_scales_down_large_panels() {
        let (scale, x, y) = fit_to_drawing_area(240.0, 96.0);
        let panel_w = 240.0 * scale;
        let panel_h = 96.0 * scale;
        assert!(panel_w <= DRAWING_AREA_RIGHT - DRAWING_AREA_LEFT);
        assert!(panel_h <= DRAWING_AREA_TOP - DRAWING_AREA_BOTTOM);
        assert!(x >= DRAWING_AREA_LEFT);
        assert!(y >= DRAWING_AREA_BOTTOM);
    }

    #[test]
    fn leaders_render_tbv_for_unknown_values() {
        let mut doc = Document::new();
        let page = doc.add_page();
        draw_horizontal_leader(page, 100.0, 300.0, 200.0, None);
        draw_vertical_leader(page, 300.0, 100.0, 150.0, Some(72.0));
        assert!(page.contains_text("TBV"));
        assert!(page.contains_text("6'-0\""));
    }

    #[test]
    fn title_block_carries_project_info() {
        let mut doc = Document::new();
        let page = doc.add_page();
        draw_title_block(page, "SD-01", "Tower A", "Acme Dev", "2024-03-01");
        assert!(page.contains_text("SD-01"));
        assert!(page.contains_text("Project: Tower A"));
        assert!(page.contains_text("Client: Acme Dev"));
    }
}
