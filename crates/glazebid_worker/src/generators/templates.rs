//! Shop-drawing templates.
//!
//! A static table maps item configurations to sheet renderers; anything
//! unmapped gets the placeholder sheet. Each template draws into the
//! sheet's drawing area: panel outlines scaled to fit, dimension leaders
//! with TBV for unknown values, and the glass note.

use glazebid_protocol::{ItemCategory, ScopeItem};

use super::drawing::{
    draw_horizontal_leader, draw_vertical_leader, fit_to_drawing_area, Page, DRAWING_AREA_TOP,
    MARGIN,
};

pub trait Template: Sync {
    fn name(&self) -> &'static str;
    fn draw(&self, page: &mut Page, item: &ScopeItem);
}

/// Resolve a configuration to its sheet template.
pub fn template_for(configuration: &str) -> &'static dyn Template {
    match configuration {
        "inline-panel" | "inline-panel-door" => &InlinePanelDoor,
        "90-degree-corner" | "90-degree-corner-door" => &CornerDoor,
        "bathtub-fixed-panel" | "bathtub-panel-door" => &BathtubFixedPanel,
        "vanity-mirror" | "vanity-mirror-custom" => &VanityMirror,
        _ => &Placeholder,
    }
}

/// Drawing dimensions fall back to nominal sizes so a sheet can always
/// be laid out; the leaders still print TBV for unknown values.
fn nominal_dims(item: &ScopeItem) -> (f64, f64) {
    let (default_w, default_h) = match item.category {
        ItemCategory::ShowerEnclosure => (36.0, 72.0),
        ItemCategory::VanityMirror => (30.0, 36.0),
    };
    (
        item.dimensions.width.value.unwrap_or(default_w),
        item.dimensions.height.value.unwrap_or(default_h),
    )
}

fn draw_heading(page: &mut Page, title: &str, item: &ScopeItem) {
    page.text_bold(MARGIN, DRAWING_AREA_TOP + 40.0, 14.0, title);
    page.text(
        MARGIN,
        DRAWING_AREA_TOP + 24.0,
        9.0,
        format!("Glass: {}", item.glass_type),
    );
    if !item.location.is_empty() {
        page.text(
            MARGIN,
            DRAWING_AREA_TOP + 12.0,
            9.0,
            format!("Location: {}", item.location),
        );
    }
}

fn draw_panel_with_leaders(page: &mut Page, item: &ScopeItem) -> (f32, f32, f32, f32) {
    let (width_in, height_in) = nominal_dims(item);
    let (scale, x, y) = fit_to_drawing_area(width_in, height_in);
    let w = width_in as f32 * scale;
    let h = height_in as f32 * scale;

    page.rect(x, y, w, h, 1.2);
    draw_horizontal_leader(page, x, y, w, item.dimensions.width.value);
    draw_vertical_leader(page, x + w, y, h, item.dimensions.height.value);
    (x, y, w, h)
}

pub struct InlinePanelDoor;

impl Template for InlinePanelDoor {
    fn name(&self) -> &'static str {
        "INLINE PANEL / DOOR"
    }

    fn draw(&self, page: &mut Page, item: &ScopeItem) {
        draw_heading(page, self.name(), item);
        let (x, y, w, h) = draw_panel_with_leaders(page, item);
        // Door leaf split at 40% with a swing arc hinted by a chord.
        let door_x = x + w * 0.4;
        page.line(door_x, y, door_x, y + h, 0.8);
        page.line(door_x, y + h * 0.5, x + w, y + h * 0.85, 0.4);
        page.text(x + w * 0.12, y + h * 0.5, 8.0, "PANEL");
        page.text(door_x + w * 0.12, y + h * 0.5, 8.0, "DOOR");
    }
}

pub struct CornerDoor;

impl Template for CornerDoor {
    fn name(&self) -> &'static str {
        "90° CORNER DOOR"
    }

    fn draw(&self, page: &mut Page, item: &ScopeItem) {
        draw_heading(page, self.name(), item);
        let (x, y, w, h) = draw_panel_with_leaders(page, item);
        // Return panel drawn in plan hint at the right edge.
        let return_w = w * 0.35;
        page.rect(x + w, y, return_w, h, 0.8);
        page.text(x + w + 4.0, y + h * 0.5, 8.0, "RETURN");
        page.text(x + w * 0.3, y + h * 0.5, 8.0, "DOOR");
        if let Some(depth) = item.dimensions.depth.value {
            draw_horizontal_leader(page, x + w, y, return_w, Some(depth));
        }
    }
}

pub struct BathtubFixedPanel;

impl Template for BathtubFixedPanel {
    fn name(&self) -> &'static str {
        "BATHTUB FIXED PANEL"
    }

    fn draw(&self, page: &mut Page, item: &ScopeItem) {
        draw_heading(page, self.name(), item);
        let (x, y, w, _h) = draw_panel_with_leaders(page, item);
        // Tub deck line under the panel.
        page.line(x - 20.0, y, x + w + 20.0, y, 1.5);
        page.text(x, y - 30.0, 8.0, "TUB DECK");
    }
}

pub struct VanityMirror;

impl Template for VanityMirror {
    fn name(&self) -> &'static str {
        "VANITY MIRROR"
    }

    fn draw(&self, page: &mut Page, item: &ScopeItem) {
        draw_heading(page, self.name(), item);
        let (x, y, w, h) = draw_panel_with_leaders(page, item);
        // Bevel hint inset.
        page.rect(x + 4.0, y + 4.0, w - 8.0, h - 8.0, 0.4);
        page.text(x + w * 0.25, y + h * 0.5, 8.0, "MIRROR");
    }
}

pub struct Placeholder;

impl Template for Placeholder {
    fn name(&self) -> &'static str {
        "TEMPLATE NOT AVAILABLE"
    }

    fn draw(&self, page: &mut Page, item: &ScopeItem) {
        draw_heading(page, self.name(), item);
        page.text(
            MARGIN,
            DRAWING_AREA_TOP - 40.0,
            10.0,
            format!(
                "No drawing template for configuration '{}'.",
                item.configuration
            ),
        );
        page.text(
            MARGIN,
            DRAWING_AREA_TOP - 56.0,
            10.0,
            "Refer to the bid document for scope and pricing.",
        );
    }
}
