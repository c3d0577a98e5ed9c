//! Bid document layout: cover block, scope of work, pricing table,
//! assumptions and exclusions.
//!
//! Pages are drawn off-document and pushed when full, so the layout is a
//! simple y-cursor walk.

use glazebid_protocol::dimension::format_inches;
use glazebid_protocol::{LineItem, ScopeItem, Ssot};

use super::drawing::{Document, Page, MARGIN, PAGE_HEIGHT, PAGE_WIDTH};

const BODY_SIZE: f32 = 9.0;
const HEADING_SIZE: f32 = 12.0;
const LINE_HEIGHT: f32 = 14.0;

/// Column x-positions of the pricing table.
const COL_DESC: f32 = MARGIN;
const COL_DIMS: f32 = 300.0;
const COL_QTY: f32 = 400.0;
const COL_UNIT: f32 = 440.0;
const COL_TOTAL: f32 = 510.0;

/// A page being written plus its y cursor; breaking pushes the full
/// page into the document and starts a fresh one.
struct Writer {
    page: Page,
    y: f32,
}

impl Writer {
    fn new() -> Self {
        Writer {
            page: Page::letter(),
            y: PAGE_HEIGHT - MARGIN - 20.0,
        }
    }

    fn advance(&mut self, by: f32) {
        self.y -= by;
    }

    fn break_if_below(&mut self, doc: &mut Document, threshold: f32) {
        if self.y < threshold {
            let full = std::mem::replace(&mut self.page, Page::letter());
            doc.push_page(full);
            self.y = PAGE_HEIGHT - MARGIN - 20.0;
        }
    }

    fn finish(self, doc: &mut Document) {
        doc.push_page(self.page);
    }

    fn heading(&mut self, title: &str) {
        self.advance(LINE_HEIGHT);
        self.page.text_bold(MARGIN, self.y, HEADING_SIZE, title);
        self.advance(6.0);
        self.page.line(MARGIN, self.y, PAGE_WIDTH - MARGIN, self.y, 0.8);
        self.advance(LINE_HEIGHT);
    }

    fn bullet_list(&mut self, doc: &mut Document, entries: &[String]) {
        for entry in entries {
            self.break_if_below(doc, MARGIN + 40.0);
            self.page
                .text(MARGIN + 10.0, self.y, BODY_SIZE, format!("- {}", entry));
            self.advance(LINE_HEIGHT);
        }
    }
}

fn item_dims(ssot: &Ssot, line: &LineItem) -> String {
    let item: Option<&ScopeItem> = ssot.items.iter().find(|i| i.item_id == line.item_id);
    match item {
        Some(item) => format!(
            "{} x {}",
            format_inches(item.dimensions.width.value),
            format_inches(item.dimensions.height.value)
        ),
        None => String::new(),
    }
}

fn money(v: f64) -> String {
    format!("${:.2}", v)
}

/// Lay out the bid document from a validated SSOT.
pub fn build_bid_document(ssot: &Ssot, version: u32, date: &str) -> Document {
    let mut doc = Document::new();
    let project = ssot.metadata.project_name.as_deref().unwrap_or("Project");
    let client = ssot.metadata.client_name.as_deref().unwrap_or("Client");

    // Cover block.
    {
        let page = doc.add_page();
        let left = PAGE_WIDTH / 2.0 - 90.0;
        page.text_bold(left, PAGE_HEIGHT - 220.0, 26.0, "BID PROPOSAL");
        page.line(
            MARGIN,
            PAGE_HEIGHT - 240.0,
            PAGE_WIDTH - MARGIN,
            PAGE_HEIGHT - 240.0,
            1.0,
        );
        page.text(left, PAGE_HEIGHT - 280.0, 12.0, format!("Project: {}", project));
        page.text(left, PAGE_HEIGHT - 300.0, 12.0, format!("Client: {}", client));
        page.text(left, PAGE_HEIGHT - 320.0, 12.0, format!("Date: {}", date));
        page.text(left, PAGE_HEIGHT - 340.0, 12.0, format!("Revision: v{}", version));
    }

    let empty = Vec::new();
    let line_items = ssot
        .pricing
        .as_ref()
        .map(|p| &p.line_items)
        .unwrap_or(&empty);

    // Scope of work + pricing table.
    let mut writer = Writer::new();
    writer.heading("SCOPE OF WORK & PRICING");

    writer
        .page
        .rect_filled(MARGIN, writer.y - 4.0, PAGE_WIDTH - 2.0 * MARGIN, LINE_HEIGHT);
    writer.page.text_bold(COL_DESC + 2.0, writer.y, BODY_SIZE, "Description");
    writer.page.text_bold(COL_DIMS, writer.y, BODY_SIZE, "Dimensions");
    writer.page.text_bold(COL_QTY, writer.y, BODY_SIZE, "Qty");
    writer.page.text_bold(COL_UNIT, writer.y, BODY_SIZE, "Unit");
    writer.page.text_bold(COL_TOTAL, writer.y, BODY_SIZE, "Total");
    writer.advance(LINE_HEIGHT);

    for line in line_items {
        writer.break_if_below(&mut doc, MARGIN + 60.0);
        writer.page.text(COL_DESC + 2.0, writer.y, BODY_SIZE, line.description.clone());
        writer.page.text(COL_DIMS, writer.y, BODY_SIZE, item_dims(ssot, line));
        writer.page.text(COL_QTY, writer.y, BODY_SIZE, line.quantity.to_string());
        writer.page.text(COL_UNIT, writer.y, BODY_SIZE, money(line.unit_price));
        writer.page.text(COL_TOTAL, writer.y, BODY_SIZE, money(line.total_price));
        writer.advance(LINE_HEIGHT);
    }

    if let Some(pricing) = &ssot.pricing {
        writer.break_if_below(&mut doc, MARGIN + 70.0);
        writer.advance(6.0);
        writer.page.line(
            COL_UNIT - 10.0,
            writer.y + 10.0,
            PAGE_WIDTH - MARGIN,
            writer.y + 10.0,
            0.8,
        );
        writer.page.text(COL_UNIT, writer.y, BODY_SIZE, "Subtotal");
        writer.page.text(COL_TOTAL, writer.y, BODY_SIZE, money(pricing.subtotal));
        writer.advance(LINE_HEIGHT);
        writer.page.text(COL_UNIT, writer.y, BODY_SIZE, "Tax");
        writer.page.text(COL_TOTAL, writer.y, BODY_SIZE, money(pricing.tax));
        writer.advance(LINE_HEIGHT);
        writer.page.text_bold(COL_UNIT, writer.y, BODY_SIZE, "Total");
        writer.page.text_bold(COL_TOTAL, writer.y, BODY_SIZE, money(pricing.total));
        writer.advance(LINE_HEIGHT);
    }
    writer.finish(&mut doc);

    // Assumptions & exclusions.
    if !ssot.assumptions.is_empty() || !ssot.exclusions.is_empty() {
        let mut writer = Writer::new();
        if !ssot.assumptions.is_empty() {
            writer.heading("ASSUMPTIONS");
            writer.bullet_list(&mut doc, &ssot.assumptions);
        }
        if !ssot.exclusions.is_empty() {
            writer.heading("EXCLUSIONS");
            writer.bullet_list(&mut doc, &ssot.exclusions);
        }
        writer.finish(&mut doc);
    }

    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use glazebid_protocol::{Breakdown, DimValue, Pricing};

    fn priced_ssot() -> Ssot {
        let mut ssot = Ssot::default();
        ssot.metadata.project_name = Some("Tower A".to_string());
        ssot.metadata.client_name = Some("Acme Development".to_string());

        let mut item: ScopeItem = serde_json::from_str(
            r#"{"itemId":"i1","category":"SHOWER_ENCLOSURE","configuration":"inline-panel"}"#,
        )
        .unwrap();
        item.dimensions.width = DimValue::from_callout(36.0);
        item.dimensions.height = DimValue::from_callout(72.0);
        ssot.items.push(item);

        ssot.assumptions = vec!["Tempered glass".to_string()];
        ssot.exclusions = vec!["Demolition".to_string()];
        ssot.pricing = Some(Pricing {
            line_items: vec![LineItem {
                item_id: "i1".to_string(),
                description: "Shower Enclosure (Inline Panel)".to_string(),
                unit_price: 810.0,
                quantity: 1,
                total_price: 810.0,
                breakdown: Breakdown::default(),
                manual_override: false,
                override_reason: None,
            }],
            subtotal: 810.0,
            tax: 0.0,
            total: 810.0,
            ..Default::default()
        });
        ssot
    }

    #[test]
    fn bid_has_cover_table_and_notes_pages() {
        let doc = build_bid_document(&priced_ssot(), 2, "2024-03-01");
        assert_eq!(doc.pages().len(), 3);

        let cover = &doc.pages()[0];
        assert!(cover.contains_text("BID PROPOSAL"));
        assert!(cover.contains_text("Project: Tower A"));
        assert!(cover.contains_text("Revision: v2"));

        let body = &doc.pages()[1];
        assert!(body.contains_text("Shower Enclosure (Inline Panel)"));
        assert!(body.contains_text("3'-0\" x 6'-0\""));
        assert!(body.contains_text("$810.00"));
        assert!(body.contains_text("Subtotal"));

        let notes = &doc.pages()[2];
        assert!(notes.contains_text("ASSUMPTIONS"));
        assert!(notes.contains_text("- Tempered glass"));
        assert!(notes.contains_text("EXCLUSIONS"));
    }

    #[test]
    fn empty_pricing_still_produces_a_document() {
        let doc = build_bid_document(&Ssot::default(), 1, "2024-03-01");
        assert!(!doc.is_empty());
        assert!(doc.pages()[0].contains_text("BID PROPOSAL"));
    }

    #[test]
    fn long_line_item_lists_paginate() {
        let mut ssot = priced_ssot();
        let template = ssot.pricing.as_ref().unwrap().line_items[0].clone();
        let pricing = ssot.pricing.as_mut().unwrap();
        for i in 0..80 {
            let mut line = template.clone();
            line.item_id = format!("i{}", i + 2);
            pricing.line_items.push(line);
        }
        let doc = build_bid_document(&ssot, 1, "2024-03-01");
        // Cover + at least two table pages + notes.
        assert!(doc.pages().len() >= 4);
    }

    #[test]
    fn missing_dimension_prints_tbv_in_table() {
        let mut ssot = priced_ssot();
        ssot.items[0].dimensions.width = DimValue::field_verify();
        let doc = build_bid_document(&ssot, 1, "2024-03-01");
        assert!(doc.pages()[1].contains_text("TBV x 6'-0\""));
    }
}
