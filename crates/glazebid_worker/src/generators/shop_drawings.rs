//! Shop drawings: one sheet per scope item, rendered by the template
//! matching its configuration.

use glazebid_protocol::Ssot;

use super::drawing::{draw_revision_box, draw_title_block, Document};
use super::templates::template_for;

/// Build the shop-drawing set. Items render in SSOT order, one sheet
/// each; an empty item list yields an empty document and the caller
/// skips the upload.
pub fn build_shop_drawings(ssot: &Ssot, date: &str) -> Document {
    let mut doc = Document::new();
    let project = ssot.metadata.project_name.as_deref().unwrap_or("Project");
    let client = ssot.metadata.client_name.as_deref().unwrap_or("Client");

    for (index, item) in ssot.items.iter().enumerate() {
        let page = doc.add_page();
        template_for(&item.configuration).draw(page, item);
        draw_title_block(
            page,
            &format!("SD-{:02}", index + 1),
            project,
            client,
            date,
        );
        draw_revision_box(page, "0", date);
    }

    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use glazebid_protocol::{DimValue, ScopeItem};

    fn ssot_with_items(configurations: &[&str]) -> Ssot {
        let mut ssot = Ssot::default();
        ssot.metadata.project_name = Some("Tower A".to_string());
        for (i, configuration) in configurations.iter().enumerate() {
            let mut item: ScopeItem = serde_json::from_str(&format!(
                r#"{{"itemId":"i{}","category":"SHOWER_ENCLOSURE","configuration":"{}"}}"#,
                i, configuration
            ))
            .unwrap();
            item.dimensions.width = DimValue::from_callout(36.0);
            item.dimensions.height = DimValue::from_callout(72.0);
            ssot.items.push(item);
        }
        ssot
    }

    #[test]
    fn one_sheet_per_item_with_title_blocks() {
        let doc = build_shop_drawings(&ssot_with_items(&["inline-panel", "neo-angle"]), "2024-03-01");
        assert_eq!(doc.pages().len(), 2);
        assert!(doc.pages()[0].contains_text("SD-01"));
        assert!(doc.pages()[0].contains_text("INLINE PANEL / DOOR"));
        assert!(doc.pages()[1].contains_text("SD-02"));
        assert!(doc.pages()[1].contains_text("TEMPLATE NOT AVAILABLE"));
        assert!(doc.pages()[1].contains_text("Project: Tower A"));
    }

    #[test]
    fn no_items_means_empty_set() {
        let doc = build_shop_drawings(&Ssot::default(), "2024-03-01");
        assert!(doc.is_empty());
    }
}
