//! Output document generators.
//!
//! Generators build a [`drawing::Document`], a plain list of text, line
//! and rect operations in PDF points, which the PDF engine materializes
//! to a file. Keeping layout pure lets every template and both documents
//! be exercised in tests without the native PDF library.

pub mod bid_pdf;
pub mod drawing;
pub mod shop_drawings;
pub mod templates;
