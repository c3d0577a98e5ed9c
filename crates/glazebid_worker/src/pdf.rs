//! Narrow seam over the PDF library.
//!
//! Pdfium handles the three things the worker needs from a PDF library:
//! page text for classification and extraction, page rasters for the
//! render queue, and writing the generated output documents. Everything
//! else in the worker talks to these traits, and tests substitute
//! [`FakePdfEngine`] so no native library is required.

use std::path::Path;

use image::DynamicImage;
use thiserror::Error;

use crate::generators::drawing::{Document, DrawOp};

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("pdf library error: {0}")]
    Library(String),

    #[error("page {page} out of range (total: {total})")]
    PageOutOfRange { page: u32, total: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An open PDF document.
pub trait PdfDoc: Send {
    fn page_count(&self) -> u32;

    /// Full text of a page.
    fn page_text(&self, page: u32) -> Result<String, PdfError>;

    /// Page media box in points.
    fn page_size(&self, page: u32) -> Result<(f32, f32), PdfError>;

    /// Rasterize a page at the given DPI. Callers clamp the DPI first.
    fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage, PdfError>;
}

/// Process-wide PDF engine.
pub trait PdfEngine: Send + Sync {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn PdfDoc + 'a>, PdfError>;

    /// Materialize a drawn [`Document`] as a PDF file.
    fn write_document(&self, document: &Document, path: &Path) -> Result<(), PdfError>;
}

// ============================================================================
// Pdfium implementation
// ============================================================================

pub use pdfium_engine::PdfiumEngine;

mod pdfium_engine {
    use super::*;
    use pdfium_render::prelude::*;

    pub struct PdfiumEngine {
        pdfium: Pdfium,
    }

    impl PdfiumEngine {
        /// Bind the pdfium library, preferring one shipped next to the
        /// binary over the system copy.
        pub fn new() -> Result<Self, PdfError> {
            let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./",
            ))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| PdfError::Library(e.to_string()))?;
            Ok(PdfiumEngine {
                pdfium: Pdfium::new(bindings),
            })
        }
    }

    struct PdfiumDoc<'a> {
        document: PdfDocument<'a>,
    }

    impl PdfiumDoc<'_> {
        fn check_page(&self, page: u32) -> Result<u16, PdfError> {
            let total = self.page_count();
            if page >= total {
                return Err(PdfError::PageOutOfRange { page, total });
            }
            Ok(page as u16)
        }
    }

    impl PdfDoc for PdfiumDoc<'_> {
        fn page_count(&self) -> u32 {
            self.document.pages().len() as u32
        }

        fn page_text(&self, page: u32) -> Result<String, PdfError> {
            let index = self.check_page(page)?;
            let pages = self.document.pages();
            let page = pages
                .get(index)
                .map_err(|e| PdfError::Library(e.to_string()))?;
            let text = page
                .text()
                .map_err(|e| PdfError::Library(e.to_string()))?;
            Ok(text.all())
        }

        fn page_size(&self, page: u32) -> Result<(f32, f32), PdfError> {
            let index = self.check_page(page)?;
            let pages = self.document.pages();
            let page = pages
                .get(index)
                .map_err(|e| PdfError::Library(e.to_string()))?;
            Ok((page.width().value, page.height().value))
        }

        fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage, PdfError> {
            let index = self.check_page(page)?;
            let pages = self.document.pages();
            let page = pages
                .get(index)
                .map_err(|e| PdfError::Library(e.to_string()))?;
            let config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| PdfError::Library(e.to_string()))?;
            Ok(bitmap.as_image())
        }
    }

    impl PdfEngine for PdfiumEngine {
        fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn PdfDoc + 'a>, PdfError> {
            let document = self
                .pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| PdfError::Library(e.to_string()))?;
            Ok(Box::new(PdfiumDoc { document }))
        }

        fn write_document(&self, document: &Document, path: &Path) -> Result<(), PdfError> {
            let lib = |e: PdfiumError| PdfError::Library(e.to_string());

            let mut pdf = self.pdfium.create_new_pdf().map_err(lib)?;
            let font = pdf.fonts_mut().helvetica();
            let font_bold = pdf.fonts_mut().helvetica_bold();

            let ink = PdfColor::new(45, 55, 72, 255);
            let shade = PdfColor::new(226, 232, 240, 255);

            for sheet in document.pages() {
                let mut page = pdf
                    .pages_mut()
                    .create_page_at_end(PdfPagePaperSize::Custom(
                        PdfPoints::new(sheet.width_pt),
                        PdfPoints::new(sheet.height_pt),
                    ))
                    .map_err(lib)?;
                let objects = page.objects_mut();

                for op in &sheet.ops {
                    match op {
                        DrawOp::Text {
                            x,
                            y,
                            size,
                            bold,
                            text,
                        } => {
                            objects
                                .create_text_object(
                                    PdfPoints::new(*x),
                                    PdfPoints::new(*y),
                                    text,
                                    if *bold { font_bold } else { font },
                                    PdfPoints::new(*size),
                                )
                                .map_err(lib)?;
                        }
                        DrawOp::Line { x1, y1, x2, y2, width } => {
                            objects
                                .create_path_object_line(
                                    PdfPoints::new(*x1),
                                    PdfPoints::new(*y1),
                                    PdfPoints::new(*x2),
                                    PdfPoints::new(*y2),
                                    ink,
                                    PdfPoints::new(*width),
                                )
                                .map_err(lib)?;
                        }
                        DrawOp::Rect {
                            x,
                            y,
                            w,
                            h,
                            stroke_width,
                            filled,
                        } => {
                            objects
                                .create_path_object_rect(
                                    PdfRect::new(
                                        PdfPoints::new(*y),
                                        PdfPoints::new(*x),
                                        PdfPoints::new(*y + *h),
                                        PdfPoints::new(*x + *w),
                                    ),
                                    Some(ink),
                                    Some(PdfPoints::new(*stroke_width)),
                                    filled.then_some(shade),
                                )
                                .map_err(lib)?;
                        }
                    }
                }
            }

            pdf.save_to_file(path).map_err(lib)?;
            Ok(())
        }
    }
}

// ============================================================================
// Test engine
// ============================================================================

/// A page served by the fake engine.
#[derive(Debug, Clone)]
pub struct FakePage {
    pub text: String,
    pub width_pt: f32,
    pub height_pt: f32,
}

impl FakePage {
    pub fn letter(text: &str) -> Self {
        FakePage {
            text: text.to_string(),
            width_pt: 612.0,
            height_pt: 792.0,
        }
    }
}

/// In-memory engine for tests: serves configured page text and sizes,
/// renders solid rasters, and writes documents as a plain-text op dump.
#[derive(Debug, Clone, Default)]
pub struct FakePdfEngine {
    pub pages: Vec<FakePage>,
}

impl FakePdfEngine {
    pub fn new(pages: Vec<FakePage>) -> Self {
        FakePdfEngine { pages }
    }
}

struct FakeDoc {
    pages: Vec<FakePage>,
}

impl FakeDoc {
    fn page(&self, page: u32) -> Result<&FakePage, PdfError> {
        self.pages
            .get(page as usize)
            .ok_or(PdfError::PageOutOfRange {
                page,
                total: self.pages.len() as u32,
            })
    }
}

impl PdfDoc for FakeDoc {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_text(&self, page: u32) -> Result<String, PdfError> {
        Ok(self.page(page)?.text.clone())
    }

    fn page_size(&self, page: u32) -> Result<(f32, f32), PdfError> {
        let p = self.page(page)?;
        Ok((p.width_pt, p.height_pt))
    }

    fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage, PdfError> {
        let p = self.page(page)?;
        let w = (p.width_pt / 72.0 * dpi as f32).round().max(1.0) as u32;
        let h = (p.height_pt / 72.0 * dpi as f32).round().max(1.0) as u32;
        Ok(DynamicImage::new_rgb8(w, h))
    }
}

impl PdfEngine for FakePdfEngine {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn PdfDoc + 'a>, PdfError> {
        if !path.exists() {
            return Err(PdfError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )));
        }
        Ok(Box::new(FakeDoc {
            pages: self.pages.clone(),
        }))
    }

    fn write_document(&self, document: &Document, path: &Path) -> Result<(), PdfError> {
        let mut dump = String::new();
        for (i, page) in document.pages().iter().enumerate() {
            dump.push_str(&format!("page {} ({} ops)\n", i, page.ops.len()));
            for text in page.text_content() {
                dump.push_str(text);
                dump.push('\n');
            }
        }
        std::fs::write(path, dump)?;
        Ok(())
    }
}
