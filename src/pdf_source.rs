use crate::error::ProcessingError;
use crate::layout::{FragmentBounds, LayoutLine, PageLayout, TextBlock, TextFragment};
use log::{debug, error, info, warn};
use pdfium_render::prelude::*;
use std::path::PathBuf;

/// Directory searched first for the pdfium shared library
pub const PDFIUM_DIR_ENV: &str = "FISCAL_EXTRACT_PDFIUM_DIR";

/// Horizontal gap (points) above which two fragments on a line are
/// separated by a space
const WORD_GAP: f32 = 1.0;

/// Everything the extractors need from one PDF
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedDocument {
    /// Structured text per page, for the record scan
    pub pages: Vec<PageLayout>,
    /// Plain text per page, for the certificate reader
    pub raw_text: Vec<String>,
}

impl LoadedDocument {
    /// Raw text of the first `pages` pages joined by newlines
    pub fn leading_text(&self, pages: usize) -> String {
        self.raw_text
            .iter()
            .take(pages)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Turns PDF bytes into page layouts and raw text
///
/// A document that cannot be opened is a `PdfLoadError`; a page that cannot
/// be read is logged and left empty.
pub trait DocumentLoader {
    fn load(&self, bytes: &[u8]) -> Result<LoadedDocument, ProcessingError>;
}

/// Loader backed by the pdfium library
pub struct PdfiumLoader {
    pdfium: Pdfium,
}

impl PdfiumLoader {
    pub fn new() -> Result<Self, ProcessingError> {
        Ok(Self {
            pdfium: bind_pdfium()?,
        })
    }

    /// Layout and raw text of one page
    ///
    /// Process:
    /// 1. Read pdfium's text segments with their bounds
    /// 2. Start a new layout line whenever a segment leaves the vertical band
    ///    of the previous one
    /// 3. Insert a space where two fragments on a line do not touch
    fn read_page(&self, page: &PdfPage, page_index: usize) -> Result<(PageLayout, String), ProcessingError> {
        let text = page.text().map_err(|e| ProcessingError::TextExtractionError {
            page: page_index,
            error: format!("pdfium extraction failed: {}", e),
        })?;

        let mut lines: Vec<LayoutLine> = Vec::new();
        let mut previous: Option<FragmentBounds> = None;

        // Segments arrive in content-stream order; group them by vertical band
        for segment in text.segments().iter() {
            let rect = segment.bounds();
            let bounds = FragmentBounds {
                left: rect.left().value,
                bottom: rect.bottom().value,
                right: rect.right().value,
                top: rect.top().value,
            };
            let mut content = segment.text();

            // Same band: join, spacing apart fragments that do not touch
            match previous {
                Some(prev) if same_line(&prev, &bounds) => {
                    if bounds.left - prev.right > WORD_GAP && !content.starts_with(' ') {
                        content.insert(0, ' ');
                    }
                }
                _ => lines.push(LayoutLine::default()),
            }

            if let Some(line) = lines.last_mut() {
                line.fragments.push(TextFragment::positioned(content, bounds));
            }
            previous = Some(bounds);
        }

        debug!("Page {}: {} layout lines", page_index + 1, lines.len());
        Ok((PageLayout { blocks: vec![TextBlock { lines }] }, text.all()))
    }
}

impl DocumentLoader for PdfiumLoader {
    fn load(&self, bytes: &[u8]) -> Result<LoadedDocument, ProcessingError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| ProcessingError::PdfLoadError(format!("pdfium could not open document: {}", e)))?;

        let mut loaded = LoadedDocument::default();
        // A bad page is logged and left empty; the rest of the document is kept
        for (page_index, page) in document.pages().iter().enumerate() {
            match self.read_page(&page, page_index) {
                Ok((layout, raw)) => {
                    loaded.pages.push(layout);
                    loaded.raw_text.push(raw);
                }
                Err(e) => {
                    error!("{}", e);
                    loaded.pages.push(PageLayout::default());
                    loaded.raw_text.push(String::new());
                }
            }
        }

        info!("Loaded {} pages with pdfium", loaded.pages.len());
        Ok(loaded)
    }
}

/// Pure-Rust fallback when pdfium is not installed
///
/// lopdf gives no positions; each text line it reports becomes a
/// one-fragment layout line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfLoader;

impl DocumentLoader for LopdfLoader {
    fn load(&self, bytes: &[u8]) -> Result<LoadedDocument, ProcessingError> {
        let document = lopdf::Document::load_mem(bytes)
            .map_err(|e| ProcessingError::PdfLoadError(format!("lopdf could not open document: {}", e)))?;

        let mut loaded = LoadedDocument::default();
        for (page_index, page_number) in document.get_pages().keys().enumerate() {
            let raw = match document.extract_text(&[*page_number]) {
                Ok(text) => text,
                Err(e) => {
                    let err = ProcessingError::TextExtractionError {
                        page: page_index,
                        error: format!("lopdf extraction failed: {}", e),
                    };
                    error!("{}", err);
                    String::new()
                }
            };
            loaded.pages.push(PageLayout::from_lines(raw.lines()));
            loaded.raw_text.push(raw);
        }

        info!("Loaded {} pages with lopdf", loaded.pages.len());
        Ok(loaded)
    }
}

/// pdfium when the library can be bound, lopdf otherwise
pub fn default_loader() -> Box<dyn DocumentLoader> {
    match PdfiumLoader::new() {
        Ok(loader) => Box::new(loader),
        Err(e) => {
            warn!("{}; falling back to lopdf text extraction", e);
            Box::new(LopdfLoader)
        }
    }
}

fn same_line(previous: &FragmentBounds, current: &FragmentBounds) -> bool {
    let tolerance = previous.height().max(current.height()) / 2.0;
    (previous.vertical_center() - current.vertical_center()).abs() <= tolerance
}

fn bind_pdfium() -> Result<Pdfium, ProcessingError> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(dir) = std::env::var(PDFIUM_DIR_ENV) {
        candidates.push(Pdfium::pdfium_platform_library_name_at_path(&dir));
    }
    candidates.push(Pdfium::pdfium_platform_library_name_at_path("./"));
    candidates.push(Pdfium::pdfium_platform_library_name_at_path("../"));

    for path in candidates {
        match Pdfium::bind_to_library(&path) {
            Ok(bindings) => {
                info!("Bound pdfium from {}", path.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(_) => debug!("No pdfium at {}", path.display()),
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| ProcessingError::SystemError(format!("Failed to initialize pdfium: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(left: f32, bottom: f32, right: f32, top: f32) -> FragmentBounds {
        FragmentBounds {
            left,
            bottom,
            right,
            top,
        }
    }

    #[test]
    fn test_same_line_tolerance() {
        let a = bounds(10.0, 700.0, 50.0, 710.0);
        assert!(same_line(&a, &bounds(60.0, 701.0, 90.0, 711.0)));
        assert!(!same_line(&a, &bounds(10.0, 685.0, 50.0, 695.0)));
    }

    #[test]
    fn test_leading_text_limits_pages() {
        let doc = LoadedDocument {
            pages: vec![PageLayout::default(); 3],
            raw_text: vec!["one".to_string(), "two".to_string(), "three".to_string()],
        };
        assert_eq!(doc.leading_text(2), "one\ntwo");
        assert_eq!(doc.leading_text(10), "one\ntwo\nthree");
    }

    #[test]
    fn test_lopdf_rejects_garbage() {
        let err = LopdfLoader.load(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ProcessingError::PdfLoadError(_)));
    }
}
