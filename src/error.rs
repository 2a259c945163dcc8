use thiserror::Error;

/// Error types for the fiscal document extraction pipeline
///
/// Per-record problems never reach this type: malformed records degrade to
/// raw fallbacks inside the extractors. What is left are document-level and
/// configuration-level failures.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("PDF loading failed: {0}")]
    PdfLoadError(String),

    #[error("Text extraction failed on page {page}: {error}")]
    TextExtractionError { page: usize, error: String },

    #[error("Name lookup failed: {0}")]
    LookupError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("No entities selected")]
    NoEntitiesSelected,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("System error: {0}")]
    SystemError(String),
}
