use crate::certificate::{extract_certificate, sort_by_expiry, CertificateEntry};
use crate::config::PipelineConfig;
use crate::error::ProcessingError;
use crate::extractor::RecordExtractor;
use crate::layout::LineExtractor;
use crate::matcher::MunicipalityMatcher;
use crate::pdf_source::{DocumentLoader, LoadedDocument};
use crate::records::Record;
use crate::resolver::NameResolver;
use chrono::NaiveDate;
use indexmap::IndexMap;
use log::{error, info, warn};
use serde::Serialize;

/// One uploaded file
#[derive(Debug, Clone)]
pub struct InputDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl InputDocument {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// A document abandoned because it could not be read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentFailure {
    pub filename: String,
    pub reason: String,
}

/// Records grouped by entity, plus what was left out
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// One bucket per selected entity, in the caller's order; records in
    /// upload order
    pub buckets: IndexMap<String, Vec<Record>>,
    /// Files that matched no selected entity
    pub unmatched: Vec<String>,
    pub failures: Vec<DocumentFailure>,
}

impl BatchReport {
    pub fn bucket(&self, entity: &str) -> Option<&[Record]> {
        self.buckets.get(entity).map(Vec::as_slice)
    }

    pub fn record_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CertificateReport {
    /// Sorted: unparseable validity first, then soonest to expire
    pub entries: Vec<CertificateEntry>,
    pub failures: Vec<DocumentFailure>,
}

/// Orchestrates loading, entity assignment and extraction for a batch
///
/// Documents are processed one at a time in upload order. A document that
/// fails to load is recorded and skipped; the batch carries on.
pub struct BatchProcessor {
    config: PipelineConfig,
    loader: Box<dyn DocumentLoader>,
    resolver: Box<dyn NameResolver>,
    matcher: MunicipalityMatcher,
    extractor: RecordExtractor,
}

impl BatchProcessor {
    pub fn new(config: PipelineConfig, loader: Box<dyn DocumentLoader>, resolver: Box<dyn NameResolver>) -> Self {
        let matcher = MunicipalityMatcher::new(config.similarity_threshold);
        let extractor = RecordExtractor::new(&config);
        Self {
            config,
            loader,
            resolver,
            matcher,
            extractor,
        }
    }

    /// Extract tax-restriction records and bucket them by entity
    ///
    /// Process:
    /// 1. Refuse to start without at least one selected entity
    /// 2. Assign each file by name to the first matching entity
    /// 3. Load matched files and scan their lines for records
    /// 4. Append records to the entity's bucket
    pub fn process_restriction_reports<S: AsRef<str>>(
        &self,
        documents: &[InputDocument],
        entities: &[S],
    ) -> Result<BatchReport, ProcessingError> {
        if entities.is_empty() {
            return Err(ProcessingError::NoEntitiesSelected);
        }

        // Every selected entity gets a bucket, even if nothing lands in it
        let mut report = BatchReport::default();
        for entity in entities {
            report.buckets.entry(entity.as_ref().to_string()).or_default();
        }

        for document in documents {
            // Assignment goes by filename, before the PDF is opened
            let Some(entity) = self.matcher.assign(&document.filename, entities) else {
                info!("{} matches no selected entity, skipping", document.filename);
                report.unmatched.push(document.filename.clone());
                continue;
            };

            // An unreadable document is recorded and the batch moves on
            let loaded = match self.load(document) {
                Ok(loaded) => loaded,
                Err(failure) => {
                    report.failures.push(failure);
                    continue;
                }
            };

            // Scan the whole document as one line sequence
            let lines = LineExtractor::extract_document_lines(&loaded.pages);
            let records = self
                .extractor
                .extract(&lines, &document.filename, self.resolver.as_ref());
            info!("{} -> {}: {} records", document.filename, entity, records.len());

            report
                .buckets
                .entry(entity.to_string())
                .or_default()
                .extend(records);
        }

        info!(
            "Batch complete: {} records, {} unmatched, {} failed",
            report.record_count(),
            report.unmatched.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Read every certificate in the batch
    ///
    /// Only the first `certificate_pages` pages are looked at. `today` fixes
    /// the reference date for the days-until-expiry column.
    pub fn process_certificates(&self, documents: &[InputDocument], today: NaiveDate) -> CertificateReport {
        let mut report = CertificateReport::default();

        for document in documents {
            let loaded = match self.load(document) {
                Ok(loaded) => loaded,
                Err(failure) => {
                    report.failures.push(failure);
                    continue;
                }
            };

            let info = extract_certificate(&loaded.leading_text(self.config.certificate_pages));
            if info.validity_date.is_empty() {
                warn!("{}: no validity date found", document.filename);
            }
            report
                .entries
                .push(CertificateEntry::new(info, document.filename.as_str(), today));
        }

        // Unknown validity first, then soonest to expire
        sort_by_expiry(&mut report.entries);
        report
    }

    fn load(&self, document: &InputDocument) -> Result<LoadedDocument, DocumentFailure> {
        self.loader.load(&document.bytes).map_err(|e| {
            error!("Abandoning {}: {}", document.filename, e);
            DocumentFailure {
                filename: document.filename.clone(),
                reason: e.to_string(),
            }
        })
    }
}
