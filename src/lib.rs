//! Record extraction for Brazilian fiscal PDF reports
//!
//! Tax-restriction reports are turned into typed debtor, penalty-notice,
//! omission and fiscal-process records, bucketed by the municipality each
//! file belongs to. Tax-clearance certificates yield their holder, tax ID and
//! validity date.

pub mod certificate;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fields;
pub mod invoice;
pub mod layout;
pub mod matcher;
pub mod normalizer;
pub mod pdf_source;
pub mod pipeline;
pub mod records;
pub mod resolver;

pub use certificate::{extract_certificate, CertificateEntry, CertificateInfo};
pub use config::PipelineConfig;
pub use error::ProcessingError;
pub use extractor::{ExtractionContext, RecordExtractor};
pub use layout::{LineExtractor, PageLayout};
pub use matcher::{matches, MunicipalityMatcher};
pub use normalizer::{canonicalize_place, normalize, tokenize_place};
pub use pdf_source::{default_loader, DocumentLoader, LoadedDocument};
pub use pipeline::{BatchProcessor, BatchReport, CertificateReport, InputDocument};
pub use records::{Record, RecordData, RecordKind};
pub use resolver::{build_resolver, NameResolver};

#[cfg(feature = "python")]
mod python {
    use crate::config::PipelineConfig;
    use crate::error::ProcessingError;
    use crate::pdf_source::default_loader;
    use crate::pipeline::{BatchProcessor, InputDocument};
    use crate::records::Record;
    use crate::resolver::build_resolver;
    use pyo3::exceptions::PyRuntimeError;
    use pyo3::prelude::*;
    use pyo3::types::{PyDict, PyList};

    /// Python module initialization
    ///
    /// Entry point Maturin uses to create the extension.
    #[pymodule]
    fn fiscal_extract(m: &Bound<'_, PyModule>) -> PyResult<()> {
        let _ = env_logger::try_init();

        m.add_function(wrap_pyfunction!(process_reports, m)?)?;
        m.add_function(wrap_pyfunction!(process_certificates, m)?)?;
        m.add("__version__", env!("CARGO_PKG_VERSION"))?;

        Ok(())
    }

    /// Bucket restriction-report records by municipality
    ///
    /// `files` is a list of `(filename, bytes)`. Returns a dict mapping each
    /// entity to a list of record dicts.
    #[pyfunction]
    #[pyo3(signature = (files, entities, lookup = false))]
    fn process_reports(
        py: Python<'_>,
        files: Vec<(String, Vec<u8>)>,
        entities: Vec<String>,
        lookup: bool,
    ) -> PyResult<PyObject> {
        let processor = build_processor(lookup)?;
        let documents = into_documents(files);
        let report = processor
            .process_restriction_reports(&documents, &entities)
            .map_err(to_py_err)?;

        let result = PyDict::new(py);
        for (entity, records) in &report.buckets {
            let list = PyList::empty(py);
            for record in records {
                list.append(record_to_dict(py, record)?)?;
            }
            result.set_item(entity, list)?;
        }
        result.set_item("_unmatched", report.unmatched.clone())?;
        Ok(result.into_any().unbind())
    }

    /// Read certificates; list of dicts sorted by days until expiry
    #[pyfunction]
    fn process_certificates(py: Python<'_>, files: Vec<(String, Vec<u8>)>) -> PyResult<PyObject> {
        let processor = build_processor(false)?;
        let today = chrono::Local::now().date_naive();
        let report = processor.process_certificates(&into_documents(files), today);

        let list = PyList::empty(py);
        for entry in &report.entries {
            let dict = PyDict::new(py);
            dict.set_item("cnpj", &entry.info.tax_id)?;
            dict.set_item("nome", &entry.info.holder_name)?;
            dict.set_item("validade", &entry.info.validity_date)?;
            dict.set_item("dias_restantes", entry.days_until_expiry)?;
            dict.set_item("src", &entry.source)?;
            list.append(dict)?;
        }
        Ok(list.into_any().unbind())
    }

    fn build_processor(lookup: bool) -> PyResult<BatchProcessor> {
        let mut config = PipelineConfig::default();
        config.apply_env_overrides().map_err(to_py_err)?;
        config.lookup.enabled = lookup;
        let resolver = build_resolver(&config.lookup).map_err(to_py_err)?;
        Ok(BatchProcessor::new(config, default_loader(), resolver))
    }

    fn into_documents(files: Vec<(String, Vec<u8>)>) -> Vec<InputDocument> {
        files
            .into_iter()
            .map(|(filename, bytes)| InputDocument::new(filename, bytes))
            .collect()
    }

    fn record_to_dict<'py>(py: Python<'py>, record: &Record) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new(py);
        dict.set_item("tipo", record.kind().tag())?;
        for (name, value) in record.fields() {
            dict.set_item(name, value)?;
        }
        Ok(dict)
    }

    fn to_py_err(e: ProcessingError) -> PyErr {
        PyRuntimeError::new_err(e.to_string())
    }
}
