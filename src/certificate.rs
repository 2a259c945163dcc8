use crate::fields::parse_br_date;
use chrono::NaiveDate;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Suffix printed after the tax ID when the line names the certificate type
/// instead of the holder
const FEDERATIVE_ENTITY_MARKER: &str = "ENTE FEDERATIVO";

static TAX_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{2}\.\d{3}\.\d{3}/\d{4}-\d{2}").expect("Invalid tax ID regex"));

static TAX_ID_PREFIXED_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:CNPJ\s*:?\s*)?\d{2}\.\d{3}\.\d{3}/\d{4}-\d{2}[ \t]*[-–]?[ \t]*(\S.*?)[ \t]*$")
        .expect("Invalid holder line regex")
});

static MUNICIPALITY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*Munic[ií]pio\s*:\s*(\S.*?)\s*$").expect("Invalid municipality regex"));

static VALIDITY_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Data\s+de\s+Validade\s*:?\s*(\d{2}/\d{2}/\d{4})").expect("Invalid validity regex")
});

/// What a tax-clearance certificate says about itself
///
/// Fields that were not found are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CertificateInfo {
    #[serde(rename = "cnpj")]
    pub tax_id: String,
    #[serde(rename = "validade")]
    pub validity_date: String,
    #[serde(rename = "nome")]
    pub holder_name: String,
}

impl CertificateInfo {
    pub fn validity(&self) -> Option<NaiveDate> {
        parse_br_date(&self.validity_date)
    }

    /// Calendar days from `today` to the validity date; negative once expired
    pub fn days_until_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.validity().map(|date| (date - today).num_days())
    }
}

/// Certificate plus the facts the renderers need
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateEntry {
    #[serde(flatten)]
    pub info: CertificateInfo,
    #[serde(rename = "src")]
    pub source: String,
    #[serde(rename = "dias_restantes")]
    pub days_until_expiry: Option<i64>,
}

impl CertificateEntry {
    pub fn new(info: CertificateInfo, source: impl Into<String>, today: NaiveDate) -> Self {
        let days_until_expiry = info.days_until_expiry(today);
        Self {
            info,
            source: source.into(),
            days_until_expiry,
        }
    }
}

/// Unparseable validity dates first, then the soonest to expire
pub fn sort_by_expiry(entries: &mut [CertificateEntry]) {
    entries.sort_by_key(|entry| match entry.days_until_expiry {
        None => (0, 0),
        Some(days) => (1, days),
    });
}

/// Read certificate fields from the raw text of the first pages
///
/// Holder name comes from a line starting with the tax ID (unless the rest
/// of the line is the federative-entity marker), otherwise from a
/// "Município:" line. Never fails; missing fields stay empty.
pub fn extract_certificate(raw_text: &str) -> CertificateInfo {
    let holder_name = TAX_ID_PREFIXED_LINE
        .captures_iter(raw_text)
        .map(|caps| caps[1].trim().to_string())
        .find(|suffix| !suffix.is_empty() && !suffix.eq_ignore_ascii_case(FEDERATIVE_ENTITY_MARKER))
        .or_else(|| {
            MUNICIPALITY_LINE
                .captures(raw_text)
                .map(|caps| caps[1].trim().to_string())
        })
        .unwrap_or_default();

    let tax_id = TAX_ID
        .find(raw_text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let validity_date = VALIDITY_DATE
        .captures(raw_text)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default();

    debug!(
        "Certificate fields: tax_id={:?} validity={:?} holder={:?}",
        tax_id, validity_date, holder_name
    );

    CertificateInfo {
        tax_id,
        validity_date,
        holder_name,
    }
}
