use crate::error::ProcessingError;
use crate::fields::parse_br_amount;
use log::debug;
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::Serialize;

static TEXT_TAX_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"CNPJ:?\s?(\d{2}\.?\d{3}\.?\d{3}/?\d{4}-?\d{2})").expect("Invalid invoice tax ID regex")
});
static TEXT_SERVICE_TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)TOTAL DO SERVI[ÇC]O:?\s?R?\$?\s?([\d.,]+)").expect("Invalid service total regex")
});
static TEXT_GRAND_TOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)VALOR TOTAL:?\s?R?\$?\s?([\d.,]+)").expect("Invalid grand total regex"));
static TEXT_WITHHELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)INSS RETIDO:?\s?R?\$?\s?([\d.,]+)").expect("Invalid withheld regex"));
static TEXT_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)N[ºo°]\.?\s?(\d+)").expect("Invalid invoice number regex"));

/// Service-invoice fields used to pre-fill a withholding audit
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvoiceData {
    #[serde(rename = "cnpj")]
    pub tax_id: Option<String>,
    #[serde(rename = "prestador")]
    pub provider: Option<String>,
    #[serde(rename = "numero")]
    pub number: Option<String>,
    #[serde(rename = "valor")]
    pub service_value: Option<f64>,
    #[serde(rename = "inss")]
    pub withheld_value: Option<f64>,
}

impl InvoiceData {
    pub fn is_empty(&self) -> bool {
        *self == InvoiceData::default()
    }
}

/// Read an NFS-e XML document
///
/// Elements are matched on their local name, case-insensitively; the first
/// occurrence of each wins. XML amounts use `.` as the decimal separator.
pub fn extract_invoice_xml(xml: &str) -> Result<InvoiceData, ProcessingError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut data = InvoiceData::default();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                current = Some(String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase());
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().trim().to_string();
                if text.is_empty() {
                    continue;
                }
                match current.as_deref() {
                    Some("cnpj") if data.tax_id.is_none() => data.tax_id = Some(text),
                    Some("razaosocial") if data.provider.is_none() => data.provider = Some(text),
                    Some("numero") if data.number.is_none() => data.number = Some(text),
                    Some("valorservicos") if data.service_value.is_none() => {
                        data.service_value = text.parse().ok();
                    }
                    Some("valorinss") if data.withheld_value.is_none() => {
                        data.withheld_value = text.parse().ok();
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProcessingError::SystemError(format!(
                    "Invoice XML parse error at {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    debug!("Invoice XML fields: {:?}", data);
    Ok(data)
}

/// Read an invoice from the plain text of its PDF
///
/// The service total is taken from "TOTAL DO SERVIÇO", falling back to
/// "VALOR TOTAL". Amounts are in Brazilian format.
pub fn extract_invoice_text(text: &str) -> InvoiceData {
    let amount = |re: &Regex| re.captures(text).and_then(|caps| parse_br_amount(&caps[1]));

    let data = InvoiceData {
        tax_id: TEXT_TAX_ID.captures(text).map(|caps| caps[1].to_string()),
        provider: None,
        number: TEXT_NUMBER.captures(text).map(|caps| caps[1].to_string()),
        service_value: amount(&TEXT_SERVICE_TOTAL).or_else(|| amount(&TEXT_GRAND_TOTAL)),
        withheld_value: amount(&TEXT_WITHHELD),
    };

    debug!("Invoice text fields: {:?}", data);
    data
}
