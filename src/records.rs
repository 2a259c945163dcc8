use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Record kinds recognised in a tax-restriction report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    #[serde(rename = "DEVEDOR")]
    Debtor,
    #[serde(rename = "MAED")]
    PenaltyNotice,
    #[serde(rename = "OMISSAO")]
    Omission,
    #[serde(rename = "PROCESSO_FISCAL")]
    FiscalProcess,
}

impl RecordKind {
    pub fn tag(&self) -> &'static str {
        match self {
            RecordKind::Debtor => "DEVEDOR",
            RecordKind::PenaltyNotice => "MAED",
            RecordKind::Omission => "OMISSAO",
            RecordKind::FiscalProcess => "PROCESSO_FISCAL",
        }
    }
}

/// Where a record came from and which taxpayer block was active
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordContext {
    pub organization: Option<String>,
    pub tax_id: Option<String>,
    pub src: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebtorRecord {
    pub code: String,
    pub name: String,
    pub competence: String,
    pub due_date: String,
    pub origin_amount: String,
    pub debt_amount: String,
    pub penalty_amount: String,
    pub interest_amount: String,
    pub consolidated_amount: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PenaltyNoticeRecord {
    pub code: String,
    pub description: String,
    pub competence: String,
    pub due_date: String,
    pub origin_amount: String,
    pub debt_amount: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OmissionRecord {
    pub raw: String,
    pub period: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FiscalProcessRecord {
    pub process_number: String,
    pub status: String,
}

/// Shape of a record, one variant per kind
///
/// `Raw` stands in for a record of `kind` whose surrounding lines could not
/// be sliced; it keeps the trigger text so nothing is lost.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordData {
    Debtor(DebtorRecord),
    PenaltyNotice(PenaltyNoticeRecord),
    Omission(OmissionRecord),
    FiscalProcess(FiscalProcessRecord),
    Raw { kind: RecordKind, raw: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub data: RecordData,
    pub context: RecordContext,
}

impl Record {
    pub fn new(data: RecordData, context: RecordContext) -> Self {
        Self { data, context }
    }

    pub fn kind(&self) -> RecordKind {
        match &self.data {
            RecordData::Debtor(_) => RecordKind::Debtor,
            RecordData::PenaltyNotice(_) => RecordKind::PenaltyNotice,
            RecordData::Omission(_) => RecordKind::Omission,
            RecordData::FiscalProcess(_) => RecordKind::FiscalProcess,
            RecordData::Raw { kind, .. } => *kind,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.data, RecordData::Raw { .. })
    }

    pub fn src(&self) -> &str {
        &self.context.src
    }

    /// Flat `(field, value)` view for renderers, in display order
    ///
    /// Field names are the ones the report templates use.
    pub fn fields(&self) -> Vec<(&'static str, Option<String>)> {
        let mut fields: Vec<(&'static str, Option<String>)> = match &self.data {
            RecordData::Debtor(d) => vec![
                ("cod", Some(d.code.clone())),
                ("nome", Some(d.name.clone())),
                ("competencia", Some(d.competence.clone())),
                ("vencimento", Some(d.due_date.clone())),
                ("valor_original", Some(d.origin_amount.clone())),
                ("saldo_devedor", Some(d.debt_amount.clone())),
                ("multa", Some(d.penalty_amount.clone())),
                ("juros", Some(d.interest_amount.clone())),
                ("consolidado", Some(d.consolidated_amount.clone())),
            ],
            RecordData::PenaltyNotice(p) => vec![
                ("cod", Some(p.code.clone())),
                ("descricao", Some(p.description.clone())),
                ("competencia", Some(p.competence.clone())),
                ("vencimento", Some(p.due_date.clone())),
                ("valor_original", Some(p.origin_amount.clone())),
                ("saldo_devedor", Some(p.debt_amount.clone())),
                ("situacao", Some(p.status.clone())),
            ],
            RecordData::Omission(o) => vec![
                ("raw", Some(o.raw.clone())),
                ("periodo", o.period.clone()),
            ],
            RecordData::FiscalProcess(f) => vec![
                ("processo", Some(f.process_number.clone())),
                ("situacao", Some(f.status.clone())),
            ],
            RecordData::Raw { raw, .. } => vec![("raw", Some(raw.clone()))],
        };
        fields.push(("orgao", self.context.organization.clone()));
        fields.push(("cnpj", self.context.tax_id.clone()));
        fields.push(("src", Some(self.context.src.clone())));
        fields
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.fields();
        let mut map = serializer.serialize_map(Some(fields.len() + 1))?;
        map.serialize_entry("tipo", self.kind().tag())?;
        for (name, value) in &fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RecordContext {
        RecordContext {
            organization: Some("MUNICIPIO DE CATALAO".to_string()),
            tax_id: Some("01.234.567/0001-89".to_string()),
            src: "catalao.pdf".to_string(),
        }
    }

    #[test]
    fn test_raw_fallback_keeps_kind() {
        let record = Record::new(
            RecordData::Raw {
                kind: RecordKind::Debtor,
                raw: "DEVEDOR".to_string(),
            },
            context(),
        );
        assert_eq!(record.kind(), RecordKind::Debtor);
        assert!(record.is_fallback());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tipo"], "DEVEDOR");
        assert_eq!(json["raw"], "DEVEDOR");
        assert_eq!(json["src"], "catalao.pdf");
        assert!(json.get("cod").is_none());
    }

    #[test]
    fn test_serialized_field_names() {
        let record = Record::new(
            RecordData::Omission(OmissionRecord {
                raw: "OMISSÃO DE DECLARAÇÃO".to_string(),
                period: None,
            }),
            RecordContext {
                src: "x.pdf".to_string(),
                ..RecordContext::default()
            },
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tipo"], "OMISSAO");
        assert!(json["periodo"].is_null());
        assert!(json["cnpj"].is_null());
        assert_eq!(json["src"], "x.pdf");
    }
}
