use crate::config::PipelineConfig;
use crate::fields::{format_tax_id, only_digits, reduce_to_month_year, split_code_name};
use crate::normalizer::normalize;
use crate::records::{
    DebtorRecord, FiscalProcessRecord, OmissionRecord, PenaltyNoticeRecord, Record, RecordContext,
    RecordData, RecordKind,
};
use crate::resolver::NameResolver;
use log::{debug, warn};
use regex::Regex;

/// Number of lines above a "DEVEDOR" marker that hold the debtor fields
const DEBTOR_FIELD_LINES: usize = 8;
/// Number of lines below a "MAED" marker that hold the notice fields
const PENALTY_FIELD_LINES: usize = 5;
/// Shortest line accepted as an organization name
const MIN_ORGANIZATION_LEN: usize = 5;

/// Taxpayer block currently being read
///
/// Owned by one `extract` call. A header without a usable name keeps the
/// previous organization: reports omit it when it did not change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionContext {
    pub current_tax_id: Option<String>,
    pub current_organization: Option<String>,
}

/// A recognised tax-ID header line
#[derive(Debug, Clone, PartialEq)]
struct TaxIdHeader {
    tax_id: String,
    inline_name: Option<String>,
}

/// Line-scan extractor for tax-restriction reports
///
/// Walks the logical lines once. Each line is tested against the triggers in
/// priority order and the first hit wins:
/// 1. Tax-ID header (updates the context, emits nothing)
/// 2. "DEVEDOR" alone on a line (fields sit in the 8 lines above)
/// 3. "MAED" (fields sit in the 5 lines below)
/// 4. "OMISS" (period searched in the lines below)
/// 5. Fiscal-process-pending block enter/exit, and "DEVEDOR" inside it
pub struct RecordExtractor {
    tax_id_header: Regex,
    page_marker: Regex,
    period: Regex,
    process_number: Regex,
    header_name_lookahead: usize,
    omission_period_lookahead: usize,
    fiscal_process_window: usize,
}

impl Default for RecordExtractor {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

impl RecordExtractor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            tax_id_header: Regex::new(r"(?i)\bCNPJ\s*:?\s*([0-9./\-]{14,20})(?:\s+-\s*(.*))?")
                .expect("Invalid tax ID header regex"),
            page_marker: Regex::new(r"(?i)^\s*(p[aá]gina|p[aá]g\.)").expect("Invalid page marker regex"),
            period: Regex::new(r"\b\d{2}/\d{4}\b|\b\d{4}\b").expect("Invalid period regex"),
            process_number: Regex::new(r"\b\d{4,6}[.\-]?\d{3}\.?\d{3}/\d{4}-\d{2}\b")
                .expect("Invalid process number regex"),
            header_name_lookahead: config.header_name_lookahead,
            omission_period_lookahead: config.omission_period_lookahead,
            fiscal_process_window: config.fiscal_process_window,
        }
    }

    /// Extract every record of one document
    ///
    /// Records carry `src`, the formatted tax ID of the active header and the
    /// organization name, preferring the resolver's answer over the text seen
    /// in the document.
    pub fn extract(&self, lines: &[String], src: &str, resolver: &dyn NameResolver) -> Vec<Record> {
        let mut context = ExtractionContext::default();
        let mut in_fiscal_block = false;
        let mut records = Vec::new();

        for (index, line) in lines.iter().enumerate() {
            // Triggers compare against the accent-free upper-case form
            let key = normalize(line).to_uppercase();

            // Header lines only move the context
            if let Some(header) = self.parse_tax_id_header(line) {
                self.apply_header(&mut context, header, lines, index);
                continue;
            }

            // Debtor fields sit above the marker
            if key == "DEVEDOR" {
                let data = match self.debtor_at(lines, index) {
                    Some(debtor) => RecordData::Debtor(debtor),
                    None => {
                        warn!("{}: DEVEDOR at line {} lacks its field lines, keeping raw text", src, index);
                        RecordData::Raw {
                            kind: RecordKind::Debtor,
                            raw: line.clone(),
                        }
                    }
                };
                records.push(Record::new(data, tag(&context, src, resolver)));
                continue;
            }

            // Penalty-notice fields sit below the marker
            if key.contains("MAED") {
                let data = match Self::penalty_notice_at(lines, index) {
                    Some(notice) => RecordData::PenaltyNotice(notice),
                    None => {
                        warn!("{}: MAED at line {} lacks its field lines, keeping raw text", src, index);
                        RecordData::Raw {
                            kind: RecordKind::PenaltyNotice,
                            raw: line.clone(),
                        }
                    }
                };
                records.push(Record::new(data, tag(&context, src, resolver)));
                continue;
            }

            if key.contains("OMISS") {
                let omission = OmissionRecord {
                    raw: line.clone(),
                    period: self.omission_period_after(lines, index),
                };
                debug!("{}: omission at line {} (period {:?})", src, index, omission.period);
                records.push(Record::new(RecordData::Omission(omission), tag(&context, src, resolver)));
                continue;
            }

            // Fiscal-process block boundaries
            if key.contains("PROCESSO FISCAL") && key.contains("PEND") {
                debug!("{}: entering fiscal-process block at line {}", src, index);
                in_fiscal_block = true;
                continue;
            }

            if key.contains("PENDENCIA -") {
                if in_fiscal_block {
                    debug!("{}: leaving fiscal-process block at line {}", src, index);
                }
                in_fiscal_block = false;
                continue;
            }

            // No process number nearby means no record for this line
            if in_fiscal_block && key.contains("DEVEDOR") {
                match self.process_number_near(lines, index) {
                    Some(process_number) => {
                        let process = FiscalProcessRecord {
                            process_number,
                            status: "DEVEDOR".to_string(),
                        };
                        records.push(Record::new(
                            RecordData::FiscalProcess(process),
                            tag(&context, src, resolver),
                        ));
                    }
                    None => debug!("{}: no process number near line {}", src, index),
                }
            }
        }

        debug!("{}: extracted {} records from {} lines", src, records.len(), lines.len());
        records
    }

    fn parse_tax_id_header(&self, line: &str) -> Option<TaxIdHeader> {
        let caps = self.tax_id_header.captures(line)?;
        let tax_id = only_digits(&caps[1]);
        if tax_id.is_empty() {
            return None;
        }
        let inline_name = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|name| !name.is_empty());
        Some(TaxIdHeader { tax_id, inline_name })
    }

    fn apply_header(&self, context: &mut ExtractionContext, header: TaxIdHeader, lines: &[String], index: usize) {
        let name = header
            .inline_name
            .filter(|name| !has_digit(name))
            .or_else(|| self.organization_after(lines, index));

        debug!("Tax ID header {} (organization {:?})", header.tax_id, name);
        context.current_tax_id = Some(header.tax_id);
        if name.is_some() {
            context.current_organization = name;
        }
    }

    fn organization_after(&self, lines: &[String], index: usize) -> Option<String> {
        lines
            .iter()
            .skip(index + 1)
            .take(self.header_name_lookahead)
            .find(|line| {
                line.chars().count() >= MIN_ORGANIZATION_LEN
                    && !has_digit(line)
                    && !self.page_marker.is_match(line)
            })
            .cloned()
    }

    fn debtor_at(&self, lines: &[String], index: usize) -> Option<DebtorRecord> {
        let start = index.checked_sub(DEBTOR_FIELD_LINES)?;
        let fields = lines.get(start..index)?;

        let (code, name) = split_code_name(&fields[0]).unwrap_or_else(|| (fields[0].clone(), String::new()));
        Some(DebtorRecord {
            code,
            name,
            competence: fields[1].clone(),
            due_date: fields[2].clone(),
            origin_amount: fields[3].clone(),
            debt_amount: fields[4].clone(),
            penalty_amount: fields[5].clone(),
            interest_amount: fields[6].clone(),
            consolidated_amount: fields[7].clone(),
        })
    }

    fn penalty_notice_at(lines: &[String], index: usize) -> Option<PenaltyNoticeRecord> {
        let fields = lines.get(index + 1..index + 1 + PENALTY_FIELD_LINES)?;
        let trigger = &lines[index];

        let (code, description) = match split_code_name(trigger) {
            Some((code, description)) if !description.is_empty() => (code, description),
            Some((code, _)) => (code, "MAED".to_string()),
            None => (trigger.trim().to_string(), "MAED".to_string()),
        };

        Some(PenaltyNoticeRecord {
            code,
            description,
            competence: reduce_to_month_year(&fields[0]),
            due_date: fields[1].clone(),
            origin_amount: fields[2].clone(),
            debt_amount: fields[3].clone(),
            status: fields[4].clone(),
        })
    }

    fn omission_period_after(&self, lines: &[String], index: usize) -> Option<String> {
        lines
            .iter()
            .skip(index + 1)
            .take(self.omission_period_lookahead)
            .filter(|line| !normalize(line).contains("periodo"))
            .find(|line| self.period.is_match(line))
            .cloned()
    }

    fn process_number_near(&self, lines: &[String], index: usize) -> Option<String> {
        let start = index.saturating_sub(self.fiscal_process_window);
        let end = (index + self.fiscal_process_window + 1).min(lines.len());
        lines[start..end]
            .iter()
            .find_map(|line| self.process_number.find(line))
            .map(|m| m.as_str().to_string())
    }
}

/// Context snapshot attached to a record at the point of recognition
fn tag(context: &ExtractionContext, src: &str, resolver: &dyn NameResolver) -> RecordContext {
    let tax_id = context.current_tax_id.as_deref().map(format_tax_id);
    let organization = tax_id
        .as_deref()
        .and_then(|id| resolver.resolve(id))
        .or_else(|| context.current_organization.clone());
    RecordContext {
        organization,
        tax_id,
        src: src.to_string(),
    }
}

fn has_digit(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::NoLookup;

    struct FixedName(&'static str);

    impl NameResolver for FixedName {
        fn resolve(&self, _formatted_tax_id: &str) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn extract(raw: &[&str]) -> Vec<Record> {
        RecordExtractor::default().extract(&lines(raw), "doc.pdf", &NoLookup)
    }

    #[test]
    fn test_debtor_from_preceding_lines() {
        let records = extract(&[
            "1082 - CP SEGURADOS",
            "05/2023",
            "20/06/2023",
            "1.000,00",
            "900,00",
            "180,00",
            "50,00",
            "1.130,00",
            "DEVEDOR",
        ]);
        assert_eq!(records.len(), 1);
        match &records[0].data {
            RecordData::Debtor(d) => {
                assert_eq!(d.code, "1082");
                assert_eq!(d.name, "CP SEGURADOS");
                assert_eq!(d.competence, "05/2023");
                assert_eq!(d.due_date, "20/06/2023");
                assert_eq!(d.origin_amount, "1.000,00");
                assert_eq!(d.consolidated_amount, "1.130,00");
            }
            other => panic!("expected debtor, got {:?}", other),
        }
        assert_eq!(records[0].src(), "doc.pdf");
    }

    #[test]
    fn test_short_debtor_degrades_to_raw() {
        let records = extract(&["1082 - CP", "05/2023", "DEVEDOR"]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind(), RecordKind::Debtor);
        assert_eq!(
            records[0].data,
            RecordData::Raw {
                kind: RecordKind::Debtor,
                raw: "DEVEDOR".to_string()
            }
        );
    }

    #[test]
    fn test_penalty_notice_reduces_bare_date() {
        let records = extract(&[
            "MAED123 - MULTA POR ATRASO NA GFIP",
            "15/05/2023",
            "20/06/2023",
            "500,00",
            "500,00",
            "EM COBRANCA",
        ]);
        match &records[0].data {
            RecordData::PenaltyNotice(p) => {
                assert_eq!(p.code, "MAED123");
                assert_eq!(p.description, "MULTA POR ATRASO NA GFIP");
                assert_eq!(p.competence, "05/2023");
                assert_eq!(p.status, "EM COBRANCA");
            }
            other => panic!("expected penalty notice, got {:?}", other),
        }
    }

    #[test]
    fn test_penalty_notice_keeps_month_year() {
        let records = extract(&["MAED 77", "05/2023", "20/06/2023", "1,00", "1,00", "ATIVO"]);
        match &records[0].data {
            RecordData::PenaltyNotice(p) => {
                assert_eq!(p.code, "MAED 77");
                assert_eq!(p.description, "MAED");
                assert_eq!(p.competence, "05/2023");
            }
            other => panic!("expected penalty notice, got {:?}", other),
        }
    }

    #[test]
    fn test_short_penalty_notice_degrades_to_raw() {
        let records = extract(&["MAED 77 - MULTA", "05/2023"]);
        assert_eq!(records.len(), 1);
        assert!(records[0].is_fallback());
        assert_eq!(records[0].kind(), RecordKind::PenaltyNotice);
    }

    #[test]
    fn test_omission_period_skips_label_line() {
        let records = extract(&[
            "OMISSÃO DE DECLARAÇÃO - GFIP",
            "Período de apuração 2023",
            "03/2023",
        ]);
        match &records[0].data {
            RecordData::Omission(o) => {
                assert_eq!(o.raw, "OMISSÃO DE DECLARAÇÃO - GFIP");
                assert_eq!(o.period.as_deref(), Some("03/2023"));
            }
            other => panic!("expected omission, got {:?}", other),
        }
    }

    #[test]
    fn test_omission_without_period() {
        let records = extract(&["Omissao de DCTF", "a", "b", "c", "d", "e", "f", "2023"]);
        match &records[0].data {
            RecordData::Omission(o) => assert_eq!(o.period, None),
            other => panic!("expected omission, got {:?}", other),
        }
    }

    #[test]
    fn test_header_sets_context_with_inline_name() {
        let records = extract(&["CNPJ: 01.234.567/0001-89 - MUNICIPIO DE CATALAO", "OMISSAO GFIP"]);
        assert_eq!(records[0].context.tax_id.as_deref(), Some("01.234.567/0001-89"));
        assert_eq!(records[0].context.organization.as_deref(), Some("MUNICIPIO DE CATALAO"));
    }

    #[test]
    fn test_omission_period_from_year_only_line() {
        let records = extract(&["OMISSAO X", "Ano 2019"]);
        match &records[0].data {
            RecordData::Omission(o) => assert_eq!(o.period.as_deref(), Some("Ano 2019")),
            other => panic!("expected omission, got {:?}", other),
        }

        let records = extract(&["OMISSAO Y", "sem movimento", "Exercicio 1890"]);
        match &records[0].data {
            RecordData::Omission(o) => assert_eq!(o.period.as_deref(), Some("Exercicio 1890")),
            other => panic!("expected omission, got {:?}", other),
        }
    }

    #[test]
    fn test_inline_name_with_digit_falls_back_to_following_lines() {
        let records = extract(&[
            "CNPJ: 01.234.567/0001-89 - FUNDO 2",
            "FUNDO MUNICIPAL DE SAUDE",
            "OMISSAO X",
        ]);
        assert_eq!(records[0].context.tax_id.as_deref(), Some("01.234.567/0001-89"));
        assert_eq!(records[0].context.organization.as_deref(), Some("FUNDO MUNICIPAL DE SAUDE"));
    }

    #[test]
    fn test_short_tax_id_is_not_a_header() {
        let records = extract(&["CNPJ: 123", "OMISSAO"]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].context.tax_id, None);
    }

    #[test]
    fn test_tax_id_not_fourteen_digits_passes_through() {
        let records = extract(&["CNPJ: 012345670001890 - MUNICIPIO DE CATALAO", "OMISSAO GFIP"]);
        assert_eq!(records[0].context.tax_id.as_deref(), Some("012345670001890"));
        assert_eq!(records[0].context.organization.as_deref(), Some("MUNICIPIO DE CATALAO"));
    }

    #[test]
    fn test_header_name_from_following_lines() {
        let records = extract(&[
            "CNPJ: 01.234.567/0001-89",
            "Página",
            "FMS",
            "FUNDO MUNICIPAL DE SAUDE",
            "OMISSAO GFIP",
        ]);
        assert_eq!(records[0].context.organization.as_deref(), Some("FUNDO MUNICIPAL DE SAUDE"));
    }

    #[test]
    fn test_header_without_name_keeps_previous_organization() {
        let records = extract(&[
            "CNPJ: 01.234.567/0001-89 - MUNICIPIO DE CATALAO",
            "CNPJ: 01.234.567/0002-60",
            "Página 2 de 3",
            "Emitido em 01/02/2024",
            "Código 1082",
            "Valor 10,00",
            "OMISSAO GFIP",
        ]);
        assert_eq!(records[0].context.tax_id.as_deref(), Some("01.234.567/0002-60"));
        assert_eq!(records[0].context.organization.as_deref(), Some("MUNICIPIO DE CATALAO"));
    }

    #[test]
    fn test_resolver_name_wins_over_document_text() {
        let records = RecordExtractor::default().extract(
            &lines(&["CNPJ: 01.234.567/0001-89 - MUN CATALAO", "OMISSAO GFIP"]),
            "doc.pdf",
            &FixedName("MUNICIPIO DE CATALAO"),
        );
        assert_eq!(records[0].context.organization.as_deref(), Some("MUNICIPIO DE CATALAO"));
    }

    #[test]
    fn test_records_before_any_header_have_no_tax_id() {
        let records = extract(&["OMISSAO GFIP"]);
        assert_eq!(records[0].context.tax_id, None);
        assert_eq!(records[0].context.organization, None);
    }

    #[test]
    fn test_fiscal_process_inside_block() {
        let records = extract(&[
            "Pendências - Processo Fiscal",
            "10120.720.123/2023-45",
            "Situação: DEVEDOR",
            "Situação: DEVEDOR",
            "Pendência - Parcelamento",
            "Situação: DEVEDOR",
        ]);
        assert_eq!(records.len(), 2);
        for record in &records {
            match &record.data {
                RecordData::FiscalProcess(f) => {
                    assert_eq!(f.process_number, "10120.720.123/2023-45");
                    assert_eq!(f.status, "DEVEDOR");
                }
                other => panic!("expected fiscal process, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_fiscal_process_without_number_is_skipped() {
        let records = extract(&["PROCESSO FISCAL PENDENTE", "Situação: DEVEDOR"]);
        assert!(records.is_empty());
    }

    #[test]
    fn test_process_number_shapes() {
        let extractor = RecordExtractor::default();
        assert!(extractor.process_number.is_match("13116-720.007/2019-11"));
        assert!(extractor.process_number.is_match("10120720123/2023-45"));
        assert!(!extractor.process_number.is_match("01.234.567/0001-89"));
    }
}
