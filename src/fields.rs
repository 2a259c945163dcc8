use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static BARE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{2})/(\d{2})/(\d{4})\s*$").expect("Invalid date regex"));

/// Keep only ASCII digits
pub fn only_digits(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Display form of a tax ID
///
/// Exactly 14 digits become `NN.NNN.NNN/NNNN-NN`. Anything else is passed
/// through trimmed.
pub fn format_tax_id(raw: &str) -> String {
    let digits = only_digits(raw);
    if digits.len() == 14 {
        format!(
            "{}.{}.{}/{}-{}",
            &digits[..2],
            &digits[2..5],
            &digits[5..8],
            &digits[8..12],
            &digits[12..]
        )
    } else {
        raw.trim().to_string()
    }
}

/// Strict `DD/MM/YYYY`; every other shape (or an impossible date) is `None`
pub fn parse_br_date(text: &str) -> Option<NaiveDate> {
    let caps = BARE_DATE.captures(text)?;
    let day = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let year = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `DD/MM/YYYY` becomes `MM/YYYY`; any other text passes through unchanged
pub fn reduce_to_month_year(text: &str) -> String {
    match BARE_DATE.captures(text) {
        Some(caps) => format!("{}/{}", &caps[2], &caps[3]),
        None => text.to_string(),
    }
}

/// Split `"CODE - NAME"` on the first `" - "`
pub fn split_code_name(text: &str) -> Option<(String, String)> {
    text.split_once(" - ")
        .map(|(code, name)| (code.trim().to_string(), name.trim().to_string()))
}

/// Brazilian money: `"R$ 1.234,56"` -> `1234.56`
pub fn parse_br_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.replace('.', "").replace(',', ".").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tax_id() {
        assert_eq!(format_tax_id("01234567000189"), "01.234.567/0001-89");
        assert_eq!(format_tax_id("01.234.567/0001-89"), "01.234.567/0001-89");
        assert_eq!(format_tax_id(" 1234567 "), "1234567");
        assert_eq!(format_tax_id(""), "");
    }

    #[test]
    fn test_parse_br_date() {
        assert_eq!(parse_br_date("31/12/2099"), NaiveDate::from_ymd_opt(2099, 12, 31));
        assert_eq!(parse_br_date(" 01/02/2024 "), NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(parse_br_date("2099-12-31"), None);
        assert_eq!(parse_br_date("31/02/2024"), None);
        assert_eq!(parse_br_date("1/2/2024"), None);
        assert_eq!(parse_br_date(""), None);
    }

    #[test]
    fn test_reduce_to_month_year() {
        assert_eq!(reduce_to_month_year("15/05/2023"), "05/2023");
        assert_eq!(reduce_to_month_year("05/2023"), "05/2023");
        assert_eq!(reduce_to_month_year("1º TRIM/2023"), "1º TRIM/2023");
    }

    #[test]
    fn test_split_code_name() {
        assert_eq!(
            split_code_name("1082 - CP SEGURADOS - RPPS"),
            Some(("1082".to_string(), "CP SEGURADOS - RPPS".to_string()))
        );
        assert_eq!(split_code_name("1082-CP"), None);
    }

    #[test]
    fn test_parse_br_amount() {
        assert_eq!(parse_br_amount("R$ 1.234,56"), Some(1234.56));
        assert_eq!(parse_br_amount("0,00"), Some(0.0));
        assert_eq!(parse_br_amount("abc"), None);
    }
}
