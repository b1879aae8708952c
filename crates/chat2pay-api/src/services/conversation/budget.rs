use regex::Regex;
use std::sync::OnceLock;

static CURRENCY_MARKERS: OnceLock<Regex> = OnceLock::new();
static FIRST_NUMBER: OnceLock<Regex> = OnceLock::new();

fn currency_markers() -> &'static Regex {
    CURRENCY_MARKERS.get_or_init(|| Regex::new(r"(?i)rp|idr|\$").expect("Invalid currency pattern"))
}

fn first_number() -> &'static Regex {
    FIRST_NUMBER.get_or_init(|| Regex::new(r"\d+").expect("Invalid digit pattern"))
}

/// Parse an approximate currency ceiling from free text.
///
/// Thousands separators, currency markers and whitespace are stripped and the
/// first run of digits is parsed. Unit words are not interpreted, so
/// `"15jt"` yields `15`. Returns `0.0` when no number is present.
pub fn extract_budget(text: &str) -> f64 {
    let without_separators: String = text.chars().filter(|c| *c != '.' && *c != ',').collect();
    let without_currency = currency_markers().replace_all(&without_separators, "");
    let compact: String = without_currency.chars().filter(|c| !c.is_whitespace()).collect();

    first_number()
        .find(&compact)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Human wording for a budget: whole `"<n> juta"` from one million up, plain digits below
pub fn format_price(amount: f64) -> String {
    let rupiah = amount as i64;
    if rupiah >= 1_000_000 {
        format!("{} juta", rupiah / 1_000_000)
    } else {
        rupiah.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rupiah_with_separators() {
        assert_eq!(extract_budget("Rp 15.000.000"), 15_000_000.0);
        assert_eq!(extract_budget("IDR 2,500,000"), 2_500_000.0);
        assert_eq!(extract_budget("15000000"), 15_000_000.0);
    }

    #[test]
    fn test_unit_words_are_not_interpreted() {
        // only separators are stripped, magnitudes stay literal
        assert_eq!(extract_budget("around 2jt"), 2.0);
        assert_eq!(extract_budget("15jt"), 15.0);
        assert_eq!(extract_budget("laptop gaming budget 15 juta"), 15.0);
    }

    #[test]
    fn test_no_number_is_zero() {
        assert_eq!(extract_budget("no budget mentioned"), 0.0);
        assert_eq!(extract_budget(""), 0.0);
        assert_eq!(extract_budget("Rp"), 0.0);
    }

    #[test]
    fn test_whitespace_between_digits_is_stripped() {
        assert_eq!(extract_budget("Rp 1 500 000"), 1_500_000.0);
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(15_000_000.0), "15 juta");
        assert_eq!(format_price(2_500_000.0), "2 juta");
        assert_eq!(format_price(750_000.0), "750000");
    }
}
