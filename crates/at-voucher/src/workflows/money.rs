//! Dollar amounts are carried as integer cents everywhere.

/// Render cents as `$1,234.56`.
pub fn format_cents(cents: u64) -> String {
    let dollars = (cents / 100).to_string();
    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (index, ch) in dollars.chars().enumerate() {
        if index > 0 && (dollars.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${grouped}.{:02}", cents % 100)
}

/// Parse user-entered currency (`$45,000`, `45000.5`, ` 1,200.00 `) into cents.
pub fn parse_dollars(raw: &str) -> Result<u64, String> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|ch| *ch != ',')
        .collect();
    if cleaned.is_empty() {
        return Err("must be a dollar amount".to_string());
    }

    let (whole, fraction) = match cleaned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (cleaned.as_str(), ""),
    };
    if fraction.len() > 2
        || !whole.chars().all(|ch| ch.is_ascii_digit())
        || !fraction.chars().all(|ch| ch.is_ascii_digit())
        || (whole.is_empty() && fraction.is_empty())
    {
        return Err(format!("'{}' is not a valid dollar amount", raw.trim()));
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| format!("'{}' is too large", raw.trim()))?
    };
    let fraction: u64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<u64>().unwrap_or(0) * 10,
        _ => fraction.parse::<u64>().unwrap_or(0),
    };

    whole
        .checked_mul(100)
        .and_then(|cents| cents.checked_add(fraction))
        .ok_or_else(|| format!("'{}' is too large", raw.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_grouping() {
        assert_eq!(format_cents(0), "$0.00");
        assert_eq!(format_cents(5), "$0.05");
        assert_eq!(format_cents(123_456_78), "$123,456.78");
        assert_eq!(format_cents(100_000), "$1,000.00");
    }

    #[test]
    fn parses_common_inputs() {
        assert_eq!(parse_dollars("$45,000"), Ok(4_500_000));
        assert_eq!(parse_dollars(" 1,200.5 "), Ok(120_050));
        assert_eq!(parse_dollars(".99"), Ok(99));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_dollars("").is_err());
        assert!(parse_dollars("12.345").is_err());
        assert!(parse_dollars("-5").is_err());
        assert!(parse_dollars("ten").is_err());
        assert!(parse_dollars(".").is_err());
    }
}
