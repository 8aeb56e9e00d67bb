//! `SIZE` string parsing and formatting: `NUMBER [UNIT]`, binary (1024-based) multipliers.

use crate::error::BalanceError;

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;
const TIB: f64 = GIB * 1024.0;
const PIB: f64 = TIB * 1024.0;

/// Parse a human size string like `"100M"`, `"1.5G"`, `" 1 TiB "` into a byte count.
///
/// Case- and whitespace-insensitive. Units are all treated as binary (powers of 1024)
/// regardless of whether the `i` (KiB-style) spelling is used. Negative numbers are rejected.
pub fn parse_size(input: &str) -> Result<u64, BalanceError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(BalanceError::Validation(format!(
            "empty size string: {input:?}"
        )));
    }

    let split_at = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(trimmed.len());
    let (number_part, unit_part) = trimmed.split_at(split_at);
    let number_part = number_part.trim();
    let unit_part = unit_part.trim();

    if number_part.is_empty() {
        return Err(BalanceError::Validation(format!(
            "missing number in size string: {input:?}"
        )));
    }

    let value: f64 = number_part
        .parse()
        .map_err(|_| BalanceError::Validation(format!("invalid number in size string: {input:?}")))?;
    if value < 0.0 {
        return Err(BalanceError::Validation(format!(
            "negative size is not allowed: {input:?}"
        )));
    }

    let multiplier = unit_multiplier(unit_part)
        .ok_or_else(|| BalanceError::Validation(format!("unknown size unit: {input:?}")))?;

    Ok((value * multiplier).round() as u64)
}

fn unit_multiplier(unit: &str) -> Option<f64> {
    let unit = unit.to_ascii_uppercase();
    let unit = unit.as_str();
    Some(match unit {
        "" | "B" => 1.0,
        "K" | "KB" | "KIB" => KIB,
        "M" | "MB" | "MIB" => MIB,
        "G" | "GB" | "GIB" => GIB,
        "T" | "TB" | "TIB" => TIB,
        "P" | "PB" | "PIB" => PIB,
        _ => return None,
    })
}

/// Format a byte count back into a `NUMBER UNIT` string using the largest whole unit,
/// the inverse of [`parse_size`] for round-trippable values.
pub fn format_size_with_unit(bytes: u64) -> String {
    let bytes_f = bytes as f64;
    if bytes_f < KIB {
        return format!("{bytes}B");
    }
    let (value, unit) = if bytes_f < MIB {
        (bytes_f / KIB, "K")
    } else if bytes_f < GIB {
        (bytes_f / MIB, "M")
    } else if bytes_f < TIB {
        (bytes_f / GIB, "G")
    } else if bytes_f < PIB {
        (bytes_f / TIB, "T")
    } else {
        (bytes_f / PIB, "P")
    };
    if value.fract() == 0.0 {
        format!("{value:.0}{unit}")
    } else {
        format!("{value}{unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_bytes() {
        assert_eq!(parse_size("100").unwrap(), 100);
        assert_eq!(parse_size("100B").unwrap(), 100);
    }

    #[test]
    fn literal_scenarios_from_spec() {
        assert_eq!(parse_size("100M").unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_size("1.5G").unwrap(), 1_610_612_736);
        assert_eq!(parse_size("1TiB").unwrap(), 1u64 << 40);
        assert_eq!(parse_size(" 100 MB ").unwrap(), 100 * 1024 * 1024);
    }

    #[test]
    fn case_and_whitespace_insensitive() {
        let a = parse_size("1g").unwrap();
        let b = parse_size("1G").unwrap();
        let c = parse_size(" 1 G ").unwrap();
        assert_eq!(a, 1_073_741_824);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_size("abc").is_err());
        assert!(parse_size("-100M").is_err());
        assert!(parse_size("100X").is_err());
    }

    #[test]
    fn round_trip_for_representable_values() {
        for &x in &[0u64, 512, 1024, 100 * 1024 * 1024, 1u64 << 40] {
            let formatted = format_size_with_unit(x);
            assert_eq!(parse_size(&formatted).unwrap(), x, "round trip of {x}");
        }
    }
}
