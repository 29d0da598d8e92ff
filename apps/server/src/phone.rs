//! Phone canonicalization.
//!
//! Every phone number is stored in "+<cc><subscriber>" form so the same
//! customer matches across bookings and account signup regardless of how
//! they typed their number.

/// Canonicalize a raw phone string against a country calling code
/// (digits only, e.g. "61").
///
/// Rules, applied to the digits left after stripping formatting:
/// - 10 digits starting with 0: drop the 0, prefix "+<cc>" (0402098123
///   becomes +61402098123)
/// - already "<cc>..." at national length: prefix "+"
/// - raw input already started with "+<cc>": keep the digits as "+<digits>"
/// - anything else: prefix "+<cc>" to whatever digits remain
pub fn canonicalize(raw: &str, country_code: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if raw.trim_start().starts_with(&format!("+{country_code}")) {
        return format!("+{digits}");
    }
    if digits.len() == 10 && digits.starts_with('0') {
        return format!("+{country_code}{}", &digits[1..]);
    }
    if digits.len() == country_code.len() + 9 && digits.starts_with(country_code) {
        return format!("+{digits}");
    }
    format!("+{country_code}{digits}")
}
