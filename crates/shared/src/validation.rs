//! Common validation utilities.

use validator::ValidationError;

/// Minimum number of digits in a dialable phone number.
const MIN_PHONE_DIGITS: usize = 7;

/// Maximum number of digits in a phone number (E.164 limit).
const MAX_PHONE_DIGITS: usize = 15;

lazy_static::lazy_static! {
    /// Optional leading `+` followed by digits only, after separators are stripped.
    static ref PHONE_REGEX: regex::Regex = regex::Regex::new(r"^\+?[0-9]+$").unwrap();
}

/// Characters people commonly type between phone number groups.
fn is_phone_separator(c: char) -> bool {
    matches!(c, ' ' | '-' | '.' | '(' | ')')
}

/// Strips grouping separators from a phone number, keeping a leading `+`.
///
/// This is not normalization: country codes are not inferred and no
/// canonical form is produced.
pub fn strip_phone_separators(phone: &str) -> String {
    phone
        .trim()
        .chars()
        .filter(|c| !is_phone_separator(*c))
        .collect()
}

/// Validates that a phone number is non-empty and plausibly dialable.
/// - Separators (space, dash, dot, parentheses) are ignored
/// - An optional leading `+` is allowed
/// - Between 7 and 15 digits must remain
pub fn validate_phone_number(phone: &str) -> Result<(), ValidationError> {
    if phone.trim().is_empty() {
        let mut err = ValidationError::new("phone_required");
        err.message = Some("Phone number is required".into());
        return Err(err);
    }

    let stripped = strip_phone_separators(phone);
    if !PHONE_REGEX.is_match(&stripped) {
        let mut err = ValidationError::new("phone_format");
        err.message = Some("Phone number may only contain digits and separators".into());
        return Err(err);
    }

    let digits = stripped.trim_start_matches('+').len();
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
        let mut err = ValidationError::new("phone_length");
        err.message = Some("Phone number must have between 7 and 15 digits".into());
        return Err(err);
    }

    Ok(())
}
