//! Phone number normalization for outgoing messages.

use crate::{AlertError, AlertResult};

/// Normalize a phone number to international form.
///
/// Spaces, dashes and parentheses are stripped and a leading `00` is read as
/// `+`. International numbers are kept as they are, a leading `0` is
/// replaced by `country_code`, anything else gets it prefixed. A number
/// with no subscriber digits after the country code is rejected.
pub fn normalize_phone(raw: &str, country_code: &str) -> AlertResult<String> {
    let invalid = || AlertError::InvalidPhone(raw.to_string());

    let stripped: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let phone = match stripped.strip_prefix("00") {
        Some(rest) => format!("+{}", rest),
        None => stripped,
    };

    let digits = phone.strip_prefix('+').unwrap_or(&phone);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let normalized = if phone.starts_with(country_code) || phone.starts_with('+') {
        phone
    } else if let Some(local) = phone.strip_prefix('0') {
        format!("{}{}", country_code, local)
    } else {
        format!("{}{}", country_code, phone)
    };

    if normalized.strip_prefix(country_code) == Some("") {
        return Err(invalid());
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_local_number() {
        assert_eq!(normalize_phone("050 123 4567", "+971").unwrap(), "+971501234567");
    }

    #[test]
    fn test_already_international() {
        assert_eq!(normalize_phone("+971 50-123-4567", "+971").unwrap(), "+971501234567");
    }

    #[test]
    fn test_bare_number_gets_prefix() {
        assert_eq!(normalize_phone("(50) 123 4567", "+971").unwrap(), "+971501234567");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(normalize_phone("", "+971").is_err());
        assert!(normalize_phone(" - ", "+971").is_err());
        assert!(normalize_phone("call me", "+971").is_err());
    }

    #[test]
    fn test_foreign_international_number_is_kept() {
        assert_eq!(normalize_phone("+44 20 7946 0958", "+971").unwrap(), "+442079460958");
    }

    #[test]
    fn test_double_zero_prefix_is_international() {
        assert_eq!(normalize_phone("00971501234567", "+971").unwrap(), "+971501234567");
        assert_eq!(normalize_phone("0044 20 7946 0958", "+971").unwrap(), "+442079460958");
    }

    #[test]
    fn test_country_code_alone_is_rejected() {
        assert!(matches!(normalize_phone("+971", "+971"), Err(AlertError::InvalidPhone(_))));
        assert!(matches!(normalize_phone("00971", "+971"), Err(AlertError::InvalidPhone(_))));
        assert!(normalize_phone("0", "+971").is_err());
        assert!(normalize_phone("+", "+971").is_err());
    }

    proptest! {
        #[test]
        fn normalized_numbers_are_stable(local in "0[1-9][0-9]{7,8}") {
            let once = normalize_phone(&local, "+971").unwrap();
            prop_assert!(once.starts_with("+971"));
            prop_assert_eq!(normalize_phone(&once, "+971").unwrap(), once.clone());
            prop_assert_eq!(once.len(), local.len() + 3);
        }
    }
}
