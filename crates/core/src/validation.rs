//! Input validation utilities.
//!
//! Free-text fields arrive straight from front-desk and clinical forms. These helpers normalise
//! them and reject values that could not be displayed safely on a shared queue board.

use crate::constants::MAX_FREE_TEXT_LEN;
use crate::{FlowError, FlowResult};

/// Normalises an optional free-text field (reason, notes).
///
/// Leading/trailing whitespace is trimmed and an empty result becomes `None`.
///
/// # Errors
///
/// Returns [`FlowError::Validation`] if the text exceeds [`MAX_FREE_TEXT_LEN`] characters or
/// contains control characters other than newlines and tabs.
pub fn normalise_free_text(field: &str, value: Option<String>) -> FlowResult<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if trimmed.chars().count() > MAX_FREE_TEXT_LEN {
        return Err(FlowError::Validation(format!(
            "{field} exceeds maximum length of {MAX_FREE_TEXT_LEN} characters"
        )));
    }

    if trimmed
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\t')
    {
        return Err(FlowError::Validation(format!(
            "{field} contains control characters"
        )));
    }

    Ok(Some(trimmed.to_string()))
}

/// Manual-order positions are 1-based.
pub fn validate_manual_order(position: i32) -> FlowResult<i32> {
    if position < 1 {
        return Err(FlowError::Validation(format!(
            "manual order must be a positive position, got {position}"
        )));
    }
    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_becomes_none() {
        assert_eq!(normalise_free_text("notes", Some("   ".into())).unwrap(), None);
        assert_eq!(normalise_free_text("notes", None).unwrap(), None);
    }

    #[test]
    fn text_is_trimmed() {
        assert_eq!(
            normalise_free_text("reason", Some("  fever \n".into())).unwrap(),
            Some("fever".to_string())
        );
    }

    #[test]
    fn control_characters_are_rejected() {
        let err = normalise_free_text("notes", Some("bad\u{7}bell".into())).unwrap_err();
        assert!(err.to_string().contains("notes"));
    }

    #[test]
    fn overlong_text_is_rejected() {
        let long = "x".repeat(MAX_FREE_TEXT_LEN + 1);
        assert!(normalise_free_text("reason", Some(long)).is_err());
    }

    #[test]
    fn manual_order_must_be_positive() {
        assert!(validate_manual_order(0).is_err());
        assert_eq!(validate_manual_order(3).unwrap(), 3);
    }
}
