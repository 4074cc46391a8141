/// Why a request was refused by [`check_api_key`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("API_KEY not set in environment")]
    NotConfigured,
    #[error("Invalid API key")]
    InvalidKey,
}

/// Validates the provided API key against the key configured at startup (`API_KEY`).
///
/// Returns `Ok(())` if the key matches, or an error if it does not or no key is configured.
pub fn check_api_key(expected_key: Option<&str>, provided_key: &str) -> Result<(), AuthError> {
    let expected_key = expected_key
        .filter(|k| !k.is_empty())
        .ok_or(AuthError::NotConfigured)?;

    if provided_key == expected_key {
        Ok(())
    } else {
        Err(AuthError::InvalidKey)
    }
}
