use std::env;

use crate::ResearchError;

/// Wrapper around sensitive values to reduce accidental logging.
#[derive(Clone)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***redacted***")
    }
}

/// Read a secret from the environment, treating unset and blank the same.
/// Used directly for secrets that merely unlock optional behaviour.
pub fn optional_env(var: &str) -> Option<SecretValue> {
    env::var(var)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(SecretValue)
}

/// Require that a given environment variable is set and non-empty.
pub fn require_env(var: &str) -> Result<SecretValue, ResearchError> {
    optional_env(var).ok_or_else(|| ResearchError::MissingSecret(var.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_env_success() {
        unsafe { std::env::set_var("WEBSCOUT_TEST_SECRET", "value"); }
        let secret = require_env("WEBSCOUT_TEST_SECRET").expect("secret should load");
        assert_eq!(secret.expose(), "value");
    }

    #[test]
    fn require_env_missing() {
        unsafe { std::env::remove_var("WEBSCOUT_TEST_SECRET_MISSING"); }
        let err = require_env("WEBSCOUT_TEST_SECRET_MISSING").unwrap_err();
        assert!(matches!(err, ResearchError::MissingSecret(_)));
    }

    #[test]
    fn optional_env_treats_blank_as_absent() {
        unsafe { std::env::set_var("WEBSCOUT_TEST_SECRET_BLANK", "   "); }
        assert!(optional_env("WEBSCOUT_TEST_SECRET_BLANK").is_none());

        unsafe { std::env::set_var("WEBSCOUT_TEST_SECRET_BLANK", "key"); }
        let secret = optional_env("WEBSCOUT_TEST_SECRET_BLANK").expect("secret should load");
        assert_eq!(secret.expose(), "key");
    }

    #[test]
    fn secret_debug_is_redacted() {
        unsafe { std::env::set_var("WEBSCOUT_TEST_SECRET_DEBUG", "hunter2"); }
        let secret = require_env("WEBSCOUT_TEST_SECRET_DEBUG").unwrap();
        assert_eq!(format!("{secret:?}"), "***redacted***");
    }
}
