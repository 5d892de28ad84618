//! Environment variable expansion for configuration strings.

use crate::ConfigError;

/// Expand `${VAR}` and `${VAR:-default}` references in `value`.
///
/// # Errors
///
/// Returns [`ConfigError::EnvVar`] naming `field` when a referenced variable is
/// unset and has no default.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    shellexpand::env(value)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}} not set", e.var_name),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_value_unchanged() {
        let expanded = expand_env("sqlite://folio.db", "database.url").unwrap();

        assert_eq!(expanded, "sqlite://folio.db");
    }

    #[test]
    fn test_default_used_when_unset() {
        let expanded = expand_env(
            "${FOLIO_TEST_SURELY_UNSET_VAR:-sqlite::memory:}",
            "database.url",
        )
        .unwrap();

        assert_eq!(expanded, "sqlite::memory:");
    }

    #[test]
    fn test_unset_without_default_errors() {
        let err = expand_env("${FOLIO_TEST_SURELY_UNSET_VAR}", "database.url").unwrap_err();

        assert!(matches!(err, ConfigError::EnvVar { ref field, .. } if field == "database.url"));
        assert!(err.to_string().contains("FOLIO_TEST_SURELY_UNSET_VAR"));
    }
}
