use once_cell::sync::Lazy;
use std::fs;
use std::time::Duration;

use crate::error::{CustodyError, CustodyResult};

/// Key Vault REST API version appended to every request. Defaults to `7.4`.
pub static KMS_API_VERSION: Lazy<String> = Lazy::new(|| {
    read_optional_env("KMS_API_VERSION").unwrap_or_else(|| "7.4".to_string())
});

/// Per-request timeout for key vault calls. Defaults to 30 seconds.
pub static KMS_REQUEST_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("KMS_REQUEST_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(30)
});

/// Name the CLI registers the key vault store under. Defaults to `remote`.
pub static KMS_SERVICE_REFERENCE: Lazy<String> = Lazy::new(|| {
    read_optional_env("KMS_SERVICE_REFERENCE").unwrap_or_else(|| "remote".to_string())
});

#[derive(Clone, Debug)]
pub struct KeyVaultClientConfig {
    pub vault_url: String,
    pub access_token: Option<String>,
    pub api_version: String,
    pub timeout: Duration,
}

impl KeyVaultClientConfig {
    pub fn new(vault_url: impl Into<String>) -> Self {
        Self {
            vault_url: vault_url.into().trim_end_matches('/').to_string(),
            access_token: None,
            api_version: KMS_API_VERSION.clone(),
            timeout: Duration::from_secs(*KMS_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Reads `KMS_VAULT_URL` plus an optional bearer token from `KMS_ACCESS_TOKEN`
    /// or `KMS_ACCESS_TOKEN_FILE` (the file takes precedence).
    pub fn from_env() -> CustodyResult<Self> {
        let vault_url = read_optional_env("KMS_VAULT_URL")
            .ok_or_else(|| CustodyError::Configuration("KMS_VAULT_URL must be set".into()))?;
        let mut config = Self::new(vault_url);
        config.access_token = read_secret_env("KMS_ACCESS_TOKEN", "KMS_ACCESS_TOKEN_FILE")?;
        Ok(config)
    }
}

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_secret_env(value_key: &str, file_key: &str) -> CustodyResult<Option<String>> {
    if let Some(path) = read_optional_env(file_key) {
        let contents = fs::read_to_string(&path).map_err(|err| {
            CustodyError::Configuration(format!("failed to read {file_key} from {path}: {err}"))
        })?;
        let trimmed = contents.trim().to_string();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed));
        }
    }

    Ok(read_optional_env(value_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn vault_url_loses_trailing_slash() {
        let config = KeyVaultClientConfig::new("https://unit.vault.test/");
        assert_eq!(config.vault_url, "https://unit.vault.test");
        assert!(config.access_token.is_none());
    }

    #[test]
    fn secret_file_wins_over_plain_value() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  token-from-file  ").unwrap();
        std::env::set_var("KMS_TEST_TOKEN_FILE", file.path());
        std::env::set_var("KMS_TEST_TOKEN", "token-from-env");

        let token = read_secret_env("KMS_TEST_TOKEN", "KMS_TEST_TOKEN_FILE").unwrap();
        assert_eq!(token.as_deref(), Some("token-from-file"));
    }

    #[test]
    fn unreadable_secret_file_is_a_configuration_error() {
        std::env::set_var("KMS_MISSING_TOKEN_FILE", "/nonexistent/kms/token");
        let err = read_secret_env("KMS_MISSING_TOKEN", "KMS_MISSING_TOKEN_FILE")
            .expect_err("missing file should error");
        assert!(matches!(err, CustodyError::Configuration(_)));
    }
}
