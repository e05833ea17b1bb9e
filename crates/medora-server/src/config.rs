use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Prefix of returned file urls, e.g. `https://api.example.com`. Empty
    /// means urls relative to this server.
    pub public_file_base: String,
}

impl ServerConfig {
    /// Read `MEDORA_*` variables; call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("MEDORA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MEDORA_JWT_SECRET is unset or still a placeholder; it must match the auth service's secret");
        }

        let port = match lookup("MEDORA_PORT") {
            Some(v) => v.parse().with_context(|| format!("invalid MEDORA_PORT '{}'", v))?,
            None => 3000,
        };
        let max_upload_bytes = match lookup("MEDORA_MAX_UPLOAD_BYTES") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid MEDORA_MAX_UPLOAD_BYTES '{}'", v))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            host: lookup("MEDORA_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: lookup("MEDORA_DB_PATH").unwrap_or_else(|| "medora.db".into()).into(),
            jwt_secret,
            upload_dir: lookup("MEDORA_UPLOAD_DIR").unwrap_or_else(|| "./uploads".into()).into(),
            max_upload_bytes,
            public_file_base: lookup("MEDORA_PUBLIC_FILE_BASE").unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = ServerConfig::from_lookup(lookup(&[("MEDORA_JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("medora.db"));
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert!(config.public_file_base.is_empty());
    }

    #[test]
    fn missing_or_placeholder_secret_is_fatal() {
        assert!(ServerConfig::from_lookup(lookup(&[])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("MEDORA_JWT_SECRET", "dev-secret-change-me")])).is_err());
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let result = ServerConfig::from_lookup(lookup(&[
            ("MEDORA_JWT_SECRET", "s3cret"),
            ("MEDORA_PORT", "eighty"),
        ]));
        assert!(result.is_err());

        let config = ServerConfig::from_lookup(lookup(&[
            ("MEDORA_JWT_SECRET", "s3cret"),
            ("MEDORA_PORT", "8080"),
            ("MEDORA_MAX_UPLOAD_BYTES", "1024"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_upload_bytes, 1024);
    }
}
