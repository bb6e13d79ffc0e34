//! Configuration file handling.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use concord_auth::{GithubConfiguration, OidcConfiguration};

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_tenant() -> String {
    "default".into()
}

fn default_log_filter() -> String {
    "info".into()
}

/// Where the membership store lives.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding tenant databases.
    #[serde(default = "default_data_dir")]
    pub path: PathBuf,
    /// Tenant database name.
    #[serde(default = "default_tenant")]
    pub tenant: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir(),
            tenant: default_tenant(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Top-level `concord.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConcordConfig {
    /// Membership store.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
    /// OIDC provider, if enabled.
    #[serde(default)]
    pub oidc: Option<OidcConfiguration>,
    /// GitHub provider, if enabled.
    #[serde(default)]
    pub github: Option<GithubConfiguration>,
}

impl ConcordConfig {
    /// Loads the configuration file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parses configuration from TOML text.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ConcordConfig::load(Path::new("/nonexistent/concord.toml")).unwrap();

        assert_eq!(config.database.tenant, "default");
        assert_eq!(config.log.filter, "info");
        assert!(config.oidc.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let config = ConcordConfig::parse(
            r#"
            [database]
            path = "/var/lib/concord"
            tenant = "acme"

            [log]
            filter = "concord=debug"

            [oidc]
            endpoint = "https://idp.example.com"
            key = "concord"
            algorithm = "HS256"
            secret = "shared-secret"

            [github]
            key = "client-id"
            secret = "client-secret"
            organization = "Galaxy"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/var/lib/concord"));
        assert_eq!(config.database.tenant, "acme");
        assert_eq!(config.log.filter, "concord=debug");

        let oidc = config.oidc.unwrap();
        assert_eq!(oidc.algorithm, "HS256");
        assert_eq!(oidc.id_token_max_age, 600);

        let github = config.github.unwrap();
        assert_eq!(github.organization.as_deref(), Some("Galaxy"));
        assert_eq!(github.member_role, "member");
    }

    #[test]
    fn test_rejects_unknown_types() {
        let result = ConcordConfig::parse("[database]\ntenant = 5\n");
        assert!(result.is_err());
    }
}
