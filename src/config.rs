use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::record;
use crate::store::StoreError;

pub const DEFAULT_CONFIG_FILE: &str = "band-log.toml";
pub const ROSTER_SIZE: usize = 4;

/// Application configuration, built once at startup and handed to the store
/// and the web layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the web server listens on
    pub bind: String,
    /// Title of the remote spreadsheet holding the practice log
    pub table_name: String,
    /// The four parts of the band, in display order
    pub members: Vec<String>,
    /// Whether new rows get a generated id in a trailing column
    pub record_ids: bool,
    pub store: StoreConfig,
    pub credentials: CredentialsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            table_name: "band_app_db".to_string(),
            members: ["Saxophone", "Trombone", "Trumpet", "Rhythm"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            record_ids: true,
            store: StoreConfig::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sheets,
    File,
    Memory,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sheets" => Ok(Backend::Sheets),
            "file" => Ok(Backend::File),
            "memory" => Ok(Backend::Memory),
            other => Err(format!(
                "unknown store backend `{}` (expected sheets, file or memory)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
    /// Grid file used by the `file` backend
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sheets,
            path: PathBuf::from("band_log.bin.gz"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Environment variable holding the service-account JSON (hosted secret)
    pub secret_env: String,
    /// Service-account JSON key file on local disk
    pub key_file: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            secret_env: "BAND_LOG_SERVICE_ACCOUNT".to_string(),
            key_file: PathBuf::from("service_account.json"),
        }
    }
}

/// Where the service-account key material came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    HostedSecret(String),
    KeyFile(PathBuf),
}

/// Service-account JSON plus the source it was read from.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub source: CredentialSource,
    pub json: String,
}

impl CredentialsConfig {
    /// Sources in the order they are tried.
    pub fn sources(&self) -> [CredentialSource; 2] {
        [
            CredentialSource::HostedSecret(self.secret_env.clone()),
            CredentialSource::KeyFile(self.key_file.clone()),
        ]
    }

    /// Resolve key material from the process environment or the key file.
    pub fn resolve(&self) -> Result<KeyMaterial, StoreError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve key material, looking secrets up through `lookup`.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<KeyMaterial, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for source in self.sources() {
            match &source {
                CredentialSource::HostedSecret(name) => {
                    if name.is_empty() {
                        continue;
                    }
                    if let Some(json) = lookup(name).filter(|v| !v.trim().is_empty()) {
                        return Ok(KeyMaterial { source, json });
                    }
                }
                CredentialSource::KeyFile(path) => {
                    if !path.exists() {
                        continue;
                    }
                    let json = fs::read_to_string(path).map_err(|e| {
                        StoreError::Auth(format!("cannot read key file {}: {}", path.display(), e))
                    })?;
                    return Ok(KeyMaterial { source, json });
                }
            }
        }

        Err(StoreError::Auth(format!(
            "no credentials: set ${} or provide {}",
            self.secret_env,
            self.key_file.display()
        )))
    }
}

impl Config {
    /// Read the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Config::default());
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Config::from_toml(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            bail!("table_name must not be empty");
        }
        if self.members.len() != ROSTER_SIZE {
            bail!(
                "members must list exactly {} parts, found {}",
                ROSTER_SIZE,
                self.members.len()
            );
        }
        let mut seen = HashSet::new();
        for member in &self.members {
            if member.trim().is_empty() {
                bail!("member names must not be empty");
            }
            if !seen.insert(member.as_str()) {
                bail!("member `{}` is listed twice", member);
            }
        }
        Ok(())
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }

    /// Canonical header row for the configured schema.
    pub fn header(&self) -> Vec<String> {
        record::header(self.record_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.header().len(), 8);
        assert!(config.is_member("Rhythm"));
        assert!(!config.is_member("Drums"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            table_name = "practice"
            record_ids = false

            [store]
            backend = "file"
            "#,
        )
        .unwrap();
        assert_eq!(config.table_name, "practice");
        assert_eq!(config.store.backend, Backend::File);
        assert_eq!(config.store.path, PathBuf::from("band_log.bin.gz"));
        assert_eq!(config.header().len(), 7);
        assert_eq!(config.bind, "127.0.0.1:3000");
    }

    #[test]
    fn roster_must_have_four_distinct_members() {
        assert!(Config::from_toml(r#"members = ["A", "B", "C"]"#).is_err());
        assert!(Config::from_toml(r#"members = ["A", "B", "C", "A"]"#).is_err());
        assert!(Config::from_toml(r#"members = ["A", "B", "C", " "]"#).is_err());
        assert!(Config::from_toml(r#"members = ["A", "B", "C", "D"]"#).is_ok());
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("Sheets".parse::<Backend>(), Ok(Backend::Sheets));
        assert_eq!("memory".parse::<Backend>(), Ok(Backend::Memory));
        assert!("postgres".parse::<Backend>().is_err());
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.table_name, "band_app_db");
    }

    #[test]
    fn hosted_secret_wins_over_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("key.json");
        fs::write(&key_file, "{\"from\":\"file\"}").unwrap();
        let credentials = CredentialsConfig {
            secret_env: "BAND_SECRET".to_string(),
            key_file: key_file.clone(),
        };

        let material = credentials
            .resolve_with(|name| (name == "BAND_SECRET").then(|| "{\"from\":\"env\"}".to_string()))
            .unwrap();
        assert_eq!(material.source, CredentialSource::HostedSecret("BAND_SECRET".to_string()));
        assert!(material.json.contains("env"));

        let material = credentials.resolve_with(|_| None).unwrap();
        assert_eq!(material.source, CredentialSource::KeyFile(key_file));
        assert!(material.json.contains("file"));
    }

    #[test]
    fn blank_secret_falls_through_and_nothing_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = CredentialsConfig {
            secret_env: "BAND_SECRET".to_string(),
            key_file: dir.path().join("missing.json"),
        };
        let err = credentials.resolve_with(|_| Some("  ".to_string())).unwrap_err();
        assert!(matches!(err, StoreError::Auth(_)));
    }
}
