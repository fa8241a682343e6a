//! Configuration for docqa services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (DOCQA__ prefix, `__` as section separator)
//! 2. Config file (docqa.toml)
//! 3. Defaults

use serde::{Deserialize, Serialize};

use crate::types::Organization;

/// How uploaded files become documents.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// One document per uploaded file.
    #[default]
    PerFile,
    /// All files joined into a single document.
    SingleCombined,
}

impl std::str::FromStr for MergeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "per_file" => Ok(Self::PerFile),
            "single_combined" | "combined" => Ok(Self::SingleCombined),
            _ => Err(format!(
                "Invalid merge mode: {s}. Choose: per-file, single-combined"
            )),
        }
    }
}

/// What an ingestion does when some files cannot be read.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartialFailurePolicy {
    /// Any unreadable file aborts the whole ingestion.
    #[default]
    Abort,
    /// Build from the readable files and report the rest as skipped.
    SkipFailed,
}

/// A configured secret. Never printed by `Debug` or written by `Serialize`.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

const REDACTED: &str = "***";

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret({REDACTED})")
    }
}

impl Serialize for Secret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

/// Top-level configuration.
///
/// Loaded from `docqa.toml` or `DOCQA__` environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocQaConfig {
    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Organization new sessions start under.
    #[serde(default)]
    pub organization: Organization,
}

/// Credentials accepted by the login check.
///
/// Empty username or password means no login succeeds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: Secret,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub merge_mode: MergeMode,

    /// Separator placed between file texts in single-combined mode.
    #[serde(default = "default_separator")]
    pub combined_separator: String,

    #[serde(default)]
    pub partial_failure: PartialFailurePolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Directory holding one JSON file per session.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Directory for the local knowledge index.
    #[serde(default = "default_index_dir")]
    pub index_dir: String,

    /// Passages returned per answer by the local engine.
    #[serde(default = "default_max_passages")]
    pub max_passages: usize,

    /// Caller-side limit on a knowledge-base build, in seconds.
    #[serde(default)]
    pub build_timeout_secs: Option<u64>,

    /// Caller-side limit on a single query, in seconds.
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,
}

fn default_separator() -> String {
    "\n\n".to_string()
}

fn default_store_dir() -> String {
    "./sessions".to_string()
}

fn default_index_dir() -> String {
    "./knowledge".to_string()
}

fn default_max_passages() -> usize {
    3
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            merge_mode: MergeMode::default(),
            combined_separator: default_separator(),
            partial_failure: PartialFailurePolicy::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_dir: default_index_dir(),
            max_passages: default_max_passages(),
            build_timeout_secs: None,
            query_timeout_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DocQaConfig::default();
        assert_eq!(config.ingest.merge_mode, MergeMode::PerFile);
        assert_eq!(config.ingest.combined_separator, "\n\n");
        assert_eq!(config.ingest.partial_failure, PartialFailurePolicy::Abort);
        assert_eq!(config.session.store_dir, "./sessions");
        assert_eq!(config.engine.max_passages, 3);
        assert_eq!(config.organization, Organization::Pedagogy);
        assert!(config.auth.password.is_empty());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: DocQaConfig = serde_json::from_value(serde_json::json!({
            "auth": {"username": "admin", "password": "hunter2"},
            "ingest": {"merge_mode": "single_combined"},
            "organization": "al_fayhaa",
        }))
        .unwrap();

        assert_eq!(config.auth.password.expose(), "hunter2");
        assert_eq!(config.ingest.merge_mode, MergeMode::SingleCombined);
        assert_eq!(config.ingest.combined_separator, "\n\n");
        assert_eq!(config.organization, Organization::AlFayhaa);
        assert_eq!(config.engine.index_dir, "./knowledge");
    }

    #[test]
    fn test_secret_is_redacted() {
        let auth = AuthConfig {
            username: "admin".into(),
            password: Secret::new("hunter2"),
        };
        let printed = format!("{auth:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("admin"));
    }

    #[test]
    fn test_secret_is_not_serialized() {
        let json = serde_json::to_string(&Secret::new("hunter2")).unwrap();
        assert_eq!(json, "\"***\"");
    }

    #[test]
    fn test_merge_mode_parsing() {
        assert_eq!("per-file".parse::<MergeMode>(), Ok(MergeMode::PerFile));
        assert_eq!(
            "single-combined".parse::<MergeMode>(),
            Ok(MergeMode::SingleCombined)
        );
        assert!("zip".parse::<MergeMode>().is_err());
    }
}
