//! Configuration management using the prefer crate for discovery.

mod loader;
mod settings;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extractors::ExtractorConfig;
use crate::llm::LlmConfig;
use crate::models::PostConfig;
use crate::publisher::TargetSiteConfig;

pub use loader::{load_settings_with_options, LoadOptions};
pub use settings::{Settings, MAX_BATCH_WORKERS};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "dailydrop.db";

/// Database URL selecting the in-memory store.
pub const MEMORY_DATABASE: &str = "memory";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename, a `sqlite:` URL, or `memory`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Per-source fetch timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Delay between requests to one domain in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_capacity: Option<usize>,
    /// Seconds a finished batch stays queryable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_retention_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_finished_batches: Option<usize>,
    /// Rule-driven extractors, in registration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extractors: Vec<ExtractorConfig>,
    /// Publication target sites by target key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub targets: BTreeMap<String, TargetSiteConfig>,
    /// Seed post configs for `post import`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub posts: Vec<PostConfig>,
    /// AI extractor backend.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// A standalone posts file: `{"posts": [...]}` or a bare list.
#[derive(Deserialize)]
#[serde(untagged)]
enum PostsFile {
    Wrapped { posts: Vec<PostConfig> },
    Bare(Vec<PostConfig>),
}

async fn parse_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
    let parsed = match ext {
        "toml" => toml::from_str(&contents).map_err(|e| e.to_string()),
        "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| e.to_string()),
        _ => serde_json::from_str(&contents).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

impl Config {
    /// Load configuration using prefer for discovery.
    /// Falls back to defaults when no file is found or it fails to parse.
    pub async fn load() -> Self {
        match prefer::load("dailydrop").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Ignoring config file: {}", e);
                        Self::default_with_env()
                    }
                },
                None => Self::default_with_env(),
            },
            Err(_) => Self::default_with_env(),
        }
    }

    /// Defaults with environment overrides applied.
    pub fn default_with_env() -> Self {
        Self {
            llm: LlmConfig::from_env(),
            ..Self::default()
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML, and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let mut config: Config = parse_file(path).await?;
        config.source_path = Some(path.to_path_buf());
        config.llm = config.llm.with_env_overrides();
        Ok(config)
    }

    /// Read post configs from a separate TOML, YAML, or JSON file.
    pub async fn load_posts(path: &Path) -> Result<Vec<PostConfig>, ConfigError> {
        Ok(match parse_file::<PostsFile>(path).await? {
            PostsFile::Wrapped { posts } => posts,
            PostsFile::Bare(posts) => posts,
        })
    }

    /// Config file's parent directory, if loaded from a file.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to `base_dir`, expanding `~`.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            if database.contains(':') || database.eq_ignore_ascii_case(MEMORY_DATABASE) {
                settings.database_url = Some(database.clone());
            } else {
                settings.database_filename = database.clone();
            }
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(n) = self.source_concurrency {
            settings.source_concurrency = n.max(1);
        }
        if let Some(n) = self.batch_workers {
            settings.batch_workers = n;
        }
        if let Some(n) = self.log_capacity {
            settings.log_capacity = n.max(1);
        }
        if let Some(secs) = self.batch_retention_secs {
            settings.batch_retention_secs = secs;
        }
        if let Some(n) = self.max_finished_batches {
            settings.max_finished_batches = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TOML: &str = r#"
data_dir = "state"
database = "drops.db"
request_timeout = 10
batch_workers = 6
batch_retention_secs = 600
max_finished_batches = 5

[[extractors]]
key = "gamehub"
hosts = ["gamehub.example"]
link_pattern = "reward"
dated_sections = true
lookback_days = 1

[targets.casino]
base_url = "https://casino.example"
username = "editor"
password_env = "CASINO_WP_PASSWORD"

[[posts]]
content_slug = "coin-master-free-spins"
post_id = 105
site_target_post_ids = { this = 105, casino = 89 }
source_urls = [{ url = "https://gamehub.example/daily" }]

[llm]
model = "qwen2.5:7b"
"#;

    #[tokio::test]
    async fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dailydrop.toml");
        tokio::fs::write(&path, SAMPLE_TOML).await.unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.extractors.len(), 1);
        assert_eq!(config.extractors[0].lookback_days, 1);
        assert_eq!(config.targets["casino"].password_env, "CASINO_WP_PASSWORD");
        assert_eq!(config.posts[0].site_target_post_ids["casino"], 89);
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, dir.path());
        assert_eq!(settings.data_dir, dir.path().join("state"));
        assert_eq!(settings.database_filename, "drops.db");
        assert_eq!(settings.request_timeout, 10);
        assert_eq!(settings.batch_workers, 6);
        assert_eq!(settings.batch_retention(), std::time::Duration::from_secs(600));
        assert_eq!(settings.max_finished_batches, 5);
    }

    #[tokio::test]
    async fn test_load_posts_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("posts.json");
        tokio::fs::write(&json, r#"[{"post_id": 7}]"#).await.unwrap();
        assert_eq!(Config::load_posts(&json).await.unwrap()[0].post_id, Some(7));

        let yaml = dir.path().join("posts.yaml");
        tokio::fs::write(&yaml, "posts:\n  - content_slug: spins\n")
            .await
            .unwrap();
        let posts = Config::load_posts(&yaml).await.unwrap();
        assert_eq!(posts[0].content_slug.as_deref(), Some("spins"));
    }

    #[tokio::test]
    async fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        tokio::fs::write(&path, "batch_workers = [").await.unwrap();
        let err = Config::load_from_path(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_memory_database_selects_url() {
        let config = Config {
            database: Some("memory".into()),
            ..Default::default()
        };
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("."));
        assert!(settings.uses_memory_store());
    }
}
