//! Configuration loading and merging logic.

use std::path::{Path, PathBuf};

use super::{Config, Settings};

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Data directory (--data flag).
    pub data: Option<PathBuf>,
}

/// Look for a config file inside the data directory.
fn find_config_in_data_dir(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["toml", "yaml", "yml", "json"];
    let basenames = ["dailydrop", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        current_dir().join(path)
    }
}

async fn load_config_from_sources(options: &LoadOptions, data_dir: Option<&PathBuf>) -> Config {
    // Priority 1: Explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return match Config::load_from_path(config_path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("{}", e);
                Config::default_with_env()
            }
        };
    }

    // Priority 2: Config inside the data dir
    if let Some(config_path) = data_dir.and_then(|d| find_config_in_data_dir(d)) {
        tracing::debug!("Found config in data dir: {}", config_path.display());
        match Config::load_from_path(&config_path).await {
            Ok(config) => return config,
            Err(e) => tracing::warn!("Ignoring config file: {}", e),
        }
    }

    // Priority 3: Auto-discover via prefer
    Config::load().await
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let data_dir_override = options.data.as_deref().map(absolute);
    let config = load_config_from_sources(&options, data_dir_override.as_ref()).await;

    let mut settings = Settings::default();

    let base_dir = if options.use_cwd {
        current_dir()
    } else {
        config.base_dir().unwrap_or_else(current_dir)
    };

    config.apply_to_settings(&mut settings, &base_dir);

    // --data override takes precedence over the config file
    if let Some(data_dir) = data_dir_override {
        settings.data_dir = data_dir;
    }

    // DATABASE_URL environment variable takes highest precedence
    if let Some(database_url) = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()) {
        tracing::debug!("Using DATABASE_URL from environment: {}", database_url);
        settings.database_url = Some(database_url);
    }

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_explicit_config_and_data_override() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("custom.toml");
        tokio::fs::write(&config_path, "data_dir = \"from-config\"\nbatch_workers = 2\n")
            .await
            .unwrap();

        let (settings, config) = load_settings_with_options(LoadOptions {
            config_path: Some(config_path.clone()),
            use_cwd: false,
            data: None,
        })
        .await;
        assert_eq!(config.source_path.as_deref(), Some(config_path.as_path()));
        assert_eq!(settings.data_dir, dir.path().join("from-config"));
        assert_eq!(settings.batch_workers, 2);

        let override_dir = dir.path().join("override");
        let (settings, _) = load_settings_with_options(LoadOptions {
            config_path: Some(config_path),
            use_cwd: false,
            data: Some(override_dir.clone()),
        })
        .await;
        assert_eq!(settings.data_dir, override_dir);
    }

    #[test]
    fn test_find_config_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_config_in_data_dir(dir.path()).is_none());
        std::fs::write(dir.path().join("config.yaml"), "batch_workers: 3\n").unwrap();
        assert_eq!(
            find_config_in_data_dir(dir.path()),
            Some(dir.path().join("config.yaml"))
        );
    }
}
