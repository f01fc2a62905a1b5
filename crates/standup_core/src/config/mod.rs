use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "standup";
const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_ENV_VAR: &str = "STANDUP_CONFIG_PATH";

/// Canonical spelling of a config key or CSV header: lowercase ASCII
/// alphanumerics with single underscores between words.
pub fn canonical_name(raw: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default)]
    pub settings_path: Option<PathBuf>,
    /// `tracing` filter directive, e.g. `standup_core=debug`.
    #[serde(default)]
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub error: Option<AppError>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub store_path: Option<PathBuf>,
    pub settings_path: Option<PathBuf>,
    pub log_filter: Option<String>,
}

pub fn app_dir() -> Result<PathBuf, AppError> {
    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join(APP_DIR_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home).join(".config").join(APP_DIR_NAME))
    }
}

pub fn config_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    Ok(app_dir()?.join(CONFIG_FILE_NAME))
}

pub fn load_config_with_fallback() -> ConfigLoad {
    match config_path() {
        Ok(path) => load_config_with_fallback_from_path(&path),
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_with_fallback_from_path(path: &Path) -> ConfigLoad {
    if !path.exists() {
        return ConfigLoad {
            config: Config::default(),
            error: None,
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigLoad {
            config,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_from_path(path: &Path) -> Result<Config, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    let config: Config = serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })?;
    Ok(normalize_config(config))
}

fn normalize_config(mut config: Config) -> Config {
    config.log_filter = config
        .log_filter
        .map(|filter| filter.trim().to_string())
        .filter(|filter| !filter.is_empty());
    config.store_path = config
        .store_path
        .filter(|path| !path.as_os_str().is_empty());
    config.settings_path = config
        .settings_path
        .filter(|path| !path.as_os_str().is_empty());
    config
}

pub fn merge_overrides(base: &Config, overrides: &ConfigOverrides) -> Config {
    let mut merged = base.clone();
    if let Some(path) = overrides.store_path.as_ref() {
        merged.store_path = Some(path.clone());
    }
    if let Some(path) = overrides.settings_path.as_ref() {
        merged.settings_path = Some(path.clone());
    }
    if let Some(filter) = overrides.log_filter.as_ref() {
        merged.log_filter = Some(filter.clone());
    }
    normalize_config(merged)
}

#[cfg(test)]
mod tests {
    use super::{
        Config, ConfigOverrides, canonical_name, load_config_from_path,
        load_config_with_fallback_from_path, merge_overrides,
    };
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(file_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("standup-{nanos}-{file_name}"))
    }

    #[test]
    fn load_config_missing_returns_defaults_without_error() {
        let path = temp_path("missing-config.json");
        let result = load_config_with_fallback_from_path(&path);

        assert_eq!(result.config, Config::default());
        assert!(result.error.is_none());
    }

    #[test]
    fn load_config_invalid_returns_defaults_and_error() {
        let path = temp_path("invalid-config.json");
        fs::write(&path, "{ invalid json ").unwrap();

        let result = load_config_with_fallback_from_path(&path);
        fs::remove_file(&path).ok();

        assert_eq!(result.config, Config::default());
        assert_eq!(result.error.unwrap().code(), "invalid_data");
    }

    #[test]
    fn load_config_reads_valid_file() {
        let path = temp_path("valid-config.json");
        let content = serde_json::json!({
            "store_path": "/var/lib/standup/tasks.json",
            "log_filter": "  standup_core=debug "
        });
        fs::write(&path, serde_json::to_string(&content).unwrap()).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(
            loaded.store_path,
            Some(PathBuf::from("/var/lib/standup/tasks.json"))
        );
        assert_eq!(loaded.settings_path, None);
        assert_eq!(loaded.log_filter.as_deref(), Some("standup_core=debug"));
    }

    #[test]
    fn merge_overrides_replaces_only_given_values() {
        let base = Config {
            store_path: Some("/a/tasks.json".into()),
            settings_path: Some("/a/settings.json".into()),
            log_filter: None,
        };
        let overrides = ConfigOverrides {
            store_path: Some("/b/tasks.json".into()),
            log_filter: Some("debug".into()),
            ..ConfigOverrides::default()
        };

        let merged = merge_overrides(&base, &overrides);

        assert_eq!(merged.store_path, Some(PathBuf::from("/b/tasks.json")));
        assert_eq!(merged.settings_path, Some(PathBuf::from("/a/settings.json")));
        assert_eq!(merged.log_filter.as_deref(), Some("debug"));
        assert_eq!(base.store_path, Some(PathBuf::from("/a/tasks.json")));
    }

    #[test]
    fn merge_overrides_with_empty_overrides_returns_clone() {
        let base = Config {
            store_path: Some("/a/tasks.json".into()),
            ..Config::default()
        };
        assert_eq!(merge_overrides(&base, &ConfigOverrides::default()), base);
    }

    #[test]
    fn canonical_name_maps_variants() {
        assert_eq!(canonical_name("Current Action Plan"), Some("current_action_plan".into()));
        assert_eq!(canonical_name("  ID "), Some("id".into()));
        assert_eq!(canonical_name("Due-Date"), Some("due_date".into()));
        assert_eq!(canonical_name("store.path"), Some("store_path".into()));
        assert_eq!(canonical_name(" -- "), None);
    }
}
