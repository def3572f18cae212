//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

use super::defaults::config_file_names;
use super::types::Config;
use super::validation::validate_config;

/// Load configuration from a file
///
/// `${VAR}` values are expanded from the environment and relative key paths
/// are resolved against the config file's directory before validation.
pub fn load_config(path: &Path) -> Result<Config> {
    let format = if path.extension().is_some_and(|e| e == "toml") {
        "TOML"
    } else {
        "YAML"
    };
    info!(path = %path.display(), format, "loading config");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let mut config: Config = if format == "TOML" {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    };

    expand_env(&mut config, |var| std::env::var(var).ok())?;
    if let Some(dir) = path.parent() {
        resolve_paths(&mut config, dir);
    }

    validate_config(&config)?;
    debug!(path = %path.display(), stores = config.stores.len(), "config loaded and validated");
    Ok(config)
}

/// Find configuration file in directory or parent directories.
///
/// At each directory level the search checks:
///   1. `<dir>/<name>`          (e.g. `launchpad.toml`)
///   2. `<dir>/.github/<name>`  (e.g. `.github/launchpad.toml`)
///
/// The first match wins. Parents are walked until the filesystem root.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.exists() {
                info!(path = %config_path.display(), "found config file");
                return Some(config_path);
            }

            let github_path = current.join(".github").join(name);
            if github_path.exists() {
                info!(path = %github_path.display(), "found config file in .github/");
                return Some(github_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Load configuration from directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<(Config, PathBuf)> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let config = load_config(&config_path)?;
    Ok((config, config_path))
}

/// Load configuration or use defaults
///
/// Only a missing file falls back to defaults; a file that fails to parse or
/// validate is still an error.
pub fn load_config_or_default(dir: &Path) -> Result<(Config, Option<PathBuf>)> {
    match find_config(dir) {
        Some(path) => Ok((load_config(&path)?, Some(path))),
        None => {
            warn!(dir = %dir.display(), "no config found, using defaults");
            Ok((Config::default(), None))
        }
    }
}

/// Replace `${VAR}` store config values using `lookup`
pub fn expand_env<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    for (id, entry) in config.stores.iter_mut() {
        for (key, value) in entry.config.iter_mut() {
            let Some(var) = value
                .strip_prefix("${")
                .and_then(|rest| rest.strip_suffix('}'))
            else {
                continue;
            };

            let resolved = lookup(var).ok_or_else(|| ConfigError::MissingEnv {
                field: format!("stores.{}.config.{}", id, key),
                var: var.to_string(),
            })?;
            debug!(store = %id, key = %key, var, "expanded environment reference");
            *value = resolved;
        }
    }
    Ok(())
}

/// Resolve relative `file_path` and `credentials_file` entries against `base_dir`
fn resolve_paths(config: &mut Config, base_dir: &Path) {
    // Configs found under .github/ refer to paths from the repository root
    let base_dir = if base_dir.file_name().is_some_and(|n| n == ".github") {
        base_dir.parent().unwrap_or(base_dir)
    } else {
        base_dir
    };

    for entry in config.stores.values_mut() {
        for path in [&mut entry.file_path, &mut entry.credentials_file]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use tempfile::TempDir;

    const FIREBASE_TOML: &str = "[stores.firebase]\ntype = \"apikey\"\nconfig = { api_key = \"k\" }\n";

    #[test]
    fn test_find_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("launchpad.toml");
        std::fs::write(&config_path, FIREBASE_TOML).unwrap();

        let found = find_config(temp.path());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_prefers_toml_over_yaml() {
        let temp = TempDir::new().unwrap();
        let toml_path = temp.path().join("launchpad.toml");
        let yaml_path = temp.path().join("launchpad.yaml");
        std::fs::write(&toml_path, FIREBASE_TOML).unwrap();
        std::fs::write(&yaml_path, "dispatch:\n  max_retries: 1\n").unwrap();

        let found = find_config(temp.path()).unwrap();
        assert_eq!(found, toml_path);
    }

    #[test]
    fn test_find_config_in_github_dir() {
        let temp = TempDir::new().unwrap();
        let github_dir = temp.path().join(".github");
        std::fs::create_dir_all(&github_dir).unwrap();
        let config_path = github_dir.join("launchpad.toml");
        std::fs::write(&config_path, FIREBASE_TOML).unwrap();

        let found = find_config(temp.path());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_walks_parents() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("launchpad.toml");
        std::fs::write(&config_path, FIREBASE_TOML).unwrap();
        let nested = temp.path().join("apps").join("android");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config(&nested), Some(config_path));
    }

    #[test]
    fn test_load_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("launchpad.toml");
        std::fs::write(
            &config_path,
            "[dispatch]\nmax_retries = 5\nbase_delay_ms = 250\n\n[stores.xiaomi]\ntype = \"rsa\"\nfile_path = \"keys/xiaomi.pem\"\nconfig = { user_name = \"dev\" }\n",
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.dispatch.max_retries, 5);
        assert_eq!(config.dispatch.base_delay_ms, 250);
        assert_eq!(
            config.stores["xiaomi"].file_path.as_deref(),
            Some(temp.path().join("keys/xiaomi.pem").as_path())
        );
    }

    #[test]
    fn test_load_config_yaml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("launchpad.yaml");
        std::fs::write(
            &config_path,
            "stores:\n  vivo:\n    type: hmac\n    config:\n      secret: s\n      access_key: ak\nrate_limits:\n  vivo:\n    capacity: 2\n    refill_rate: 0.5\n",
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.enabled_stores(), vec!["vivo"]);
        assert_eq!(config.rate_limits["vivo"].refill_rate, 0.5);
    }

    #[test]
    fn test_github_config_resolves_paths_from_repository_root() {
        let temp = TempDir::new().unwrap();
        let github_dir = temp.path().join(".github");
        std::fs::create_dir_all(&github_dir).unwrap();
        let config_path = github_dir.join("launchpad.toml");
        std::fs::write(
            &config_path,
            "[stores.google-play]\ntype = \"oauth2\"\nfile_path = \"keys/play.json\"\n",
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(
            config.stores["google-play"].file_path.as_deref(),
            Some(temp.path().join("keys/play.json").as_path())
        );
    }

    #[test]
    fn test_invalid_config_is_not_replaced_by_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("launchpad.toml"),
            "[stores.firebase]\ntype = \"hmac\"\nconfig = { secret = \"s\" }\n",
        )
        .unwrap();

        assert!(load_config_or_default(temp.path()).is_err());
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let (config, path) = load_config_or_default(temp.path()).unwrap();
        assert!(path.is_none());
        assert!(config.stores.is_empty());
    }

    #[test]
    fn test_expand_env() {
        let mut config: Config = toml::from_str(
            "[stores.vivo]\ntype = \"hmac\"\nconfig = { secret = \"${VIVO_SECRET}\", access_key = \"plain\" }\n",
        )
        .unwrap();

        expand_env(&mut config, |var| (var == "VIVO_SECRET").then(|| "s3cret".to_string()))
            .unwrap();
        let entry = &config.stores["vivo"];
        assert_eq!(entry.config["secret"], "s3cret");
        assert_eq!(entry.config["access_key"], "plain");
    }

    #[test]
    fn test_expand_env_missing_variable() {
        let mut config: Config =
            toml::from_str("[stores.firebase]\ntype = \"apikey\"\nconfig = { api_key = \"${NOPE}\" }\n")
                .unwrap();

        let err = expand_env(&mut config, |_| None).unwrap_err();
        match err {
            CoreError::Config(ConfigError::MissingEnv { field, var }) => {
                assert_eq!(field, "stores.firebase.config.api_key");
                assert_eq!(var, "NOPE");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_default_template_is_valid() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("launchpad.toml");
        std::fs::write(&config_path, crate::config::DEFAULT_CONFIG_TEMPLATE).unwrap();

        let config = load_config(&config_path).unwrap();
        assert!(config.stores.is_empty());
        assert_eq!(config.dispatch.max_retries, 3);
    }
}
