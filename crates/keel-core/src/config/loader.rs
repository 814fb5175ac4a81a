//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

use super::defaults::config_file_names;
use super::types::Config;
use super::validation::validate_config;

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<Config> {
    info!(path = %path.display(), "loading config");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config: Config = toml::from_str(&content).map_err(ConfigError::TomlError)?;

    // Scan roots are relative to the file that declares them
    if let Some(base) = path.parent() {
        let base = match base.file_name() {
            Some(name) if name == ".github" => base.parent().unwrap_or(base),
            _ => base,
        };
        for root in &mut config.scan.roots {
            if root.is_relative() {
                *root = base.join(&*root);
            }
        }
    }

    validate_config(&config)?;
    debug!(path = %path.display(), "config loaded and validated");
    Ok(config)
}

/// Find configuration file in directory or parent directories.
///
/// At each directory level the search checks `<dir>/<name>` and then
/// `<dir>/.github/<name>`. The first match wins.
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

/// Load configuration or use defaults.
///
/// Default scan roots are resolved against `dir`.
pub fn load_config_or_default(dir: &Path) -> (Config, Option<PathBuf>) {
    match load_config_from_dir(dir) {
        Ok((config, path)) => (config, Some(path)),
        Err(e) => {
            if !matches!(e, crate::KeelError::Config(ConfigError::NotFound(_))) {
                warn!(dir = %dir.display(), error = %e, "invalid config, using defaults");
            } else {
                warn!(dir = %dir.display(), "no config found, using defaults");
            }
            let mut config = Config::default();
            config.scan.roots = vec![dir.to_path_buf()];
            (config, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("keel.toml");
        std::fs::write(&config_path, "[git]\nremote = \"origin\"").unwrap();

        let found = find_config(temp.path());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(".keel.toml");
        std::fs::write(&config_path, "").unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config(&nested), Some(config_path));
    }

    #[test]
    fn test_find_config_in_github_dir() {
        let temp = TempDir::new().unwrap();
        let github_dir = temp.path().join(".github");
        std::fs::create_dir_all(&github_dir).unwrap();
        let config_path = github_dir.join("keel.toml");
        std::fs::write(&config_path, "").unwrap();

        assert_eq!(find_config(temp.path()), Some(config_path));
    }

    #[test]
    fn test_load_config_resolves_relative_roots() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("keel.toml");
        std::fs::write(
            &config_path,
            "[scan]\nroots = [\"repos\", \"/abs\"]\nallow = [\"example.com/*\"]\n",
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.scan.roots[0], temp.path().join("repos"));
        assert_eq!(config.scan.roots[1], PathBuf::from("/abs"));
        assert_eq!(config.scan.allow, vec!["example.com/*".to_string()]);
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("keel.toml");
        std::fs::write(&config_path, "[git]\ntimeout_secs = 0\n").unwrap();

        assert!(load_config(&config_path).is_err());
    }

    #[test]
    fn test_load_config_or_default_scans_dir() {
        let temp = TempDir::new().unwrap();
        let (config, path) = load_config_or_default(temp.path());
        assert!(path.is_none());
        assert_eq!(config.scan.roots, vec![temp.path().to_path_buf()]);
    }
}
