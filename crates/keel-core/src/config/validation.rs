//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::{Config, ModuleAllowList};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_scan(config)?;
    validate_git(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_scan(config: &Config) -> Result<()> {
    if config.scan.roots.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "scan.roots".to_string(),
            message: "at least one scan root is required".to_string(),
        }
        .into());
    }

    ModuleAllowList::new(&config.scan.allow)?;
    Ok(())
}

fn validate_git(config: &Config) -> Result<()> {
    if config.git.remote.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "git.remote".to_string(),
            message: "remote cannot be empty".to_string(),
        }
        .into());
    }

    if config.git.timeout_secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: "git.timeout_secs".to_string(),
            message: "timeout must be greater than zero".to_string(),
        }
        .into());
    }

    Ok(())
}
