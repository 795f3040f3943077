pub mod schema;

pub use schema::PlatformConfig;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default agentvault home directory (~/.agentvault).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".agentvault"))
        .unwrap_or_else(|| PathBuf::from(".agentvault"))
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<PlatformConfig> {
    if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read agentvault config file")?;
        let config: PlatformConfig =
            toml::from_str(&contents).context("Failed to parse agentvault config (TOML)")?;
        Ok(config)
    } else {
        Ok(PlatformConfig::default())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &PlatformConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_toml() {
        let config = PlatformConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: PlatformConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.max_agents_per_user, config.max_agents_per_user);
        assert_eq!(parsed.deployment_fee, config.deployment_fee);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/agentvault.toml")).unwrap();
        assert_eq!(config.name, "agentvault");
    }
}
