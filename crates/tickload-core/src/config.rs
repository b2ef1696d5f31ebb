//! Engine configuration file (JSON)

use crate::error::TickloadError;
use std::path::Path;
use tickload_types::EngineConfig;
use tracing::debug;

/// Load the configuration at `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<EngineConfig, TickloadError> {
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: EngineConfig = serde_json::from_str(&content)
        .map_err(|e| TickloadError::Config(format!("{}: {}", path.display(), e)))?;

    if config.chunk_size == 0 {
        return Err(TickloadError::Config(format!(
            "{}: chunk_size must be greater than zero",
            path.display()
        )));
    }

    Ok(config)
}

/// Write `config` to `path`, creating parent directories
pub fn save_config(path: &Path, config: &EngineConfig) -> Result<(), TickloadError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content =
        serde_json::to_string_pretty(config).map_err(|e| TickloadError::Config(e.to_string()))?;
    std::fs::write(path, content)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "speed_limit": 2048, "sync_writes": false }"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.speed_limit, Some(2048));
        assert!(!config.sync_writes);
        assert_eq!(config.chunk_size, EngineConfig::default().chunk_size);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = EngineConfig {
            chunk_size: 4096,
            tick_interval_ms: 33,
            ..EngineConfig::default()
        };

        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ chunk_size: ").unwrap();
        assert!(matches!(load_config(&path), Err(TickloadError::Config(_))));

        std::fs::write(&path, r#"{ "chunk_size": 0 }"#).unwrap();
        assert!(matches!(load_config(&path), Err(TickloadError::Config(_))));
    }
}
