//! CLI configuration, stored in ~/.photoid/faceid/config.yaml.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_DIR: &str = ".photoid";
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DATABASE_FILE: &str = "faceid.redb";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Directory holding the identity database. Defaults to the `data`
    /// directory next to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Where thumbnails are written. Defaults to `<data_dir>/thumbnails`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_dir: Option<PathBuf>,

    /// Matching engine settings.
    #[serde(default)]
    pub engine: photoid_faceid::Config,

    #[serde(skip)]
    config_path: PathBuf,
}

impl CliConfig {
    pub fn default_config_path(app_name: &str) -> Option<PathBuf> {
        dirs::home_dir().map(|home| {
            home.join(DEFAULT_BASE_DIR)
                .join(app_name)
                .join(DEFAULT_CONFIG_FILE)
        })
    }

    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => self
                .config_path
                .parent()
                .map(|p| p.join("data"))
                .unwrap_or_else(|| PathBuf::from("data")),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(DATABASE_FILE)
    }

    pub fn thumbnail_dir(&self) -> PathBuf {
        self.thumbnail_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("thumbnails"))
    }
}

/// Loads the configuration, writing a default file if none exists.
pub fn load_config(app_name: &str, custom_path: Option<&str>) -> anyhow::Result<CliConfig> {
    let config_path = match custom_path {
        Some(p) => PathBuf::from(p),
        None => CliConfig::default_config_path(app_name)
            .ok_or_else(|| anyhow::anyhow!("cannot determine config path"))?,
    };

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut cfg: CliConfig = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        serde_yaml::from_str(&content)?
    } else {
        let cfg = CliConfig::default();
        std::fs::write(&config_path, serde_yaml::to_string(&cfg)?)?;
        cfg
    };
    cfg.engine
        .validate()
        .map_err(|e| anyhow::anyhow!("{}: {e}", config_path.display()))?;
    cfg.config_path = config_path;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faceid").join("config.yaml");
        let cfg = load_config("faceid", path.to_str()).unwrap();

        assert!(path.exists());
        assert_eq!(cfg.engine.dim, 128);
        assert_eq!(cfg.data_dir(), dir.path().join("faceid").join("data"));
        assert_eq!(
            cfg.thumbnail_dir(),
            dir.path().join("faceid").join("data").join("thumbnails")
        );
    }

    #[test]
    fn partial_engine_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "data_dir: /var/lib/faceid\nengine:\n  threshold: 0.4\n  id_prefix: face\n",
        )
        .unwrap();

        let cfg = load_config("faceid", path.to_str()).unwrap();
        assert_eq!(cfg.database_path(), PathBuf::from("/var/lib/faceid/faceid.redb"));
        assert_eq!(cfg.engine.id_prefix, "face");
        assert!((cfg.engine.threshold - 0.4).abs() < 1e-6);
        assert_eq!(cfg.engine.max_samples, 5);
    }

    #[test]
    fn invalid_engine_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "engine:\n  dim: 0\n").unwrap();
        assert!(load_config("faceid", path.to_str()).is_err());
    }
}
