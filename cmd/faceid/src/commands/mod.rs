//! CLI commands.

mod manage;
mod query;
mod resolve;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use photoid_faceid::{DirThumbnails, RedbStore, Resolver};

pub use manage::{ForgetPhotoCommand, GcCommand, MergeCommand};
pub use query::{ListCommand, ShowCommand};
pub use resolve::ResolveCommand;

use crate::Cli;
use crate::config::{CliConfig, load_config};

const APP_NAME: &str = "faceid";

pub fn get_config(cli: &Cli) -> anyhow::Result<CliConfig> {
    load_config(APP_NAME, cli.config.as_deref())
}

/// Opens the identity database and wires its photo index and the thumbnail
/// directory into a resolver.
pub fn open_resolver(cli: &Cli) -> anyhow::Result<Resolver> {
    let cfg = get_config(cli)?;
    let data_dir = cfg.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("create data dir {}", data_dir.display()))?;

    let db_path = cfg.database_path();
    let store = RedbStore::open(&db_path, cfg.engine.max_samples)
        .with_context(|| format!("open {}", db_path.display()))?;
    let photos = store.photo_index();
    tracing::debug!(db = %db_path.display(), "opened identity store");

    let resolver = Resolver::new(cfg.engine.clone(), Arc::new(store))?
        .with_photos(Arc::new(photos))
        .with_thumbnails(Arc::new(DirThumbnails::new(cfg.thumbnail_dir())));
    Ok(resolver)
}

/// Loads a request from a YAML or JSON file.
pub fn load_request<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("yaml");

    let result = match ext.to_lowercase().as_str() {
        "json" => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };
    Ok(result)
}
