pub mod ask;
pub mod check_config;

use anyhow::Context;
use chatmesh_config::AppConfig;
use std::path::Path;

/// The app config from `path`, or the default location with env overrides.
pub fn load_app_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from(path).with_context(|| format!("loading {}", path.display())),
        None => AppConfig::load().context("loading ~/.chatmesh/config.toml"),
    }
}
