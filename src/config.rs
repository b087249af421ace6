use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{import::DEFAULT_BATCH_SIZE, model::RadioType};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Radio type assumed for geolocation requests that do not name one.
    #[serde(default)]
    pub default_radio: RadioType,

    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Deserialize)]
pub struct ImportConfig {
    /// Upserts sent to the store per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

pub fn load(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path).context("Failed to read config")?;
    parse(&data)
}

pub fn parse(data: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(data).context("Failed to parse config")?;
    if let Ok(url) = dotenvy::var("DATABASE_URL") {
        config.database_url = url;
    }
    Ok(config)
}
