use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::catalog::DEFAULT_BASE_URL;
use crate::error::LabError;
use crate::pipeline::{
    DEFAULT_DETAIL_GROUP_SIZE, DEFAULT_FALLBACK_TOTAL, DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_DELAY,
    PipelineOptions,
};

pub const DEFAULT_CONFIG_FILE: &str = "pokelab.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub catalog_base_url: Option<String>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub detail_group_size: Option<usize>,
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub fallback_total: Option<usize>,
    #[serde(default)]
    pub store_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub catalog_base_url: String,
    pub pipeline: PipelineOptions,
    pub store_dir: Utf8PathBuf,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `pokelab.json` from the working directory. Only an
    /// explicitly named file has to exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, LabError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| LabError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| LabError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, LabError> {
        let page_size = config.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(LabError::ConfigInvalid(
                "page_size must be greater than 0".to_string(),
            ));
        }
        let detail_group_size = config
            .detail_group_size
            .unwrap_or(DEFAULT_DETAIL_GROUP_SIZE);
        if detail_group_size == 0 {
            return Err(LabError::ConfigInvalid(
                "detail_group_size must be greater than 0".to_string(),
            ));
        }

        let catalog_base_url = config
            .catalog_base_url
            .map(|url| url.trim().to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if catalog_base_url.is_empty() {
            return Err(LabError::ConfigInvalid(
                "catalog_base_url must not be empty".to_string(),
            ));
        }

        let store_dir = match config.store_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_store_dir()?,
        };

        Ok(ResolvedConfig {
            catalog_base_url,
            pipeline: PipelineOptions {
                page_size,
                detail_group_size,
                delay: config
                    .request_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_REQUEST_DELAY),
                fallback_total: config.fallback_total.unwrap_or(DEFAULT_FALLBACK_TOTAL),
            },
            store_dir,
        })
    }
}

pub fn default_store_dir() -> Result<Utf8PathBuf, LabError> {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_local_dir().join("pokedex-labs")).ok())
        .ok_or_else(|| LabError::Filesystem("unable to resolve data directory".to_string()))
}
