//! Configuration file
//!
//! Settings live in an INI file, by default `~/.crossview/config.ini`:
//!
//! ```ini
//! [api]
//! token = MLY|...
//! base_url = https://graph.mapillary.com/images
//! page_size = 200
//! timeout_secs = 60
//!
//! [fetch]
//! max_records = 1200
//! margin_m = 15
//! subdivide = 1
//! retries = 3
//! sleep_ms = 350
//! thumb_size = 256
//! full_size = 1024
//! download_thumbs = true
//! download_full = false
//! device_filter =
//!
//! [filter]
//! distance_threshold_m = 30
//! layers = lod22_2d,lod13_2d,lod12_2d
//!
//! [paths]
//! data_root = data/amsterdam
//!
//! [pipeline]
//! step_delay_ms = 500
//! parallel_tiles = 1
//! ```
//!
//! A missing file means defaults. Unknown keys are ignored; a value that
//! does not parse is an error naming the key.
//!
//! Precedence is CLI flag, then config file, then built-in default. The
//! typed runtime configs are produced by [`ConfigFile::fetch_config`] and
//! friends; the CLI then applies its overrides with the `with_*` builders.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::acquisition::{
    AssetConfig, FetchConfig, RetryPolicy, DEFAULT_MARGIN_M, DEFAULT_MAX_RECORDS,
    DEFAULT_MAX_RETRIES, DEFAULT_POLITENESS_DELAY_MS,
};
use crate::filter::{FilterConfig, DEFAULT_DISTANCE_THRESHOLD_M, DEFAULT_LAYERS};
use crate::pipeline::{DataLayout, PipelineConfig, DEFAULT_DATA_ROOT, DEFAULT_STEP_DELAY_MS};
use crate::provider::{DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE, DEFAULT_TIMEOUT_SECS};

/// Environment variables checked for the access token, in order.
pub const TOKEN_ENV_VARS: [&str; 2] = ["MAPILLARY_ACCESS_TOKEN", "MAPILLARY_TOKEN"];

/// Configuration errors. All are fatal to the run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for {section}.{key}: '{value}'")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },

    #[error(
        "no access token; pass --token, set MAPILLARY_ACCESS_TOKEN or add token to [api] in the config file"
    )]
    MissingCredential,
}

/// Returns `~/.crossview`.
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".crossview")
}

/// Returns `~/.crossview/config.ini`.
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// `[api]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    pub token: Option<String>,
    pub base_url: String,
    pub page_size: u32,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// `[fetch]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub max_records: usize,
    pub margin_m: f64,
    pub subdivide: u32,
    pub retries: u32,
    pub sleep_ms: u64,
    pub thumb_size: u32,
    pub full_size: u32,
    pub download_thumbs: bool,
    pub download_full: bool,
    pub device_filter: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        let assets = AssetConfig::default();
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            margin_m: DEFAULT_MARGIN_M,
            subdivide: 1,
            retries: DEFAULT_MAX_RETRIES,
            sleep_ms: DEFAULT_POLITENESS_DELAY_MS,
            thumb_size: assets.thumb_size,
            full_size: assets.full_size,
            download_thumbs: assets.thumbs,
            download_full: assets.full,
            device_filter: None,
        }
    }
}

/// `[filter]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSettings {
    pub distance_threshold_m: f64,
    pub layers: Vec<String>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            distance_threshold_m: DEFAULT_DISTANCE_THRESHOLD_M,
            layers: DEFAULT_LAYERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// `[paths]` section. Unset roots derive from `data_root`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSettings {
    pub data_root: PathBuf,
    pub mesh_root: Option<PathBuf>,
    pub imagery_root: Option<PathBuf>,
    pub processed_root: Option<PathBuf>,
    pub tile_index: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            mesh_root: None,
            imagery_root: None,
            processed_root: None,
            tile_index: None,
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub step_delay_ms: u64,
    pub parallel_tiles: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            parallel_tiles: 1,
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub api: ApiSettings,
    pub fetch: FetchSettings,
    pub filter: FilterSettings,
    pub paths: PathSettings,
    pub pipeline: PipelineSettings,
}

/// Reads typed values out of an INI document.
struct Reader<'a> {
    ini: &'a Ini,
}

impl Reader<'_> {
    fn raw(&self, section: &str, key: &str) -> Option<&str> {
        self.ini
            .section(Some(section))
            .and_then(|props| props.get(key))
            .map(str::trim)
    }

    fn string(&self, section: &str, key: &str) -> Option<String> {
        self.raw(section, key)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn parse<T: FromStr>(&self, section: &str, key: &str, target: &mut T) -> Result<(), ConfigError> {
        let Some(value) = self.raw(section, key).filter(|v| !v.is_empty()) else {
            return Ok(());
        };
        *target = value.parse().map_err(|_| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        })?;
        Ok(())
    }

    fn flag(&self, section: &str, key: &str, target: &mut bool) -> Result<(), ConfigError> {
        let Some(value) = self.raw(section, key).filter(|v| !v.is_empty()) else {
            return Ok(());
        };
        *target = match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => true,
            "false" | "no" | "off" | "0" => false,
            _ => {
                return Err(ConfigError::InvalidValue {
                    section: section.to_string(),
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
        };
        Ok(())
    }
}

impl ConfigFile {
    /// Loads `~/.crossview/config.ini`, or defaults if it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Loads a specific file, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parses configuration from INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let r = Reader { ini };
        let mut config = ConfigFile::default();

        let api = &mut config.api;
        api.token = r.string("api", "token");
        if let Some(url) = r.string("api", "base_url") {
            api.base_url = url;
        }
        r.parse("api", "page_size", &mut api.page_size)?;
        r.parse("api", "timeout_secs", &mut api.timeout_secs)?;

        let fetch = &mut config.fetch;
        r.parse("fetch", "max_records", &mut fetch.max_records)?;
        r.parse("fetch", "margin_m", &mut fetch.margin_m)?;
        r.parse("fetch", "subdivide", &mut fetch.subdivide)?;
        r.parse("fetch", "retries", &mut fetch.retries)?;
        r.parse("fetch", "sleep_ms", &mut fetch.sleep_ms)?;
        r.parse("fetch", "thumb_size", &mut fetch.thumb_size)?;
        r.parse("fetch", "full_size", &mut fetch.full_size)?;
        r.flag("fetch", "download_thumbs", &mut fetch.download_thumbs)?;
        r.flag("fetch", "download_full", &mut fetch.download_full)?;
        fetch.device_filter = r.string("fetch", "device_filter");

        let filter = &mut config.filter;
        r.parse("filter", "distance_threshold_m", &mut filter.distance_threshold_m)?;
        if let Some(layers) = r.string("filter", "layers") {
            let layers: Vec<String> = layers
                .split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
            if !layers.is_empty() {
                filter.layers = layers;
            }
        }

        let paths = &mut config.paths;
        if let Some(root) = r.string("paths", "data_root") {
            paths.data_root = PathBuf::from(root);
        }
        paths.mesh_root = r.string("paths", "mesh_root").map(PathBuf::from);
        paths.imagery_root = r.string("paths", "imagery_root").map(PathBuf::from);
        paths.processed_root = r.string("paths", "processed_root").map(PathBuf::from);
        paths.tile_index = r.string("paths", "tile_index").map(PathBuf::from);

        let pipeline = &mut config.pipeline;
        r.parse("pipeline", "step_delay_ms", &mut pipeline.step_delay_ms)?;
        r.parse("pipeline", "parallel_tiles", &mut pipeline.parallel_tiles)?;

        Ok(config)
    }

    /// Writes the configuration as INI.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let mut ini = Ini::new();
        ini.with_section(Some("api"))
            .set("token", self.api.token.clone().unwrap_or_default())
            .set("base_url", self.api.base_url.clone())
            .set("page_size", self.api.page_size.to_string())
            .set("timeout_secs", self.api.timeout_secs.to_string());
        ini.with_section(Some("fetch"))
            .set("max_records", self.fetch.max_records.to_string())
            .set("margin_m", self.fetch.margin_m.to_string())
            .set("subdivide", self.fetch.subdivide.to_string())
            .set("retries", self.fetch.retries.to_string())
            .set("sleep_ms", self.fetch.sleep_ms.to_string())
            .set("thumb_size", self.fetch.thumb_size.to_string())
            .set("full_size", self.fetch.full_size.to_string())
            .set("download_thumbs", self.fetch.download_thumbs.to_string())
            .set("download_full", self.fetch.download_full.to_string())
            .set("device_filter", self.fetch.device_filter.clone().unwrap_or_default());
        ini.with_section(Some("filter"))
            .set("distance_threshold_m", self.filter.distance_threshold_m.to_string())
            .set("layers", self.filter.layers.join(","));
        ini.with_section(Some("paths"))
            .set("data_root", self.paths.data_root.to_string_lossy().to_string());
        ini.with_section(Some("pipeline"))
            .set("step_delay_ms", self.pipeline.step_delay_ms.to_string())
            .set("parallel_tiles", self.pipeline.parallel_tiles.to_string());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        ini.write_to_file(path).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Acquisition settings from the file.
    pub fn fetch_config(&self) -> FetchConfig {
        let f = &self.fetch;
        FetchConfig::default()
            .with_base_url(self.api.base_url.clone())
            .with_page_size(self.api.page_size)
            .with_max_records(f.max_records)
            .with_margin(f.margin_m)
            .with_subdivide(f.subdivide)
            .with_retry(RetryPolicy::exponential(f.retries))
            .with_politeness_delay(Duration::from_millis(f.sleep_ms))
            .with_device_filter(f.device_filter.clone())
            .with_assets(AssetConfig {
                thumbs: f.download_thumbs,
                thumb_size: f.thumb_size,
                full: f.download_full,
                full_size: f.full_size,
            })
    }

    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig::default()
            .with_threshold(self.filter.distance_threshold_m)
            .with_layers(self.filter.layers.clone())
    }

    /// Data layout, optionally re-rooted at `data_root`.
    pub fn layout(&self, data_root: Option<&Path>) -> DataLayout {
        let p = &self.paths;
        let mut layout = DataLayout::new(data_root.unwrap_or(&p.data_root));
        // Explicit roots only apply when the data root was not overridden.
        if data_root.is_none() {
            if let Some(root) = &p.mesh_root {
                layout = layout.with_mesh_root(root);
            }
            if let Some(root) = &p.imagery_root {
                layout = layout.with_imagery_root(root);
            }
            if let Some(root) = &p.processed_root {
                layout = layout.with_processed_root(root);
            }
            if let Some(path) = &p.tile_index {
                layout = layout.with_tile_index(path);
            }
        }
        layout
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_step_delay(Duration::from_millis(self.pipeline.step_delay_ms))
            .with_parallel_tiles(self.pipeline.parallel_tiles)
    }

    /// Resolves the access token: CLI flag, environment, then config file.
    pub fn resolve_token(&self, cli: Option<&str>) -> Result<String, ConfigError> {
        self.resolve_token_with(cli, |name| std::env::var(name).ok())
    }

    fn resolve_token_with(
        &self,
        cli: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConfigError> {
        cli.map(str::to_string)
            .or_else(|| TOKEN_ENV_VARS.iter().find_map(|name| env(name)))
            .or_else(|| self.api.token.clone())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingCredential)
    }
}
