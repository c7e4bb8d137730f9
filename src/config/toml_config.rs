use crate::core::catalog::{
    CloudLadder, DEFAULT_FALLBACK_THRESHOLDS, PLANETARY_COMPUTER_URL, SENTINEL2_COLLECTION,
};
use crate::core::conda::validate_env_name;
use crate::utils::error::{FtwError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_range, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub catalog: CatalogConfig,
    pub environment: EnvironmentConfig,
    pub models: ModelsConfig,
    pub season: SeasonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub url: String,
    pub collection: String,
    pub max_cloud_cover: u8,
    /// Tried in order after `max_cloud_cover` finds nothing.
    pub fallback_thresholds: Vec<u8>,
    pub timeout_seconds: u64,
    pub page_limit: u32,
    pub max_pages: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: PLANETARY_COMPUTER_URL.to_string(),
            collection: SENTINEL2_COLLECTION.to_string(),
            max_cloud_cover: 20,
            fallback_thresholds: DEFAULT_FALLBACK_THRESHOLDS.to_vec(),
            timeout_seconds: 60,
            page_limit: 100,
            max_pages: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Overrides the env name stored in the settings file.
    pub env_name: Option<String>,
    pub python_version: String,
    pub conda_packages: Vec<String>,
    pub pip_packages: Vec<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            env_name: None,
            python_version: "3.9".to_string(),
            conda_packages: ["gdal", "rasterio", "pyproj", "libgdal-arrow-parquet"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            pip_packages: vec!["ftw-tools".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Defaults to `<data dir>/ftw_models`.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonConfig {
    pub table: Option<PathBuf>,
    pub max_distance_deg: Option<f64>,
}

impl RunConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 檔案不存在時使用預設值
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        toml::from_str(&processed).map_err(|e| FtwError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${STAC_URL})，未定義的變數保持原樣
    fn substitute_env_vars(content: &str) -> String {
        static ENV_VAR: OnceLock<Regex> = OnceLock::new();
        let re = ENV_VAR.get_or_init(|| {
            Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var pattern")
        });

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
    }

    pub fn cloud_ladder(&self) -> Result<CloudLadder> {
        CloudLadder::new(self.catalog.max_cloud_cover, &self.catalog.fallback_thresholds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog.timeout_seconds)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.models.dir.clone().unwrap_or_else(default_models_dir)
    }
}

pub fn default_models_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ftw-runner")
        .join("ftw_models")
}

impl Validate for RunConfig {
    fn validate(&self) -> Result<()> {
        validate_url("catalog.url", &self.catalog.url)?;
        validate_non_empty_string("catalog.collection", &self.catalog.collection)?;
        validate_range("catalog.max_cloud_cover", self.catalog.max_cloud_cover, 0, 100)?;
        for &t in &self.catalog.fallback_thresholds {
            validate_range("catalog.fallback_thresholds", t, 0, 100)?;
        }
        validate_range("catalog.timeout_seconds", self.catalog.timeout_seconds, 1, 3600)?;
        validate_range("catalog.page_limit", self.catalog.page_limit, 1, 1000)?;

        if let Some(name) = &self.environment.env_name {
            validate_env_name(name)?;
        }
        validate_non_empty_string("environment.python_version", &self.environment.python_version)?;

        if let Some(dir) = &self.models.dir {
            validate_path("models.dir", &dir.to_string_lossy())?;
        }
        if let Some(table) = &self.season.table {
            validate_path("season.table", &table.to_string_lossy())?;
        }
        Ok(())
    }
}
