use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::codepage::{Codepage, KeepName, NameRepair, Reencode};
use crate::endpoints::{DEFAULT_API_BASE, DEFAULT_COMPANY_STATUS};
use crate::error::GcisError;
use crate::gcis::HttpOptions;
use crate::store::{CachePolicy, DEFAULT_TIMESTAMP_FORMAT, DEFAULT_TIMEZONE};

pub const DEFAULT_CONFIG_FILE: &str = "gcis-query.json";
pub const DEFAULT_DATASET_DIR: &str = "./董監事資料集";
pub const DEFAULT_DATASET_FILE: &str = "董監事資料集.csv";
/// 政府資料開放平臺 董監事資料集, refreshed at the end of every month.
pub const DEFAULT_DATASET_URL: &str =
    "https://data.gcis.nat.gov.tw/od/file?oid=7E5201D9-CAD2-494E-8920-5319D66F66A1";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub dataset_dir: Option<String>,
    #[serde(default)]
    pub dataset_file: Option<String>,
    #[serde(default)]
    pub dataset_url: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub timestamp_format: Option<String>,
    #[serde(default = "default_name_encoding")]
    pub name_encoding: Option<NameEncoding>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub company_status: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
}

/// Encoding pair for archive entry-name repair. `null` in the config file
/// disables repair.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NameEncoding {
    pub source: String,
    pub target: String,
}

fn default_name_encoding() -> Option<NameEncoding> {
    Some(NameEncoding {
        source: "cp437".to_string(),
        target: "big5".to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub dataset_path: Utf8PathBuf,
    pub dataset_url: String,
    pub cache_policy: CachePolicy,
    pub name_repair: Option<Reencode>,
    pub api_base: String,
    pub company_status: String,
    pub http: HttpOptions,
}

impl ResolvedConfig {
    pub fn repair_strategy(&self) -> Box<dyn NameRepair> {
        match self.name_repair {
            Some(reencode) => Box::new(reencode),
            None => Box::new(KeepName),
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            dataset_path: Utf8PathBuf::from(DEFAULT_DATASET_DIR).join(DEFAULT_DATASET_FILE),
            dataset_url: DEFAULT_DATASET_URL.to_string(),
            cache_policy: CachePolicy::default(),
            name_repair: Some(Reencode::default()),
            api_base: DEFAULT_API_BASE.to_string(),
            company_status: DEFAULT_COMPANY_STATUS.to_string(),
            http: HttpOptions::default(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `gcis-query.json` when present. Without either, the
    /// defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, GcisError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config {
                name_encoding: default_name_encoding(),
                ..Config::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GcisError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GcisError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, GcisError> {
        let dataset_dir = config
            .dataset_dir
            .unwrap_or_else(|| DEFAULT_DATASET_DIR.to_string());
        let dataset_file = config
            .dataset_file
            .unwrap_or_else(|| DEFAULT_DATASET_FILE.to_string());

        let cache_policy = CachePolicy::new(
            config.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE),
            config
                .timestamp_format
                .as_deref()
                .unwrap_or(DEFAULT_TIMESTAMP_FORMAT),
        )?;

        let name_repair = config
            .name_encoding
            .map(|encoding| {
                Ok::<_, GcisError>(Reencode {
                    source: encoding.source.parse::<Codepage>()?,
                    target: encoding.target.parse::<Codepage>()?,
                })
            })
            .transpose()?;

        let defaults = HttpOptions::default();
        let http = HttpOptions {
            timeout: match config.timeout_secs {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.timeout,
            },
            max_retries: config.max_retries.unwrap_or(defaults.max_retries),
        };

        Ok(ResolvedConfig {
            dataset_path: Utf8PathBuf::from(dataset_dir).join(dataset_file),
            dataset_url: config
                .dataset_url
                .unwrap_or_else(|| DEFAULT_DATASET_URL.to_string()),
            cache_policy,
            name_repair,
            api_base: config
                .api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            company_status: config
                .company_status
                .unwrap_or_else(|| DEFAULT_COMPANY_STATUS.to_string()),
            http,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(
            resolved.dataset_path,
            Utf8PathBuf::from("./董監事資料集/董監事資料集.csv")
        );
        assert_eq!(resolved.cache_policy.timestamp_format(), "%Y%m");
        assert_eq!(resolved.company_status, "01");
        assert!(resolved.name_repair.is_some());
    }

    #[test]
    fn null_name_encoding_disables_repair() {
        let config: Config = serde_json::from_str(r#"{"name_encoding": null}"#).unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert!(resolved.name_repair.is_none());
    }
}
