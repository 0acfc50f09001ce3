use crate::Result;
use crate::tables::Codec;
use camino::{Utf8Path, Utf8PathBuf};
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use url::Url;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// Name of the configuration file looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = "partsdb.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Base URL holding the index, the per-category files and the archive
    pub source_url: String,

    #[serde(default = "default_archive_name")]
    pub archive_name: String,

    #[serde(default = "default_index_name")]
    pub index_name: String,

    #[serde(default)]
    pub compression: Codec,

    /// Longest stretch of decoding or searching before yielding
    #[serde(default = "default_time_slice", with = "humantime_serde")]
    pub time_slice: Duration,

    #[serde(default = "default_query_chunk_size")]
    pub query_chunk_size: usize,

    #[serde(default = "default_min_query_len")]
    pub min_query_len_all_categories: usize,

    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_archive_name() -> String {
    crate::encoder::DEFAULT_ARCHIVE_NAME.to_string()
}

fn default_index_name() -> String {
    "index.json".to_string()
}

const fn default_time_slice() -> Duration {
    crate::reader::DEFAULT_TIME_SLICE
}

const fn default_query_chunk_size() -> usize {
    crate::query::DEFAULT_CHUNK_SIZE
}

const fn default_min_query_len() -> usize {
    crate::query::DEFAULT_MIN_QUERY_LEN
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

const fn default_max_retries() -> u32 {
    3
}

impl Config {
    /// Load configuration from `config_path`, or from `partsdb.toml` in the current
    /// directory, falling back to the defaults when neither exists.
    pub fn load(config_path: Option<&Utf8Path>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading partsdb configuration file '{path}'"))?;
            (path.to_path_buf(), text)
        } else {
            let path = Utf8PathBuf::from(CONFIG_FILE_NAME);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
                Err(e) => return Err(e).into_app_err_with(|| format!("reading partsdb configuration file '{path}'")),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{final_path}'"))?;
        config.validate()?;

        Ok(config)
    }

    /// Save the default configuration to a TOML file
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    pub fn source_url(&self) -> Result<Url> {
        Url::parse(&self.source_url).into_app_err_with(|| format!("source_url '{}' is not a valid URL", self.source_url))
    }

    fn validate(&self) -> Result<()> {
        let url = self.source_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(app_err!("source_url must be an http or https URL, got '{}'", self.source_url));
        }

        if self.time_slice.is_zero() {
            return Err(app_err!("time_slice must be greater than zero"));
        }

        if self.query_chunk_size == 0 {
            return Err(app_err!("query_chunk_size must be greater than zero"));
        }

        if self.archive_name.is_empty() || self.index_name.is_empty() {
            return Err(app_err!("archive_name and index_name must not be empty"));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.time_slice, Duration::from_millis(300));
        assert_eq!(config.compression, Codec::Gzip);
        assert_eq!(config.archive_name, "all.jsonlines.tar");
    }

    #[test]
    fn test_validate_rejects_zero_time_slice() {
        let config = Config {
            time_slice: Duration::ZERO,
            ..Config::default()
        };
        let _ = config.validate().unwrap_err();
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let config = Config {
            query_chunk_size: 0,
            ..Config::default()
        };
        let _ = config.validate().unwrap_err();
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let config = Config {
            source_url: "file:///srv/data/".into(),
            ..Config::default()
        };
        let _ = config.validate().unwrap_err();

        let config = Config {
            source_url: "not a url".into(),
            ..Config::default()
        };
        let _ = config.validate().unwrap_err();
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let text = format!("{DEFAULT_CONFIG_TOML}\nunknown_key = 1\n");
        let _ = toml::from_str::<Config>(&text).unwrap_err();
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(r#"source_url = "http://localhost:8080/""#).unwrap();
        config.validate().unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.index_name, "index.json");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_save_default_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let output_path = Utf8PathBuf::try_from(tmp.path().join("partsdb.toml")).unwrap();
        Config::save_default(&output_path).unwrap();
        let loaded = Config::load(Some(&output_path)).unwrap();
        assert_eq!(loaded.query_chunk_size, 4096);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_load_missing_explicit_config_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(tmp.path().join("missing.toml")).unwrap();
        let _ = Config::load(Some(&path)).unwrap_err();
    }
}
