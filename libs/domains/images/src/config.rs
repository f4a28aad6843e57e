use std::path::PathBuf;

use core_config::{ConfigError, FromEnv, env_or_default, env_parse};

/// Where uploads are written and how they are addressed publicly
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    /// Base of the public image URLs, without a trailing slash
    pub public_base_url: String,
}

impl StorageConfig {
    /// `{public_base_url}/uploads/{filename}`
    pub fn image_url(&self, filename: &str) -> String {
        format!("{}/uploads/{}", self.public_base_url, filename)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            public_base_url: "http://localhost:8000".to_string(),
        }
    }
}

impl FromEnv for StorageConfig {
    /// Reads `UPLOAD_DIR` and `PUBLIC_BASE_URL`
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            upload_dir: PathBuf::from(env_or_default("UPLOAD_DIR", "uploads")),
            public_base_url: env_or_default("PUBLIC_BASE_URL", &defaults.public_base_url)
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    /// External embedding service over HTTP
    Http,
    /// Local colour histogram
    Histogram,
}

#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub kind: EmbedderKind,
    /// Required for [`EmbedderKind::Http`]
    pub url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    /// Bins per colour channel for [`EmbedderKind::Histogram`]
    pub histogram_bins: u32,
}

pub const MAX_HISTOGRAM_BINS: u32 = 16;

impl EmbedderConfig {
    pub fn histogram(bins: u32) -> Self {
        Self {
            kind: EmbedderKind::Histogram,
            histogram_bins: bins,
            ..Self::default()
        }
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self {
            kind: EmbedderKind::Http,
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            kind: EmbedderKind::Histogram,
            url: None,
            model: "clip-ViT-B-32".to_string(),
            timeout_secs: 30,
            histogram_bins: 8,
        }
    }
}

impl FromEnv for EmbedderConfig {
    /// Reads `EMBEDDER_KIND`, `EMBEDDER_URL`, `EMBEDDER_MODEL`,
    /// `EMBEDDER_TIMEOUT_SECS` and `HISTOGRAM_BINS`
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let kind = match env_or_default("EMBEDDER_KIND", "histogram").to_lowercase().as_str() {
            "http" => EmbedderKind::Http,
            "histogram" => EmbedderKind::Histogram,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "EMBEDDER_KIND".to_string(),
                    details: format!("expected 'http' or 'histogram', got '{}'", other),
                });
            }
        };

        let url = std::env::var("EMBEDDER_URL")
            .ok()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        if kind == EmbedderKind::Http && url.is_none() {
            return Err(ConfigError::MissingEnvVar("EMBEDDER_URL".to_string()));
        }

        let histogram_bins = env_parse("HISTOGRAM_BINS", defaults.histogram_bins)?;
        if !(1..=MAX_HISTOGRAM_BINS).contains(&histogram_bins) {
            return Err(ConfigError::InvalidValue {
                key: "HISTOGRAM_BINS".to_string(),
                details: format!("must be between 1 and {}", MAX_HISTOGRAM_BINS),
            });
        }

        Ok(Self {
            kind,
            url,
            model: env_or_default("EMBEDDER_MODEL", &defaults.model),
            timeout_secs: env_parse("EMBEDDER_TIMEOUT_SECS", defaults.timeout_secs)?,
            histogram_bins,
        })
    }
}

/// Similarity query settings
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// Record each query in the search history
    pub record_history: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 100,
            record_history: true,
        }
    }
}

impl FromEnv for SearchConfig {
    /// Reads `SEARCH_DEFAULT_TOP_K`, `SEARCH_MAX_TOP_K` and `SEARCH_RECORD_HISTORY`
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let default_top_k = env_parse("SEARCH_DEFAULT_TOP_K", defaults.default_top_k)?;
        let max_top_k = env_parse("SEARCH_MAX_TOP_K", defaults.max_top_k)?;

        if default_top_k == 0 || default_top_k > max_top_k {
            return Err(ConfigError::InvalidValue {
                key: "SEARCH_DEFAULT_TOP_K".to_string(),
                details: format!("must be between 1 and SEARCH_MAX_TOP_K ({})", max_top_k),
            });
        }

        Ok(Self {
            default_top_k,
            max_top_k,
            record_history: env_parse("SEARCH_RECORD_HISTORY", defaults.record_history)?,
        })
    }
}
