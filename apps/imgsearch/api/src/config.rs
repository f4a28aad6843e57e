use core_config::{Environment, FromEnv, env_list, server::ServerConfig};
use database::postgres::PostgresConfig;
use domain_images::{EmbedderConfig, SearchConfig, StorageConfig};
use eyre::WrapErr;

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173";

/// Application configuration, composed from the shared config components
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: PostgresConfig,
    pub storage: StorageConfig,
    pub embedder: EmbedderConfig,
    pub search: SearchConfig,
    /// Origins allowed by CORS, from `CORS_ALLOWED_ORIGIN`
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        Ok(Self {
            environment: Environment::from_env(),
            server: ServerConfig::from_env().wrap_err("Invalid server configuration")?,
            database: PostgresConfig::from_env().wrap_err("Invalid database configuration")?,
            storage: StorageConfig::from_env().wrap_err("Invalid storage configuration")?,
            embedder: EmbedderConfig::from_env().wrap_err("Invalid embedder configuration")?,
            search: SearchConfig::from_env().wrap_err("Invalid search configuration")?,
            cors_origins: env_list("CORS_ALLOWED_ORIGIN", DEFAULT_CORS_ORIGINS),
        })
    }
}
