//! Shared binary bootstrap: logging, HTTP clients, and the local store.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::db::{migrate, Db};
use crate::oracle::{CentralaClient, OpenAiExtractor};

/// Initialize env_logger; `RUST_LOG` wins over the configured level.
pub fn init_logging(default_level: &str) {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", default_level),
    )
    .try_init();
}

pub fn build_centrala(config: &Config) -> Result<CentralaClient> {
    let api_key = std::env::var(&config.centrala.api_key_env).with_context(|| {
        format!("Environment variable {} not set", config.centrala.api_key_env)
    })?;
    Ok(CentralaClient::new(
        config.centrala_url()?,
        api_key,
        config.centrala_timeout(),
    ))
}

pub fn build_extractor(config: &Config) -> Result<OpenAiExtractor> {
    let api_key = std::env::var(&config.llm.api_key_env).map_err(|_| {
        anyhow::anyhow!(
            "Environment variable {} not set. Set it in your .env file or as an environment variable.",
            config.llm.api_key_env
        )
    })?;
    Ok(OpenAiExtractor::new(
        api_key,
        config.llm.model.clone(),
        config.llm.base_url.clone(),
        config.llm.max_retries,
    ))
}

/// Open the configured database and apply migrations from `./migrations`.
pub async fn open_db(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| migrate::run_migrations(conn, migrations_dir))
        .await
        .with_context(|| format!("Failed to migrate {}", config.db_path().display()))?;
    log::debug!("Database ready at {}", db.path().display());
    Ok(db)
}
