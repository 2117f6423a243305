use std::sync::Arc;

use anyhow::Context;

use cac_core::config::Config;
use cac_mongo::{MongoSettings, MongoStorage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cac_core::logging::init("cac")?;

    let cfg = Arc::new(Config::load()?);

    let storage = MongoStorage::connect(&MongoSettings {
        uri: cfg.mongodb_uri.clone(),
        database: cfg.mongodb_database.clone(),
        connect_attempts: cfg.mongodb_connect_attempts,
        initial_backoff: cfg.mongodb_connect_backoff,
        server_selection_timeout: cfg.mongodb_server_selection_timeout,
    })
    .await
    .context("mongodb unavailable")?;

    cac_telegram::router::run_polling(cfg, Arc::new(storage))
        .await
        .context("telegram bot failed")?;

    Ok(())
}
