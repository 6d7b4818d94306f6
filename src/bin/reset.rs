// src/bin/reset.rs

use anyhow::Result;
use lakeimport::{catalog::ParquetCatalog, config::ImportConfig, logging, pipeline};
use tracing::info;

fn main() -> Result<()> {
    logging::init();

    let cfg = ImportConfig::from_env()?;
    let store = ParquetCatalog::open(cfg.warehouse_dir(), &cfg.database)?;
    let dropped = pipeline::teardown(&store, &cfg)?;
    info!("dropped {} table(s)", dropped.len());
    Ok(())
}
