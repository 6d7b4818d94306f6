// src/main.rs

use anyhow::Result;
use lakeimport::{catalog::ParquetCatalog, config::ImportConfig, logging, pipeline};
use tracing::info;

fn main() -> Result<()> {
    logging::init();
    info!("startup");

    let cfg = ImportConfig::from_env()?;
    info!(
        archive = %cfg.archive_path().display(),
        schemas = ?cfg.import_schemas,
        "configured"
    );

    let store = ParquetCatalog::open(cfg.warehouse_dir(), &cfg.database)?;
    let imported = pipeline::run(&store, &cfg)?;
    for (schema, tables) in &imported {
        info!("{}: {} table(s) {:?}", schema, tables.len(), tables);
    }
    Ok(())
}
