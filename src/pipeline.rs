// src/pipeline.rs

use anyhow::{Context, Result};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{info, warn};

use crate::{
    catalog::{SourceFormat, TableStore, WriteMode},
    config::ImportConfig,
    extract::{self, ExtractReport},
    process::apply_type_rules,
    schema::{table_name, TypeRules},
};

/// Stage 1: pull the configured schemas out of the archive.
pub fn extract_stage(cfg: &ImportConfig) -> Result<ExtractReport> {
    extract::extract_archive(cfg.archive_path(), cfg.dataset_dir(), &cfg.import_schemas)
}

/// Schema folders under `dataset_dir` whose names start with an accepted prefix, sorted.
pub fn discover_schemas(dataset_dir: &Path, accepted: &[String]) -> Result<Vec<String>> {
    let mut schemas = Vec::new();
    for entry in fs::read_dir(dataset_dir)
        .with_context(|| format!("listing {}", dataset_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if extract::is_accepted(&name, accepted) {
            schemas.push(name);
        }
    }
    schemas.sort();
    Ok(schemas)
}

/// `.csv` files directly inside `schema_dir`, sorted by name.
pub fn csv_files(schema_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(schema_dir)
        .with_context(|| format!("listing {}", schema_dir.display()))?
    {
        let path = entry?.path();
        let is_csv = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(".csv"))
            .unwrap_or(false);
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Stage 2 for one schema: load, coerce and overwrite every CSV as a table.
/// Returns the table names written.
#[tracing::instrument(level = "info", skip(store, cfg, rules))]
pub fn import_schema<S: TableStore>(
    store: &S,
    cfg: &ImportConfig,
    rules: &TypeRules,
    schema: &str,
) -> Result<Vec<String>> {
    let options = cfg.load_options_for(schema);
    info!(rebase = %options.rebase, "datetime rebase mode");

    let mut written = Vec::new();
    for path in csv_files(&cfg.schema_dir(schema))? {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("non UTF-8 file name {}", path.display()))?;
        let name = table_name(file_name, schema);

        let table = store.load(&path, SourceFormat::Csv, &options)?;
        let table = apply_type_rules(table, schema, rules)
            .with_context(|| format!("typing {}", path.display()))?;

        info!("Importing table: {}", name);
        store
            .write(&table, &name, WriteMode::Overwrite)
            .with_context(|| format!("writing table {}", name))?;
        written.push(name);
    }
    if written.is_empty() {
        warn!("no CSV files found for schema {}", schema);
    }
    Ok(written)
}

/// Stage 2 for every schema folder present after extraction.
pub fn import_all<S: TableStore>(
    store: &S,
    cfg: &ImportConfig,
) -> Result<BTreeMap<String, Vec<String>>> {
    let rules = TypeRules::with_defaults(cfg.primary_schema.clone());
    let mut imported = BTreeMap::new();
    for schema in discover_schemas(&cfg.dataset_dir(), &cfg.import_schemas)? {
        let tables = import_schema(store, cfg, &rules, &schema)?;
        imported.insert(schema, tables);
    }
    Ok(imported)
}

/// Extraction followed by import.
pub fn run<S: TableStore>(store: &S, cfg: &ImportConfig) -> Result<BTreeMap<String, Vec<String>>> {
    let start = Instant::now();
    let report = extract_stage(cfg)?;
    info!(
        files = report.total_extracted(),
        "extracted into {}",
        cfg.dataset_dir().display()
    );
    let imported = import_all(store, cfg)?;
    let tables: usize = imported.values().map(Vec::len).sum();
    info!(tables, elapsed = ?start.elapsed(), "import finished");
    Ok(imported)
}

/// Stage 3: remove the (already emptied) extraction folder, then drop every
/// table of the current database. Returns the dropped table names.
///
/// `fs::remove_dir` refuses non-empty directories; in that case nothing is dropped.
#[tracing::instrument(level = "info", skip(store, cfg))]
pub fn teardown<S: TableStore>(store: &S, cfg: &ImportConfig) -> Result<Vec<String>> {
    let folder = cfg.dataset_dir();
    info!("Deleting folder: {}", folder.display());
    fs::remove_dir(&folder).with_context(|| format!("deleting folder {}", folder.display()))?;

    let database = store.current_database().to_string();
    let mut dropped = Vec::new();
    for table in store.list_tables()? {
        info!("Dropping table: {}.{}", database, table.name);
        store.drop_table(&table.name)?;
        dropped.push(table.name);
    }
    Ok(dropped)
}
