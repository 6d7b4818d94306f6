// src/catalog/mod.rs
use anyhow::{ensure, Result};
use std::{fmt, path::Path};

use crate::process::{LoadOptions, Table};

pub mod metadata;
pub mod parquet_store;

pub use metadata::{ColumnMeta, TableMeta};
pub use parquet_store::ParquetCatalog;

/// Input formats `TableStore::load` understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Parquet,
}

/// What `write` does when the table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace contents and schema.
    Overwrite,
    /// Add rows; the schema must match.
    Append,
    /// Fail.
    ErrorIfExists,
    /// Leave the existing table untouched.
    Ignore,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WriteMode::Overwrite => "overwrite",
            WriteMode::Append => "append",
            WriteMode::ErrorIfExists => "errorifexists",
            WriteMode::Ignore => "ignore",
        };
        f.write_str(s)
    }
}

/// One entry of `list_tables`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    pub name: String,
    pub database: String,
    pub columns: Vec<ColumnMeta>,
    pub rows: u64,
}

/// The managed table store the pipeline talks to.
pub trait TableStore {
    /// Read a file into memory.
    fn load(&self, path: &Path, format: SourceFormat, options: &LoadOptions) -> Result<Table>;

    /// Persist `table` as `name` in the current database.
    fn write(&self, table: &Table, name: &str, mode: WriteMode) -> Result<()>;

    /// Tables of the current database, sorted by name.
    fn list_tables(&self) -> Result<Vec<TableDescriptor>>;

    /// Drop `name` if it exists.
    fn drop_table(&self, name: &str) -> Result<()>;

    fn current_database(&self) -> &str;

    /// Read a managed table back.
    fn read_table(&self, name: &str) -> Result<Table>;
}

/// Table identifiers are case-insensitive and stored lower-cased.
pub fn normalize_table_name(name: &str) -> Result<String> {
    normalize_identifier("table", name)
}

/// Database names become a directory under the warehouse; same rules as tables.
pub fn normalize_database_name(name: &str) -> Result<String> {
    normalize_identifier("database", name)
}

fn normalize_identifier(kind: &str, name: &str) -> Result<String> {
    let lowered = name.to_ascii_lowercase();
    ensure!(!lowered.is_empty(), "{} name must not be empty", kind);
    ensure!(
        lowered
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_'),
        "invalid {} name `{}`: only letters, digits and `_` are allowed",
        kind,
        name
    );
    Ok(lowered)
}
