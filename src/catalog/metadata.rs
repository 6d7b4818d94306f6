use anyhow::{Context, Result};
use arrow::datatypes::Schema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::process::RebaseMode;
use crate::schema::type_label;

pub const META_FILE: &str = "_table.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: String,
}

/// Sidecar describing a managed table, stored as `<table>/_table.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableMeta {
    pub name: String,
    pub database: String,
    pub columns: Vec<ColumnMeta>,
    pub rows: u64,
    pub parts: usize,
    pub rebase: RebaseMode,
    pub updated_at: DateTime<Utc>,
}

impl TableMeta {
    pub fn columns_of(schema: &Schema) -> Vec<ColumnMeta> {
        schema
            .fields()
            .iter()
            .map(|f| ColumnMeta {
                name: f.name().clone(),
                data_type: type_label(f.data_type()),
            })
            .collect()
    }

    pub fn path_in(table_dir: &Path) -> PathBuf {
        table_dir.join(META_FILE)
    }

    pub fn read(table_dir: &Path) -> Result<Self> {
        let path = Self::path_in(table_dir);
        let f = fs::File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        serde_json::from_reader(f).with_context(|| format!("parsing {}", path.display()))
    }

    /// Write atomically: to a tmp file, then rename over the original.
    pub fn write(&self, table_dir: &Path) -> Result<()> {
        let path = Self::path_in(table_dir);
        let tmp_path = table_dir.join(format!(".{}.tmp", META_FILE));
        let mut tmp = fs::File::create(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        serde_json::to_writer_pretty(&mut tmp, self).context("serializing table metadata")?;
        tmp.write_all(b"\n")?;
        fs::rename(&tmp_path, &path).with_context(|| {
            format!("renaming {} -> {}", tmp_path.display(), path.display())
        })?;
        Ok(())
    }
}
