// src/config.rs

use anyhow::{bail, ensure, Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::catalog::normalize_database_name;
use crate::process::{LoadOptions, RebaseMode};

/// Archive holding every table of the dataset.
pub const ZIP_FILE: &str = "multi_table.zip";

/// Schemas to import: beatport and spotify.
pub const IMPORT_SCHEMAS: &[&str] = &["bp", "sp"];

/// Lakehouse root, one path segment per entry.
pub const BASE_PATH: &[&str] = &["/", "lakehouse", "default"];

/// Segment under the base path holding raw files.
pub const FILES_SEGMENT: &str = "Files";

/// Segment under the base path holding managed tables.
pub const TABLES_SEGMENT: &str = "Tables";

/// Schema whose `_id` columns are forced to integers.
pub const PRIMARY_SCHEMA: &str = "bp";

/// Schemas written with legacy date rebasing (spotify carries very old release dates).
pub const LEGACY_DATE_SCHEMAS: &[&str] = &["sp"];

pub const DEFAULT_DATABASE: &str = "default";

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Environment variable naming an optional YAML override file.
pub const CONFIG_ENV: &str = "LAKEIMPORT_CONFIG";

/// Everything the pipeline needs to locate its inputs and outputs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub base_path: PathBuf,
    pub files_segment: String,
    pub tables_segment: String,
    pub zip_file: String,
    pub import_schemas: Vec<String>,
    pub primary_schema: String,
    pub legacy_date_schemas: Vec<String>,
    pub database: String,
    pub date_format: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            base_path: BASE_PATH.iter().collect(),
            files_segment: FILES_SEGMENT.to_string(),
            tables_segment: TABLES_SEGMENT.to_string(),
            zip_file: ZIP_FILE.to_string(),
            import_schemas: IMPORT_SCHEMAS.iter().map(|s| s.to_string()).collect(),
            primary_schema: PRIMARY_SCHEMA.to_string(),
            legacy_date_schemas: LEGACY_DATE_SCHEMAS.iter().map(|s| s.to_string()).collect(),
            database: DEFAULT_DATABASE.to_string(),
            date_format: DATE_FORMAT.to_string(),
        }
    }
}

impl ImportConfig {
    /// Defaults, overridden by the YAML file named in `LAKEIMPORT_CONFIG` when set.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_yaml_file(Path::new(&path)),
            None => {
                let cfg = Self::default();
                cfg.validate()?;
                Ok(cfg)
            }
        }
    }

    /// Read a YAML file; missing keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: ImportConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.import_schemas.is_empty(),
            "at least one import schema is required"
        );
        for schema in &self.import_schemas {
            if schema.is_empty() {
                bail!("import schema prefixes must not be empty");
            }
            // derived schemas stop at these characters
            if schema.contains(|c: char| matches!(c, '_' | '/' | '.')) {
                bail!("import schema prefix `{}` must not contain `_`, `/` or `.`", schema);
            }
        }
        ensure!(
            self.zip_file.ends_with(".zip") && self.zip_file.len() > ".zip".len(),
            "archive name `{}` must end in .zip",
            self.zip_file
        );
        normalize_database_name(&self.database)
            .with_context(|| format!("invalid database in config: `{}`", self.database))?;
        Ok(())
    }

    /// Archive name without its `.zip` suffix; names the extraction folder.
    pub fn dataset_folder(&self) -> &str {
        self.zip_file.strip_suffix(".zip").unwrap_or(&self.zip_file)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.base_path.join(&self.files_segment)
    }

    /// Root of the extracted tree: `<base>/<files>/<dataset>`.
    pub fn dataset_dir(&self) -> PathBuf {
        self.files_dir().join(self.dataset_folder())
    }

    pub fn archive_path(&self) -> PathBuf {
        self.files_dir().join(format!("{}.zip", self.dataset_folder()))
    }

    pub fn schema_dir(&self, schema: &str) -> PathBuf {
        self.dataset_dir().join(schema)
    }

    pub fn warehouse_dir(&self) -> PathBuf {
        self.base_path.join(&self.tables_segment)
    }

    /// Spotify tracks go back far enough to need legacy rebasing; everything else is corrected.
    pub fn rebase_mode_for(&self, schema: &str) -> RebaseMode {
        if self.legacy_date_schemas.iter().any(|s| s == schema) {
            RebaseMode::Legacy
        } else {
            RebaseMode::Corrected
        }
    }

    pub fn load_options_for(&self, schema: &str) -> LoadOptions {
        LoadOptions {
            date_format: self.date_format.clone(),
            rebase: self.rebase_mode_for(schema),
            ..LoadOptions::default()
        }
    }
}
