use anyhow::{bail, Context, Result};
use arrow::{
    array::{ArrayRef, Date32Array},
    compute::concat_batches,
    datatypes::{DataType, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use chrono::Utc;
use glob::glob;
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::Compression,
    file::{metadata::KeyValue, properties::WriterProperties},
};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info};

use super::{
    metadata::{TableMeta, META_FILE},
    normalize_database_name, normalize_table_name, SourceFormat, TableDescriptor, TableStore, WriteMode,
};
use crate::process::{
    date_parser::{rebase_gregorian_to_julian, rebase_julian_to_gregorian},
    read_csv, LoadOptions, RebaseMode, Table,
};

/// Parquet key marking files whose dates were rebased to the hybrid calendar.
pub const LEGACY_DATETIME_KEY: &str = "org.apache.spark.legacyDateTime";

/// Managed tables kept as Parquet parts under `<warehouse>/<database>/<table>/`.
pub struct ParquetCatalog {
    warehouse: PathBuf,
    database: String,
}

impl ParquetCatalog {
    /// Open (creating if needed) `database` inside `warehouse`.
    pub fn open(warehouse: impl Into<PathBuf>, database: &str) -> Result<Self> {
        let warehouse = warehouse.into();
        let catalog = Self {
            warehouse,
            database: normalize_database_name(database)?,
        };
        let dir = catalog.database_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating database directory {}", dir.display()))?;
        Ok(catalog)
    }

    pub fn database_dir(&self) -> PathBuf {
        self.warehouse.join(&self.database)
    }

    fn table_dir(&self, name: &str) -> PathBuf {
        self.database_dir().join(name)
    }

    fn exists(&self, name: &str) -> bool {
        TableMeta::path_in(&self.table_dir(name)).is_file()
    }

    fn part_paths(table_dir: &Path) -> Result<Vec<PathBuf>> {
        let pattern = format!("{}/part-*.parquet", table_dir.display());
        let mut parts: Vec<PathBuf> = glob(&pattern)
            .with_context(|| format!("invalid glob pattern {}", pattern))?
            .filter_map(Result::ok)
            .collect();
        parts.sort();
        Ok(parts)
    }

    fn part_name(index: usize) -> String {
        format!("part-{:05}.parquet", index)
    }

    /// Stage a fresh table next to the target, then swap it in.
    fn replace(&self, table: &Table, name: &str) -> Result<()> {
        let staging = self.database_dir().join(format!(".{}.staging", name));
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .with_context(|| format!("clearing {}", staging.display()))?;
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("creating {}", staging.display()))?;

        write_part(&staging.join(Self::part_name(0)), table)?;
        let meta = TableMeta {
            name: name.to_string(),
            database: self.database.clone(),
            columns: TableMeta::columns_of(&table.schema()),
            rows: table.num_rows() as u64,
            parts: 1,
            rebase: table.rebase(),
            updated_at: Utc::now(),
        };
        meta.write(&staging)?;

        let target = self.table_dir(name);
        if target.exists() {
            fs::remove_dir_all(&target)
                .with_context(|| format!("removing old table {}", target.display()))?;
        }
        fs::rename(&staging, &target).with_context(|| {
            format!("renaming {} -> {}", staging.display(), target.display())
        })?;
        Ok(())
    }

    fn append(&self, table: &Table, name: &str) -> Result<()> {
        let dir = self.table_dir(name);
        let mut meta = TableMeta::read(&dir)?;
        let incoming = TableMeta::columns_of(&table.schema());
        if meta.columns != incoming {
            bail!(
                "cannot append to `{}`: schema {:?} does not match {:?}",
                name,
                incoming,
                meta.columns
            );
        }
        if meta.rebase != table.rebase() {
            bail!(
                "cannot append to `{}`: table uses {} date rebasing, data uses {}",
                name,
                meta.rebase,
                table.rebase()
            );
        }

        let index = Self::part_paths(&dir)?.len();
        write_part(&dir.join(Self::part_name(index)), table)?;
        meta.rows += table.num_rows() as u64;
        meta.parts = index + 1;
        meta.updated_at = Utc::now();
        meta.write(&dir)
    }
}

impl TableStore for ParquetCatalog {
    fn load(&self, path: &Path, format: SourceFormat, options: &LoadOptions) -> Result<Table> {
        match format {
            SourceFormat::Csv => read_csv(path, options),
            SourceFormat::Parquet => read_parquet(path),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, table), fields(rows = table.num_rows()))]
    fn write(&self, table: &Table, name: &str, mode: WriteMode) -> Result<()> {
        let name = normalize_table_name(name)?;
        let exists = self.exists(&name);
        match (mode, exists) {
            (WriteMode::ErrorIfExists, true) => {
                bail!("table `{}.{}` already exists", self.database, name)
            }
            (WriteMode::Ignore, true) => {
                debug!(table = %name, "table exists; ignoring write");
                Ok(())
            }
            (WriteMode::Append, true) => self.append(table, &name),
            _ => self.replace(table, &name),
        }
    }

    fn list_tables(&self) -> Result<Vec<TableDescriptor>> {
        let dir = self.database_dir();
        let mut tables = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = match file_name.to_str() {
                Some(n) if !n.starts_with('.') => n,
                _ => continue,
            };
            let table_dir = entry.path();
            if !table_dir.join(META_FILE).is_file() {
                continue;
            }
            let meta = TableMeta::read(&table_dir)?;
            tables.push(TableDescriptor {
                name: name.to_string(),
                database: self.database.clone(),
                columns: meta.columns,
                rows: meta.rows,
            });
        }
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    fn drop_table(&self, name: &str) -> Result<()> {
        let name = normalize_table_name(name)?;
        let dir = self.table_dir(&name);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("dropping table {}", dir.display()))?;
            info!(table = %name, database = %self.database, "dropped table");
        } else {
            debug!(table = %name, "drop skipped; table does not exist");
        }
        Ok(())
    }

    fn current_database(&self) -> &str {
        &self.database
    }

    fn read_table(&self, name: &str) -> Result<Table> {
        let name = normalize_table_name(name)?;
        let dir = self.table_dir(&name);
        if !self.exists(&name) {
            bail!("table `{}.{}` not found", self.database, name);
        }
        let meta = TableMeta::read(&dir)?;

        let mut schema: Option<SchemaRef> = None;
        let mut batches = Vec::new();
        for part in Self::part_paths(&dir)? {
            let (part_schema, part_batches, _) = read_part(&part)?;
            schema.get_or_insert(part_schema);
            batches.extend(part_batches);
        }
        let schema = schema.with_context(|| format!("table `{}` has no data files", name))?;
        let batch = concat_batches(&schema, &batches)
            .with_context(|| format!("combining parts of `{}`", name))?;
        Ok(Table::new(batch, meta.rebase))
    }
}

/// Rewrite every Date32 column through `f`.
fn map_dates(batch: &RecordBatch, f: fn(i32) -> i32) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = batch
        .columns()
        .iter()
        .map(|col| match col.as_any().downcast_ref::<Date32Array>() {
            Some(dates) => {
                let rebased: Date32Array = dates.iter().map(|d| d.map(f)).collect();
                Arc::new(rebased) as ArrayRef
            }
            None => col.clone(),
        })
        .collect();
    RecordBatch::try_new(batch.schema(), columns).context("rebasing date columns")
}

fn has_dates(schema: &Schema) -> bool {
    schema
        .fields()
        .iter()
        .any(|f| f.data_type() == &DataType::Date32)
}

/// Write one Parquet part, rebasing dates first for legacy tables.
fn write_part(path: &Path, table: &Table) -> Result<()> {
    let mut props = WriterProperties::builder().set_compression(Compression::SNAPPY);
    let batch = match table.rebase() {
        RebaseMode::Legacy => {
            props = props.set_key_value_metadata(Some(vec![KeyValue::new(
                LEGACY_DATETIME_KEY.to_string(),
                String::new(),
            )]));
            if has_dates(&table.schema()) {
                map_dates(table.batch(), rebase_gregorian_to_julian)?
            } else {
                table.batch().clone()
            }
        }
        RebaseMode::Corrected => table.batch().clone(),
    };

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props.build()))
        .context("creating parquet writer")?;
    writer.write(&batch).context("writing batch to parquet")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

/// Read one Parquet file, undoing legacy date rebasing when the file is tagged.
fn read_part(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>, RebaseMode)> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet footer of {}", path.display()))?;

    let legacy = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .map(|kvs| kvs.iter().any(|kv| kv.key == LEGACY_DATETIME_KEY))
        .unwrap_or(false);
    // drop file-level metadata so parts of one table share a schema
    let schema: SchemaRef = Arc::new(Schema::new(builder.schema().fields().clone()));

    let reader = builder.build().context("building parquet reader")?;
    let mut batches = Vec::new();
    for batch in reader {
        let batch = batch.with_context(|| format!("reading {}", path.display()))?;
        let batch = RecordBatch::try_new(schema.clone(), batch.columns().to_vec())?;
        let batch = if legacy && has_dates(&schema) {
            map_dates(&batch, rebase_julian_to_gregorian)?
        } else {
            batch
        };
        batches.push(batch);
    }

    let rebase = if legacy {
        RebaseMode::Legacy
    } else {
        RebaseMode::Corrected
    };
    Ok((schema, batches, rebase))
}

/// Load a standalone Parquet file as a table.
pub fn read_parquet(path: &Path) -> Result<Table> {
    let (schema, batches, rebase) = read_part(path)?;
    let batch = concat_batches(&schema, &batches)
        .with_context(|| format!("combining batches of {}", path.display()))?;
    Ok(Table::new(batch, rebase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{csv_reader::read_csv_from_reader, date_parser::parse_date_days};
    use arrow::array::{Array, Int32Array};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn table(csv: &str, rebase: RebaseMode) -> Table {
        let options = LoadOptions {
            rebase,
            ..LoadOptions::default()
        };
        read_csv_from_reader(Cursor::new(csv.as_bytes()), &options).unwrap()
    }

    fn ints(table: &Table, column: &str) -> Vec<i32> {
        table
            .column(column)
            .unwrap()
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap()
            .values()
            .to_vec()
    }

    #[test]
    fn test_write_then_read_back() -> Result<()> {
        let dir = tempdir()?;
        let store = ParquetCatalog::open(dir.path(), "default")?;
        let t = table("id,title\n1,a\n2,b\n", RebaseMode::Corrected);

        store.write(&t, "bp__tracks", WriteMode::Overwrite)?;
        let back = store.read_table("bp__tracks")?;
        assert_eq!(back.column_names(), vec!["id", "title"]);
        assert_eq!(ints(&back, "id"), vec![1, 2]);
        assert_eq!(back.data_type("title"), Some(DataType::Utf8));
        Ok(())
    }

    #[test]
    fn test_overwrite_replaces_schema_and_rows() -> Result<()> {
        let dir = tempdir()?;
        let store = ParquetCatalog::open(dir.path(), "default")?;
        store.write(&table("a\n1\n2\n3\n", RebaseMode::Corrected), "t", WriteMode::Overwrite)?;
        store.write(&table("b\n9\n", RebaseMode::Corrected), "t", WriteMode::Overwrite)?;

        let back = store.read_table("t")?;
        assert_eq!(back.column_names(), vec!["b"]);
        assert_eq!(back.num_rows(), 1);
        let listed = store.list_tables()?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].rows, 1);
        Ok(())
    }

    #[test]
    fn test_other_write_modes() -> Result<()> {
        let dir = tempdir()?;
        let store = ParquetCatalog::open(dir.path(), "default")?;
        let t = table("a\n1\n", RebaseMode::Corrected);
        store.write(&t, "t", WriteMode::ErrorIfExists)?;
        assert!(store.write(&t, "t", WriteMode::ErrorIfExists).is_err());

        store.write(&table("a\n5\n", RebaseMode::Corrected), "t", WriteMode::Ignore)?;
        assert_eq!(ints(&store.read_table("t")?, "a"), vec![1]);

        store.write(&table("a\n2\n", RebaseMode::Corrected), "t", WriteMode::Append)?;
        assert_eq!(ints(&store.read_table("t")?, "a"), vec![1, 2]);

        let wrong = table("b\nx\n", RebaseMode::Corrected);
        assert!(store.write(&wrong, "t", WriteMode::Append).is_err());
        Ok(())
    }

    #[test]
    fn test_list_and_drop() -> Result<()> {
        let dir = tempdir()?;
        let store = ParquetCatalog::open(dir.path(), "music")?;
        assert_eq!(store.current_database(), "music");
        let t = table("a\n1\n", RebaseMode::Corrected);
        store.write(&t, "sp__artist", WriteMode::Overwrite)?;
        store.write(&t, "BP__Tracks", WriteMode::Overwrite)?;

        let names: Vec<String> = store.list_tables()?.into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["bp__tracks", "sp__artist"]);

        store.drop_table("bp__tracks")?;
        store.drop_table("bp__tracks")?;
        let names: Vec<String> = store.list_tables()?.into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["sp__artist"]);
        assert!(store.read_table("bp__tracks").is_err());
        Ok(())
    }

    #[test]
    fn test_legacy_tables_rebase_on_disk_only() -> Result<()> {
        let dir = tempdir()?;
        let store = ParquetCatalog::open(dir.path(), "default")?;
        let t = table("release_date\n1000-01-01\n2001-05-06\n", RebaseMode::Legacy);
        store.write(&t, "sp__album", WriteMode::Overwrite)?;

        // raw part file carries the rebased day numbers and the legacy tag
        let part = dir.path().join("default/sp__album/part-00000.parquet");
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&part)?)?;
        let tagged = builder
            .metadata()
            .file_metadata()
            .key_value_metadata()
            .map(|kvs| kvs.iter().any(|kv| kv.key == LEGACY_DATETIME_KEY))
            .unwrap_or(false);
        assert!(tagged);
        let raw = builder.build()?.next().unwrap()?;
        let raw = raw
            .column(0)
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap()
            .clone();
        let original = parse_date_days("1000-01-01", "%Y-%m-%d").unwrap();
        assert_eq!(raw.value(0), original + 5);

        // reading through the store restores the proleptic value
        let back = store.read_table("sp__album")?;
        assert_eq!(back.rebase(), RebaseMode::Legacy);
        let dates = back
            .column("release_date")
            .unwrap()
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();
        assert_eq!(dates.value(0), original);
        assert_eq!(
            dates.value(1),
            parse_date_days("2001-05-06", "%Y-%m-%d").unwrap()
        );
        assert!(!dates.is_null(1));

        let loaded = store.load(&part, SourceFormat::Parquet, &LoadOptions::default())?;
        assert_eq!(loaded.rebase(), RebaseMode::Legacy);
        Ok(())
    }

    #[test]
    fn test_open_rejects_escaping_database() -> Result<()> {
        let dir = tempdir()?;
        let warehouse = dir.path().join("Tables");
        assert!(ParquetCatalog::open(&warehouse, "../x").is_err());
        assert!(!dir.path().join("x").exists());
        Ok(())
    }

    #[test]
    fn test_empty_table_round_trips() -> Result<()> {
        let dir = tempdir()?;
        let store = ParquetCatalog::open(dir.path(), "default")?;
        store.write(&table("a,b\n", RebaseMode::Corrected), "empty", WriteMode::Overwrite)?;
        let back = store.read_table("empty")?;
        assert_eq!(back.num_rows(), 0);
        assert_eq!(back.column_names(), vec!["a", "b"]);
        Ok(())
    }
}
