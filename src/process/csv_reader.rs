use anyhow::{bail, Context, Result};
use arrow::{
    array::{
        ArrayRef, BooleanBuilder, Date32Builder, Float64Builder, Int32Builder, Int64Builder,
        StringBuilder,
    },
    datatypes::{DataType, Field, Schema},
    record_batch::{RecordBatch, RecordBatchOptions},
};
use csv::{ByteRecord, ReaderBuilder, StringRecord};
use std::{fs::File, io::Read, path::Path, sync::Arc};
use tracing::{debug, info};

use super::{
    date_parser,
    utils::{infer_from_str, normalize_headers, parse_bool, InferredType},
    LoadOptions, ParseMode, Table,
};

/// Load a CSV file into a [`Table`].
#[tracing::instrument(level = "debug", skip(path, options), fields(path = %path.as_ref().display()))]
pub fn read_csv<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Table> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
    let table = read_csv_from_reader(file, options)
        .with_context(|| format!("loading {}", path.display()))?;
    info!(
        rows = table.num_rows(),
        columns = table.schema().fields().len(),
        "loaded {}",
        path.display()
    );
    Ok(table)
}

/// Load CSV from any reader.
///
/// Records whose field count differs from the header, or that are not valid
/// UTF-8, are handled per `options.mode`. Column types are inferred over every
/// kept row unless `infer_schema` is off, in which case all columns are strings.
pub fn read_csv_from_reader<R: Read>(reader: R, options: &LoadOptions) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(options.delimiter)
        .from_reader(reader);

    let mut records = rdr.byte_records();
    let mut rows: Vec<StringRecord> = Vec::new();
    let mut dropped = 0usize;

    let headers: Vec<String> = if options.header {
        match records.next() {
            Some(first) => lossy_record(&first.context("reading CSV header")?)
                .iter()
                .map(|s| s.to_string())
                .collect(),
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };

    for (idx, result) in records.enumerate() {
        let raw = match result {
            Ok(r) => r,
            Err(e) if e.is_io_error() => {
                return Err(e).with_context(|| format!("reading CSV record {}", idx))
            }
            Err(e) => match options.mode {
                ParseMode::FailFast => {
                    return Err(e).with_context(|| format!("malformed CSV record {}", idx))
                }
                _ => {
                    debug!(record = idx, error = %e, "dropping unreadable record");
                    dropped += 1;
                    continue;
                }
            },
        };
        let record = match StringRecord::from_byte_record(raw) {
            Ok(r) => r,
            Err(e) => match options.mode {
                ParseMode::Permissive => {
                    debug!(record = idx, error = %e, "decoding record lossily");
                    lossy_record(&e.into_byte_record())
                }
                ParseMode::DropMalformed => {
                    debug!(record = idx, error = %e, "dropping undecodable record");
                    dropped += 1;
                    continue;
                }
                ParseMode::FailFast => bail!("CSV record {} is not valid UTF-8: {}", idx, e),
            },
        };
        rows.push(record);
    }

    let headers = if options.header {
        normalize_headers(&headers)
    } else {
        let width = rows.first().map(StringRecord::len).unwrap_or(0);
        (0..width).map(|i| format!("_c{}", i)).collect()
    };
    let width = headers.len();

    let mut kept = Vec::with_capacity(rows.len());
    for (idx, record) in rows.into_iter().enumerate() {
        if record.len() == width {
            kept.push(record);
            continue;
        }
        match options.mode {
            ParseMode::DropMalformed => {
                debug!(
                    record = idx,
                    fields = record.len(),
                    expected = width,
                    "dropping malformed record"
                );
                dropped += 1;
            }
            ParseMode::Permissive => kept.push(record),
            ParseMode::FailFast => bail!(
                "malformed CSV record {}: expected {} fields, found {}",
                idx,
                width,
                record.len()
            ),
        }
    }
    if dropped > 0 {
        debug!(dropped, "malformed records dropped");
    }

    let types: Vec<DataType> = (0..width)
        .map(|col| {
            if !options.infer_schema {
                return DataType::Utf8;
            }
            kept.iter()
                .map(|r| infer_from_str(r.get(col).unwrap_or(""), &options.date_format))
                .fold(InferredType::Null, InferredType::merge)
                .to_arrow()
        })
        .collect();

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(width);
    for (col, ty) in types.iter().enumerate() {
        columns.push(build_column(&kept, col, ty, &options.date_format)?);
    }

    let fields: Vec<Field> = headers
        .iter()
        .zip(&types)
        .map(|(name, ty)| Field::new(name, ty.clone(), true))
        .collect();
    let batch = RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        columns,
        &RecordBatchOptions::new().with_row_count(Some(kept.len())),
    )
    .context("assembling CSV record batch")?;

    Ok(Table::new(batch, options.rebase))
}

/// Invalid UTF-8 sequences become U+FFFD.
fn lossy_record(raw: &ByteRecord) -> StringRecord {
    raw.iter().map(|f| String::from_utf8_lossy(f)).collect()
}

fn field<'a>(record: &'a StringRecord, col: usize) -> Option<&'a str> {
    record.get(col).filter(|s| !s.is_empty())
}

/// Build one typed column. Inference saw every value, so parses cannot fail
/// except through `Permissive` padding, which yields nulls.
fn build_column(
    rows: &[StringRecord],
    col: usize,
    ty: &DataType,
    date_format: &str,
) -> Result<ArrayRef> {
    let array: ArrayRef = match ty {
        DataType::Int32 => {
            let mut b = Int32Builder::with_capacity(rows.len());
            for r in rows {
                b.append_option(field(r, col).and_then(|s| s.parse().ok()));
            }
            Arc::new(b.finish())
        }
        DataType::Int64 => {
            let mut b = Int64Builder::with_capacity(rows.len());
            for r in rows {
                b.append_option(field(r, col).and_then(|s| s.parse().ok()));
            }
            Arc::new(b.finish())
        }
        DataType::Float64 => {
            let mut b = Float64Builder::with_capacity(rows.len());
            for r in rows {
                b.append_option(field(r, col).and_then(|s| s.parse().ok()));
            }
            Arc::new(b.finish())
        }
        DataType::Boolean => {
            let mut b = BooleanBuilder::with_capacity(rows.len());
            for r in rows {
                b.append_option(field(r, col).and_then(parse_bool));
            }
            Arc::new(b.finish())
        }
        DataType::Date32 => {
            let mut b = Date32Builder::with_capacity(rows.len());
            for r in rows {
                b.append_option(
                    field(r, col).and_then(|s| date_parser::parse_date_days(s, date_format)),
                );
            }
            Arc::new(b.finish())
        }
        DataType::Utf8 => {
            let mut b = StringBuilder::new();
            for r in rows {
                b.append_option(field(r, col));
            }
            Arc::new(b.finish())
        }
        other => bail!("unsupported inferred type {}", other),
    };
    Ok(array)
}
