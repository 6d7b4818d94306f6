// src/process/mod.rs
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod convert;
pub mod csv_reader;
pub mod date_parser;
pub mod table;
pub mod utils;

pub use convert::apply_type_rules;
pub use csv_reader::read_csv;
pub use table::Table;

/// How dates before the 1582 Gregorian cutover are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RebaseMode {
    /// Rebase to the hybrid Julian/Gregorian calendar legacy readers expect.
    Legacy,
    /// Store proleptic Gregorian day numbers unchanged.
    #[default]
    Corrected,
}

impl fmt::Display for RebaseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebaseMode::Legacy => f.write_str("LEGACY"),
            RebaseMode::Corrected => f.write_str("CORRECTED"),
        }
    }
}

/// What to do with records whose field count does not match the header, or
/// that are not valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Keep the record, padding missing fields with nulls and ignoring extras.
    /// Invalid UTF-8 is decoded lossily.
    Permissive,
    /// Silently drop the record.
    #[default]
    DropMalformed,
    /// Abort the load.
    FailFast,
}

/// Per-call CSV load settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub header: bool,
    pub mode: ParseMode,
    pub infer_schema: bool,
    /// chrono pattern used both to infer and to parse date columns.
    pub date_format: String,
    pub rebase: RebaseMode,
    pub delimiter: u8,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            header: true,
            mode: ParseMode::DropMalformed,
            infer_schema: true,
            date_format: "%Y-%m-%d".to_string(),
            rebase: RebaseMode::Corrected,
            delimiter: b',',
        }
    }
}
