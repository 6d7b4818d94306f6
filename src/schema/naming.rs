// src/schema/naming.rs

use std::path::Path;

/// Managed table name for a CSV file of `schema`.
///
/// The extension is dropped and the separator after the schema prefix is
/// doubled, so `bp_tracks.csv` becomes `bp__tracks`. Only the leading prefix is
/// touched; a file that does not start with `<schema>_` keeps its stem.
pub fn table_name(file_name: &str, schema: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    let prefix = format!("{}_", schema);
    match stem.strip_prefix(&prefix) {
        Some(rest) => format!("{}_{}", prefix, rest),
        None => stem.to_string(),
    }
}
