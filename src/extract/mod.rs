// src/extract/mod.rs
use anyhow::{anyhow, Context, Result};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info};
use zip::ZipArchive;

/// Schema of an archive entry: the text before the first `_` of the full entry name.
///
/// - `bp_tracks.csv` → `bp`
/// - `bp_data/tracks.csv` → `bp`
/// - `bp.csv` (no underscore) → `bp`, the stem
/// - `_tracks.csv` (empty prefix) → `None`
///
/// The result never crosses a `/`, so it is always a single folder name.
pub fn schema_of(entry_name: &str) -> Option<&str> {
    let schema = match entry_name.split_once('_') {
        Some((prefix, _)) => prefix,
        None => entry_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(entry_name),
    };
    let schema = schema.split('/').next().unwrap_or(schema);
    if schema.is_empty() {
        None
    } else {
        Some(schema)
    }
}

/// An entry is accepted iff its name starts with one of the configured prefixes.
pub fn is_accepted(entry_name: &str, accepted: &[String]) -> bool {
    accepted
        .iter()
        .any(|prefix| !prefix.is_empty() && entry_name.starts_with(prefix.as_str()))
}

/// What `extract_archive` did.
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Extracted file paths, keyed by schema.
    pub extracted: BTreeMap<String, Vec<PathBuf>>,
    /// Entries left in the archive because their prefix was not accepted.
    pub skipped: usize,
}

impl ExtractReport {
    pub fn total_extracted(&self) -> usize {
        self.extracted.values().map(Vec::len).sum()
    }
}

/// Extract every accepted entry of `zip_path` into `dest_root/<schema>/`.
///
/// Existing files are overwritten. Nothing is rolled back when an entry fails:
/// whatever was written before the failure stays on disk.
#[tracing::instrument(level = "info", skip(zip_path, dest_root, accepted), fields(zip = %zip_path.as_ref().display()))]
pub fn extract_archive<P: AsRef<Path>, Q: AsRef<Path>>(
    zip_path: P,
    dest_root: Q,
    accepted: &[String],
) -> Result<ExtractReport> {
    let zip_path = zip_path.as_ref();
    let dest_root = dest_root.as_ref();

    let file = File::open(zip_path)
        .with_context(|| format!("Failed to open ZIP file: {}", zip_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Failed to read ZIP archive: {}", zip_path.display()))?;

    let mut report = ExtractReport::default();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).with_context(|| {
            format!("Failed to access ZIP entry #{} in {}", i, zip_path.display())
        })?;
        let name = entry.name().to_string();
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| anyhow!("ZIP entry `{}` escapes the destination", name))?;

        let schema = match schema_of(&name) {
            Some(schema) if is_accepted(&name, accepted) => schema.to_string(),
            _ => {
                debug!(entry = %name, "skipping entry outside import schemas");
                report.skipped += 1;
                continue;
            }
        };

        let destination = dest_root.join(&schema);
        fs::create_dir_all(&destination)
            .with_context(|| format!("creating {}", destination.display()))?;
        let out_path = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("creating {}", out_path.display()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        info!("Extracting: {}", name);
        let mut out = File::create(&out_path)
            .with_context(|| format!("creating {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {} to {}", name, out_path.display()))?;

        report.extracted.entry(schema).or_default().push(out_path);
    }

    info!(
        extracted = report.total_extracted(),
        skipped = report.skipped,
        "extraction finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::init_test_logging;
    use std::io::{Cursor, Write};
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;
    use zip::CompressionMethod;

    fn accepted() -> Vec<String> {
        vec!["bp".to_string(), "sp".to_string()]
    }

    fn write_zip(path: &Path, entries: &[(&str, &str)]) -> Result<()> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            for (name, content) in entries {
                zip.start_file(*name, options)?;
                zip.write_all(content.as_bytes())?;
            }
            zip.finish()?;
        }
        fs::write(path, &buf)?;
        Ok(())
    }

    #[test]
    fn schema_of_handles_edge_cases() {
        assert_eq!(schema_of("bp_tracks.csv"), Some("bp"));
        assert_eq!(schema_of("sp_artist_genre.csv"), Some("sp"));
        assert_eq!(schema_of("bp.csv"), Some("bp"));
        assert_eq!(schema_of("README"), Some("README"));
        assert_eq!(schema_of("_tracks.csv"), None);
        assert_eq!(schema_of(""), None);
        assert_eq!(schema_of("bp_data/tracks.csv"), Some("bp"));
        assert_eq!(schema_of("bp/tracks.csv"), Some("bp"));
        assert_eq!(schema_of("data/bp_tracks.csv"), Some("data"));
    }

    #[test]
    fn acceptance_is_a_prefix_match_on_the_entry_name() {
        let accepted = accepted();
        assert!(is_accepted("bp_tracks.csv", &accepted));
        assert!(is_accepted("sp_artist.csv", &accepted));
        assert!(is_accepted("bpx_other.csv", &accepted));
        assert!(!is_accepted("mb_tracks.csv", &accepted));
        assert!(!is_accepted("tracks_bp.csv", &accepted));
        assert!(!is_accepted("anything.csv", &[String::new()]));
    }

    #[test]
    fn test_extracts_only_accepted_entries() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let zip_path = dir.path().join("multi_table.zip");
        write_zip(
            &zip_path,
            &[
                ("bp_tracks.csv", "track_id\n1\n"),
                ("bp_genre.csv", "genre_id\n2\n"),
                ("sp_artist.csv", "artist_id\nx\n"),
                ("mb_release.csv", "release_id\n3\n"),
                ("notes.txt", "hello"),
            ],
        )?;

        let dest = dir.path().join("multi_table");
        let report = extract_archive(&zip_path, &dest, &accepted())?;

        assert_eq!(report.total_extracted(), 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.extracted["bp"].len(), 2);
        assert!(dest.join("bp").join("bp_tracks.csv").is_file());
        assert!(dest.join("bp").join("bp_genre.csv").is_file());
        assert!(dest.join("sp").join("sp_artist.csv").is_file());
        assert!(!dest.join("mb").exists());
        assert_eq!(
            fs::read_to_string(dest.join("bp").join("bp_tracks.csv"))?,
            "track_id\n1\n"
        );
        Ok(())
    }

    #[test]
    fn test_reextraction_overwrites_files() -> Result<()> {
        let dir = tempdir()?;
        let zip_path = dir.path().join("a.zip");
        let dest = dir.path().join("out");

        write_zip(&zip_path, &[("bp_tracks.csv", "track_id\n1\n")])?;
        extract_archive(&zip_path, &dest, &accepted())?;
        write_zip(&zip_path, &[("bp_tracks.csv", "track_id\n2\n")])?;
        extract_archive(&zip_path, &dest, &accepted())?;

        assert_eq!(
            fs::read_to_string(dest.join("bp").join("bp_tracks.csv"))?,
            "track_id\n2\n"
        );
        Ok(())
    }

    #[test]
    fn test_nested_entry_lands_in_its_schema_folder() -> Result<()> {
        let dir = tempdir()?;
        let zip_path = dir.path().join("nested.zip");
        write_zip(&zip_path, &[("bp_data/tracks.csv", "track_id\n1\n")])?;

        let dest = dir.path().join("out");
        let report = extract_archive(&zip_path, &dest, &["bp".to_string()])?;

        assert_eq!(report.extracted.keys().collect::<Vec<_>>(), vec!["bp"]);
        assert!(dest.join("bp").join("bp_data").join("tracks.csv").is_file());
        let folders: Vec<String> = fs::read_dir(&dest)?
            .map(|e| e.map(|e| e.file_name().to_string_lossy().to_string()))
            .collect::<io::Result<_>>()?;
        assert_eq!(folders, vec!["bp"]);
        Ok(())
    }

    #[test]
    fn test_escaping_entries_fail_the_run() -> Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("out");
        for name in ["../evil.csv", "bp/../../x.csv"] {
            let zip_path = dir.path().join("escape.zip");
            write_zip(&zip_path, &[(name, "a\n1\n")])?;
            let err = extract_archive(&zip_path, &dest, &accepted()).unwrap_err();
            assert!(
                err.to_string().contains("escapes the destination"),
                "{}: {}",
                name,
                err
            );
        }
        assert!(!dir.path().join("evil.csv").exists());
        assert!(!dir.path().join("x.csv").exists());
        Ok(())
    }

    #[test]
    fn test_directory_entries_create_folders_only() -> Result<()> {
        let dir = tempdir()?;
        let zip_path = dir.path().join("dirs.zip");
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            zip.add_directory("bp_dir/", options)?;
            zip.start_file("bp_dir/bp_tracks.csv", options)?;
            zip.write_all(b"track_id\n1\n")?;
            zip.finish()?;
        }
        fs::write(&zip_path, &buf)?;

        let dest = dir.path().join("out");
        let report = extract_archive(&zip_path, &dest, &accepted())?;

        assert!(dest.join("bp").join("bp_dir").is_dir());
        assert_eq!(report.total_extracted(), 1);
        assert_eq!(report.skipped, 0);
        Ok(())
    }

    #[test]
    fn test_missing_archive_fails() {
        let dir = tempdir().unwrap();
        let err = extract_archive(dir.path().join("nope.zip"), dir.path(), &accepted())
            .unwrap_err();
        assert!(err.to_string().contains("Failed to open ZIP file"));
    }
}
