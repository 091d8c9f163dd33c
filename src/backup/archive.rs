// clickvault/src/backup/archive.rs
use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Builder;
use walkdir::WalkDir;

/// Packs a staging tree into a gzipped tarball.
///
/// Paths inside the archive are relative to `source_dir`, so unpacking yields
/// the database directories at the top level.
pub fn pack_directory(source_dir: &Path, archive_dest_path: &Path) -> Result<PathBuf> {
    if !source_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Source for archival is not a directory: {}",
            source_dir.display()
        ));
    }
    if let Some(parent) = archive_dest_path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create parent directory for archive: {}",
                    parent.display()
                )
            })?;
        }
    }

    let archive_file = File::create(archive_dest_path).with_context(|| {
        format!(
            "Failed to create archive file: {}",
            archive_dest_path.display()
        )
    })?;
    let enc = GzEncoder::new(archive_file, Compression::default());
    let mut tar_builder = Builder::new(enc);

    for entry in WalkDir::new(source_dir) {
        let entry = entry
            .with_context(|| format!("Failed to walk directory: {}", source_dir.display()))?;
        let path = entry.path();
        let name = path.strip_prefix(source_dir).with_context(|| {
            format!(
                "Failed to strip prefix {} from {}",
                source_dir.display(),
                path.display()
            )
        })?;

        if name.as_os_str().is_empty() {
            // the staging root itself
            continue;
        }

        if path.is_dir() {
            tar_builder.append_dir(name, path).with_context(|| {
                format!("Failed to append directory {} to archive", path.display())
            })?;
        } else if path.is_file() {
            tar_builder.append_path_with_name(path, name).with_context(|| {
                format!(
                    "Failed to append file {} as {} to archive",
                    path.display(),
                    name.display()
                )
            })?;
        }
    }

    let encoder = tar_builder
        .into_inner()
        .context("Failed to finalize tar stream")?;
    encoder.finish().with_context(|| {
        format!(
            "Failed to finish gzip encoding for archive: {}",
            archive_dest_path.display()
        )
    })?;

    Ok(archive_dest_path.to_path_buf())
}

/// Unpacks a gzipped tarball into `extract_to_dir` (created if missing).
pub fn unpack_archive(archive_path: &Path, extract_to_dir: &Path) -> Result<PathBuf> {
    if !archive_path.is_file() {
        return Err(anyhow::anyhow!(
            "Archive for extraction is not a file: {}",
            archive_path.display()
        ));
    }

    if !extract_to_dir.exists() {
        std::fs::create_dir_all(extract_to_dir).with_context(|| {
            format!(
                "Failed to create extraction directory: {}",
                extract_to_dir.display()
            )
        })?;
    } else if !extract_to_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Extraction path exists but is not a directory: {}",
            extract_to_dir.display()
        ));
    }

    let archive_file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive file: {}", archive_path.display()))?;
    let gz_decoder = flate2::read::GzDecoder::new(archive_file);
    let mut archive = tar::Archive::new(gz_decoder);

    archive.unpack(extract_to_dir).with_context(|| {
        format!(
            "Failed to unpack archive {} to {}",
            archive_path.display(),
            extract_to_dir.display()
        )
    })?;

    Ok(extract_to_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_pack_and_unpack_round_trip() -> anyhow::Result<()> {
        let staging = tempfile::tempdir()?;
        let db_dir = staging.path().join("db1");
        fs::create_dir_all(&db_dir)?;
        fs::write(db_dir.join("events.schema"), "CREATE TABLE db1.events (...)")?;
        fs::write(db_dir.join("events.data"), "id\tname\n1\talpha\n")?;

        let out_dir = tempfile::tempdir()?;
        let archive = out_dir.path().join("test_backup_20250101_000000.tar.gz");
        pack_directory(staging.path(), &archive)?;
        assert!(archive.is_file());

        let extracted = tempfile::tempdir()?;
        unpack_archive(&archive, extracted.path())?;
        let schema = fs::read_to_string(extracted.path().join("db1/events.schema"))?;
        assert_eq!(schema, "CREATE TABLE db1.events (...)");
        let data = fs::read_to_string(extracted.path().join("db1/events.data"))?;
        assert!(data.contains("alpha"));
        Ok(())
    }

    #[test]
    fn test_unpack_rejects_non_archive() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let bogus = dir.path().join("bogus.tar.gz");
        fs::write(&bogus, "this is not a tarball")?;
        assert!(unpack_archive(&bogus, &dir.path().join("out")).is_err());
        Ok(())
    }

    #[test]
    fn test_pack_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = pack_directory(&dir.path().join("nope"), &dir.path().join("a.tar.gz"));
        assert!(result.is_err());
    }
}
