use std::fs;
use std::io::{self, Cursor};

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use zip::ZipArchive;

use crate::codepage::NameRepair;
use crate::error::GcisError;

/// Extracts an in-memory zip archive under `target_dir`, renaming every entry
/// through `repair`. Returns the final paths in archive order.
pub fn extract_zip(
    bytes: &[u8],
    target_dir: &Utf8Path,
    repair: &dyn NameRepair,
) -> Result<Vec<Utf8PathBuf>, GcisError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| GcisError::Archive(err.to_string()))?;
    fs::create_dir_all(target_dir.as_std_path())
        .map_err(|err| GcisError::Filesystem(format!("create {target_dir}: {err}")))?;

    let mut extracted = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| GcisError::Archive(err.to_string()))?;
        let name = entry.name().to_string();
        let entry_path = match entry
            .enclosed_name()
            .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        {
            Some(path) => target_dir.join(path),
            None => {
                return Err(GcisError::Filesystem(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };
        let repaired = repair.repair(&name);
        let final_path = match enclosed_relative(&repaired) {
            Some(relative) => target_dir.join(relative),
            None => {
                return Err(GcisError::Filesystem(format!(
                    "repaired entry name escapes target directory: {repaired}"
                )));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(final_path.as_std_path())
                .map_err(|err| GcisError::Filesystem(err.to_string()))?;
            extracted.push(final_path);
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| GcisError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(entry_path.as_std_path())
            .map_err(|err| GcisError::Filesystem(format!("create {entry_path}: {err}")))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| GcisError::Filesystem(err.to_string()))?;
        drop(outfile);

        if final_path != entry_path {
            if let Some(parent) = final_path.parent() {
                fs::create_dir_all(parent.as_std_path())
                    .map_err(|err| GcisError::Filesystem(err.to_string()))?;
            }
            fs::rename(entry_path.as_std_path(), final_path.as_std_path()).map_err(|err| {
                GcisError::Filesystem(format!("rename {entry_path} to {final_path}: {err}"))
            })?;
            tracing::debug!(from = %entry_path, to = %final_path, "repaired entry name");
        }
        tracing::info!(path = %final_path, "extracted");
        extracted.push(final_path);
    }
    Ok(extracted)
}

fn enclosed_relative(name: &str) -> Option<Utf8PathBuf> {
    let mut relative = Utf8PathBuf::new();
    for component in Utf8Path::new(name).components() {
        match component {
            Utf8Component::Normal(part) => relative.push(part),
            Utf8Component::CurDir => {}
            _ => return None,
        }
    }
    (!relative.as_str().is_empty()).then_some(relative)
}
