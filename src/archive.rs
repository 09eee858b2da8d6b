use camino::{Utf8Path, Utf8PathBuf};

use crate::codepage::NameRepair;
use crate::error::GcisError;
use crate::fs_util::extract_zip;
use crate::gcis::GcisClient;

/// Downloads the zip archive at `url` into memory and extracts it under
/// `destination_dir`, repairing entry names with `repair`.
///
/// Partially extracted files are left in place when extraction fails.
pub fn fetch_and_extract<C: GcisClient + ?Sized>(
    client: &C,
    url: &str,
    destination_dir: &Utf8Path,
    repair: &dyn NameRepair,
) -> Result<Vec<Utf8PathBuf>, GcisError> {
    tracing::info!(url, "downloading archive");
    let bytes = client.download(url)?;
    tracing::info!(url, bytes = bytes.len(), "download completed");
    extract_zip(&bytes, destination_dir, repair)
}
