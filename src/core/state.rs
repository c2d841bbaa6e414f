//! AZ-012: Document store: output path derivation, atomic save, fingerprint
//! of a previously written document.

use super::error::ComposeResult;
use super::hasher::hash_file;
use std::path::{Path, PathBuf};

/// Default output directory.
pub const DEFAULT_OUT_DIR: &str = "cdktf.out";

/// Path of the synthesized document for `stack` within `out_dir`.
pub fn document_path(out_dir: &Path, stack: &str) -> PathBuf {
    out_dir.join("stacks").join(stack).join("cdk.tf.json")
}

/// Write `contents` atomically (temp file, then rename).
pub fn save_document(path: &Path, contents: &str) -> ComposeResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Fingerprint of the document already at `path`. Returns None if absent.
pub fn existing_fingerprint(path: &Path) -> ComposeResult<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    hash_file(path).map(Some)
}
