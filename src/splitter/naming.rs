//! Split filename sequencing

use std::path::{Path, PathBuf};

/// Insert a zero-padded `_NNNN` marker before the extension of `base`.
///
/// `clip.mp4` with index 1 becomes `clip_0001.mp4`. A path without an
/// extension gets the marker appended to its stem. Indices above 9999 keep
/// all their digits.
pub fn sequenced_path(base: &Path, index: u32) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut file_name = format!("{}_{:04}", stem, index);
    if let Some(ext) = base.extension() {
        file_name.push('.');
        file_name.push_str(&ext.to_string_lossy());
    }

    base.with_file_name(file_name)
}
