//! Input File Locator
//! Finds candidate experiment files directly inside a directory.

use std::path::{Path, PathBuf};
use tracing::warn;

/// Find files in `dir` (no recursion) whose extension matches one of
/// `extensions`, ignoring case. Paths listed in `exclude` are skipped,
/// however they are spelled.
///
/// Results are sorted by path. A missing directory yields an empty list.
pub fn find_input_files(
    dir: &Path,
    extensions: &[String],
    exclude: &[PathBuf],
) -> Vec<PathBuf> {
    if !dir.is_dir() {
        warn!("Source directory does not exist: {}", dir.display());
        return Vec::new();
    }

    let excluded: Vec<PathBuf> = exclude.iter().map(|path| canonical(path)).collect();

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && has_extension(entry.path(), extensions))
        .map(|entry| entry.into_path())
        .filter(|path| !excluded.contains(&canonical(path)))
        .collect();

    files.sort();
    files
}

/// Resolved form of `path`, or the path itself when it cannot be resolved.
fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|wanted| ext.eq_ignore_ascii_case(wanted)))
        .unwrap_or(false)
}
