//! Folder selection: directory traversal with include/exclude globs.
//!
//! Paths are matched in their slash-separated form relative to the folder
//! being walked, so the same patterns behave identically on every platform.

use crate::executor::manifest::{ExportManifest, FileEntry};
use crate::utils::errors::TraversalError;
use glob::Pattern;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;
use walkdir::WalkDir;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// A compiled list of glob patterns.
///
/// `*` and `?` also match `/`, so `*.xmp` matches `1/c.xmp`.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, TraversalError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Pattern::new(p).map_err(|source| TraversalError::InvalidPattern {
                    pattern: p.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// True if any pattern matches `path`
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }
}

/// Replace every run of whitespace with a single `-`.
pub fn collapse_whitespace(name: &str) -> String {
    WHITESPACE.replace_all(name, "-").into_owned()
}

/// Join the normal components of `path` with `/`.
///
/// Returns `None` if any component is not valid UTF-8.
pub fn to_slash(path: &Path) -> Option<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_str()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .map(|parts| parts.join("/"))
}

fn relative_to<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

/// Lossy slash form, only used to test exclusions
fn match_path(path: &Path, root: &Path) -> String {
    relative_to(path, root)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn walk_error(root: &Path, source: walkdir::Error) -> TraversalError {
    let path = source
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    TraversalError::Walk { path, source }
}

/// Walk `root` and build the manifest of every regular file not excluded.
///
/// An excluded directory is pruned together with everything below it.
/// Symlinks are never followed and never selected. The walk stops at the
/// first unreadable entry, and at the first selected file whose relative
/// path is not valid UTF-8: ZIP entry names and the content hash need a
/// lossless name.
///
/// # Example
/// ```no_run
/// use photobackup::fs::walker::{select_files, PatternSet};
/// use std::path::Path;
///
/// let excludes = PatternSet::new(&["*.xmp"]).unwrap();
/// let manifest = select_files(Path::new("/photos/export 2024"), &excludes).unwrap();
/// println!("{}: {} files", manifest.object_name(), manifest.files.len());
/// ```
pub fn select_files(root: &Path, excludes: &PatternSet) -> Result<ExportManifest, TraversalError> {
    let name = root
        .file_name()
        .map(|n| collapse_whitespace(&n.to_string_lossy()))
        .unwrap_or_default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !excludes.matches(&match_path(entry.path(), root))
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;

        // Directories, symlinks, devices and sockets are never archived
        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = entry.metadata().map_err(|e| walk_error(root, e))?;
        let relative_path = to_slash(relative_to(entry.path(), root)).ok_or_else(|| {
            TraversalError::NonUtf8Path {
                path: entry.path().to_path_buf(),
            }
        })?;
        debug!(file = %relative_path, size = metadata.len(), "selected");

        files.push(FileEntry {
            path: entry.path().to_path_buf(),
            relative_path,
            size: metadata.len(),
        });
    }

    Ok(ExportManifest::new(name, files))
}

/// List the immediate subdirectories of `base` whose name matches `includes`.
///
/// Returned in file-name order. Symlinked directories are not candidates.
pub fn enumerate_top_level_folders(
    base: &Path,
    includes: &PatternSet,
) -> Result<Vec<PathBuf>, TraversalError> {
    let mut folders = Vec::new();

    let walker = WalkDir::new(base)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| walk_error(base, e))?;
        if !entry.file_type().is_dir() {
            continue;
        }

        if includes.matches(&entry.file_name().to_string_lossy()) {
            folders.push(entry.into_path());
        }
    }

    Ok(folders)
}
