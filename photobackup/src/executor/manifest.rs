//! Export manifest types.
//!
//! A manifest is the resolved, ordered and hashed list of files that make up
//! one archive. The content hash is what the destination records next to the
//! stored object to decide whether a folder was already archived.

use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Metadata key holding the manifest hash on every stored object.
pub const CONTENT_HASH_KEY: &str = "content-hash";

/// A single file selected for archiving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Location used to read the file at archive time
    pub path: PathBuf,

    /// Slash-separated path relative to the folder root, used as the entry name
    pub relative_path: String,

    /// Size in bytes at selection time
    pub size: u64,
}

/// The unit of work for one top-level folder.
#[derive(Debug, Clone)]
pub struct ExportManifest {
    pub name: String,
    pub files: Vec<FileEntry>,
    pub content_hash: String,
}

impl ExportManifest {
    /// Build a manifest, sorting entries by relative path and hashing them.
    pub fn new(name: impl Into<String>, mut files: Vec<FileEntry>) -> Self {
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        let content_hash = content_hash(&files);

        Self {
            name: name.into(),
            files,
            content_hash,
        }
    }

    /// Object name the archive is stored under
    pub fn object_name(&self) -> String {
        format!("{}.zip", self.name)
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// SHA-256 over `relative_path:size` of every entry, in order, hex encoded.
///
/// Entries are concatenated without a separator so hashes stay comparable
/// with archives that are already stored.
pub fn content_hash(files: &[FileEntry]) -> String {
    let mut hasher = Sha256::new();
    for file in files {
        hasher.update(format!("{}:{}", file.relative_path, file.size).as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(relative_path: &str, size: u64) -> FileEntry {
        FileEntry {
            path: PathBuf::from("/data").join(relative_path),
            relative_path: relative_path.to_string(),
            size,
        }
    }

    #[test]
    fn test_entries_sorted_by_relative_path() {
        let manifest = ExportManifest::new(
            "trip",
            vec![entry("2/b.txt", 3), entry("1/c.txt", 3), entry("2/a.txt", 3)],
        );

        let names: Vec<_> = manifest.files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(names, vec!["1/c.txt", "2/a.txt", "2/b.txt"]);
        assert_eq!(manifest.total_bytes(), 9);
        assert_eq!(manifest.object_name(), "trip.zip");
    }

    #[test]
    fn test_hash_of_empty_manifest() {
        let manifest = ExportManifest::new("empty", Vec::new());
        assert!(manifest.is_empty());
        assert_eq!(
            manifest.content_hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_ignores_traversal_order() {
        let a = ExportManifest::new("x", vec![entry("a.jpg", 10), entry("b.jpg", 20)]);
        let b = ExportManifest::new("x", vec![entry("b.jpg", 20), entry("a.jpg", 10)]);
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_hash_ignores_absolute_location() {
        let mut moved = entry("a.jpg", 10);
        moved.path = PathBuf::from("/elsewhere/a.jpg");

        let a = ExportManifest::new("x", vec![entry("a.jpg", 10)]);
        let b = ExportManifest::new("x", vec![moved]);
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_hash_detects_resize_addition_and_removal() {
        let base = ExportManifest::new("x", vec![entry("a.jpg", 10), entry("b.jpg", 20)]);
        let resized = ExportManifest::new("x", vec![entry("a.jpg", 11), entry("b.jpg", 20)]);
        let added = ExportManifest::new(
            "x",
            vec![entry("a.jpg", 10), entry("b.jpg", 20), entry("c.jpg", 1)],
        );
        let removed = ExportManifest::new("x", vec![entry("a.jpg", 10)]);

        assert_ne!(base.content_hash, resized.content_hash);
        assert_ne!(base.content_hash, added.content_hash);
        assert_ne!(base.content_hash, removed.content_hash);
    }

    #[test]
    fn test_hash_is_lowercase_hex_sha256() {
        let manifest = ExportManifest::new("x", vec![entry("a.jpg", 10)]);
        assert_eq!(manifest.content_hash.len(), 64);
        assert!(manifest
            .content_hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}
