//! Filesystem access: folder selection and read-time metadata.

pub mod metadata;
pub mod walker;

pub use walker::{collapse_whitespace, enumerate_top_level_folders, select_files, PatternSet};
