//! Storage usage reporting for one mirrored collection

use walkdir::WalkDir;

use super::index::INDEX_FILE_NAME;
use super::paths::StorageLayout;

/// Counts for one collection's local mirror
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsageReport {
    /// Album directories present
    pub albums: u64,
    /// Media files present (index files excluded)
    pub files: u64,
    /// Total size of the counted files, in bytes
    pub bytes: u64,
}

/// Walk a collection's directory and tally albums, files and bytes
///
/// A collection that has never been backed up yields a zeroed report.
/// Unreadable entries are skipped with a warning rather than aborting the
/// scan.
pub fn scan_collection(
    layout: &StorageLayout,
    collection_id: &str,
    collection_name: Option<&str>,
) -> UsageReport {
    let root = layout.collection_dir(collection_id, collection_name);
    if !root.is_dir() {
        return UsageReport::default();
    }

    let mut report = UsageReport::default();
    for result in WalkDir::new(&root).min_depth(1) {
        let dir_entry = match result {
            Ok(dir_entry) => dir_entry,
            Err(e) => {
                tracing::warn!(collection_id, error = %e, "skipping unreadable entry during usage scan");
                continue;
            }
        };
        if dir_entry.depth() == 1 && dir_entry.file_type().is_dir() {
            report.albums += 1;
        } else if dir_entry.file_type().is_file() {
            if dir_entry.file_name().to_string_lossy() == INDEX_FILE_NAME {
                continue;
            }
            report.files += 1;
            if let Ok(meta) = dir_entry.metadata() {
                report.bytes += meta.len();
            }
        }
    }
    report
}
