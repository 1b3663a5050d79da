//! Deterministic mapping from remote identifiers to filesystem locations
//!
//! Every method is a pure function of its inputs: same inputs, same path,
//! across calls and process restarts. Downstream dedup depends on that, so
//! nothing here touches the filesystem.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Prefix for album directories whose titles sanitize to nothing
const FALLBACK_PREFIX: &str = "album_";

/// Maps (collection, album, item) coordinates to local paths
#[derive(Clone, Debug)]
pub struct StorageLayout {
    base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a layout rooted at the given base directory
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The directory all collections live under
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory for one collection
    ///
    /// The id always leads so that two collections whose display names
    /// sanitize to the same string can never merge.
    pub fn collection_dir(&self, collection_id: &str, collection_name: Option<&str>) -> PathBuf {
        let dir_name = match collection_name {
            Some(name) => format!("{}_{}", collection_id, sanitize_component(name)),
            None => collection_id.to_string(),
        };
        self.base_dir.join(dir_name)
    }

    /// Directory for one album within a collection
    pub fn album_dir(
        &self,
        collection_id: &str,
        collection_name: Option<&str>,
        album_title: &str,
    ) -> PathBuf {
        self.collection_dir(collection_id, collection_name)
            .join(album_dir_name(album_title))
    }

    /// Full path for one item's asset file
    ///
    /// `extension` is given without a leading dot ("jpg", "mp4").
    pub fn item_path(
        &self,
        collection_id: &str,
        collection_name: Option<&str>,
        album_title: &str,
        item_name: &str,
        extension: &str,
    ) -> PathBuf {
        self.album_dir(collection_id, collection_name, album_title)
            .join(format!("{}.{}", sanitize_component(item_name), extension))
    }
}

/// Replace characters illegal in filesystem names with `_`, then trim
/// surrounding whitespace
pub fn sanitize_component(name: &str) -> String {
    static ILLEGAL: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    let illegal = ILLEGAL
        .get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("static pattern compiles"));
    illegal.replace_all(name, "_").trim().to_string()
}

/// Directory name for an album title
///
/// Titles that sanitize to an empty string get a stable fallback derived
/// from a hash of the original, untrimmed title, so the same logical album
/// lands in the same directory on every run.
fn album_dir_name(title: &str) -> String {
    let sanitized = sanitize_component(title);
    if sanitized.is_empty() {
        let digest = format!("{:x}", md5::compute(title.as_bytes()));
        format!("{}{}", FALLBACK_PREFIX, &digest[..6])
    } else {
        sanitized
    }
}
