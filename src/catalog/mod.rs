//! Remote catalog boundary: the injected client trait, the HTTP
//! implementation, and the walker that turns raw listings into download
//! tasks.

pub mod qzone;
pub mod walker;

pub use qzone::QzoneCatalogClient;
pub use walker::CatalogWalker;

use async_trait::async_trait;

use crate::error::Result;

/// Raw album data as returned by the remote service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlbumSummary {
    /// Service-assigned album identifier
    pub id: String,
    /// Album title (untrusted text)
    pub title: String,
    /// Item count the service reports
    pub item_count: usize,
}

/// One resolution variant of a media item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaVariant {
    /// Direct URL of this rendition
    pub url: String,
    /// Pixel width; zero marks the untouched original
    pub width: i64,
    /// Pixel height; zero marks the untouched original
    pub height: i64,
    /// Upscaling factor the service applied; tie-breaker between variants
    pub enlarge_rate: i64,
}

/// One media item as listed in a page, before variant selection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawMediaItem {
    /// Service-assigned item name (untrusted text)
    pub name: String,
    /// Upload time in Unix seconds
    pub upload_time: i64,
    /// Available photo renditions
    pub variants: Vec<MediaVariant>,
    /// Paired video URL, when the item has one
    pub video_url: Option<String>,
}

/// Remote catalog service boundary
///
/// Both calls are fallible, possibly slow network operations. The core never
/// constructs one of these itself beyond the bundled HTTP implementation;
/// tests inject their own.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// List every album of a collection, unfiltered
    async fn list_albums(&self, collection_id: &str) -> Result<Vec<AlbumSummary>>;

    /// Fetch one page of a collection album's items
    async fn list_items_page(
        &self,
        collection_id: &str,
        album_id: &str,
        offset: usize,
        page_size: usize,
    ) -> Result<Vec<RawMediaItem>>;
}
