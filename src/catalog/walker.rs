//! Catalog walker: album discovery and paginated item enumeration
//!
//! The walker owns the pacing and fault policy of catalog enumeration: one
//! page request at a time with a mandatory delay between pages, and a failed
//! page is logged and skipped so a partial album backup can complete and be
//! picked up again on the next scheduled run.

use std::sync::Arc;

use crate::config::CatalogOptions;
use crate::error::Result;
use crate::types::{Album, MediaItem};

use super::{CatalogClient, MediaVariant, RawMediaItem};

/// Walks one collection's albums and items via the injected client
#[derive(Clone)]
pub struct CatalogWalker {
    client: Arc<dyn CatalogClient>,
    options: CatalogOptions,
}

impl CatalogWalker {
    /// Create a walker over the given client
    pub fn new(client: Arc<dyn CatalogClient>, options: CatalogOptions) -> Self {
        Self { client, options }
    }

    /// List a collection's albums, keeping only those with items
    ///
    /// Order follows the service's listing order.
    pub async fn list_albums(&self, collection_id: &str) -> Result<Vec<Album>> {
        let albums = self.client.list_albums(collection_id).await?;
        let total = albums.len();
        let non_empty: Vec<Album> = albums
            .into_iter()
            .filter(|album| album.item_count > 0)
            .map(|album| Album {
                id: album.id,
                title: album.title,
                item_count: album.item_count,
            })
            .collect();
        tracing::info!(
            collection_id,
            albums = total,
            with_items = non_empty.len(),
            "listed albums"
        );
        Ok(non_empty)
    }

    /// Enumerate an album's items across all pages
    ///
    /// Issues one page request at a time, waiting `page_delay` between
    /// requests. A page that fails is logged and skipped; the concatenated
    /// result preserves the remote order of the pages that succeeded.
    pub async fn list_items(
        &self,
        collection_id: &str,
        album_id: &str,
        total_count: usize,
    ) -> Vec<MediaItem> {
        let page_size = self.options.page_size;
        let mut items = Vec::with_capacity(total_count);
        let mut offset = 0;

        while offset < total_count {
            match self
                .client
                .list_items_page(collection_id, album_id, offset, page_size)
                .await
            {
                Ok(page) => {
                    tracing::debug!(
                        collection_id,
                        album_id,
                        offset,
                        received = page.len(),
                        total_count,
                        "fetched item page"
                    );
                    items.extend(page.into_iter().filter_map(to_media_item));
                }
                Err(e) => {
                    tracing::error!(
                        collection_id,
                        album_id,
                        offset,
                        error = %e,
                        "page fetch failed, skipping page"
                    );
                }
            }

            offset += page_size;
            if offset < total_count {
                tokio::time::sleep(self.options.page_delay).await;
            }
        }

        items
    }
}

/// Pick the URL to download for an item's photo asset
///
/// The service flags the untouched original with zero width and height;
/// when no such variant exists, the largest rendition wins (width, then
/// height, then the upscaling factor as a tie-breaker).
pub fn select_primary_url(variants: &[MediaVariant]) -> Option<&str> {
    if let Some(original) = variants.iter().find(|v| v.width == 0 && v.height == 0) {
        return Some(original.url.as_str());
    }
    variants
        .iter()
        .max_by(|a, b| {
            a.width
                .cmp(&b.width)
                .then(a.height.cmp(&b.height))
                .then(a.enlarge_rate.cmp(&b.enlarge_rate))
        })
        .map(|v| v.url.as_str())
}

fn to_media_item(raw: RawMediaItem) -> Option<MediaItem> {
    let primary_url = match select_primary_url(&raw.variants) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => {
            tracing::warn!(item_name = %raw.name, "item has no usable photo URL, dropping");
            return None;
        }
    };
    Some(MediaItem {
        primary_url,
        video_url: raw.video_url,
        name: raw.name,
        upload_time: raw.upload_time,
    })
}
