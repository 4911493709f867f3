//! Past livestreams of a channel.
//!
//! Walks the channel's uploads playlist page by page and keeps the videos that carry live
//! streaming details. The resulting listing is written as JSON whose `livestreams` array is a
//! valid input for a harvesting run.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::extractors::data_api::MAX_PAGE_SIZE;
use crate::extractors::{CapabilityError, ChannelCatalog, ChannelInfo, ChannelLocator, LivestreamEntry};
use crate::retry::RetryPolicy;

pub const DEFAULT_MAX_RESULTS: usize = 50;

#[derive(thiserror::Error, Debug)]
pub enum LivestreamError {
    #[error("Not a YouTube channel URL: {0}")]
    InvalidChannelUrl(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Channel {0} has no uploads playlist")]
    NoUploads(String),

    #[error("{0}")]
    Upstream(String),
}

/// What `harvest livestreams` writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivestreamListing {
    pub channel: ChannelInfo,
    pub livestreams: Vec<LivestreamEntry>,
    pub total: usize,
    #[serde(rename = "generated_at")]
    pub generated_at: String,
}

/// Collects the livestreams of one channel through a [`ChannelCatalog`]
pub struct LivestreamCollector {
    catalog: Arc<dyn ChannelCatalog>,
    retry: RetryPolicy,
    max_results: usize,
}

impl LivestreamCollector {
    pub fn new(catalog: Arc<dyn ChannelCatalog>, retry: RetryPolicy) -> Self {
        Self {
            catalog,
            retry,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    async fn call<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, LivestreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        self.retry
            .run(operation, f, CapabilityError::is_retryable)
            .await
            .into_result()
            .map_err(|failure| LivestreamError::Upstream(failure.reason))
    }

    pub async fn resolve_channel(&self, channel_url: &str) -> Result<ChannelInfo, LivestreamError> {
        let locator = ChannelLocator::from_url(channel_url)
            .ok_or_else(|| LivestreamError::InvalidChannelUrl(channel_url.to_string()))?;

        let channel_id = self
            .call("find channel", || self.catalog.find_channel_id(&locator))
            .await?
            .ok_or_else(|| LivestreamError::ChannelNotFound(channel_url.to_string()))?;
        tracing::info!(channel_id = %channel_id, "Resolved channel");

        self.call("channel details", || self.catalog.channel(&channel_id)).await
    }

    /// Livestreams of the channel behind `channel_url`, newest uploads first
    pub async fn collect(&self, channel_url: &str) -> Result<LivestreamListing, LivestreamError> {
        let channel = self.resolve_channel(channel_url).await?;
        let uploads = channel
            .uploads_playlist
            .clone()
            .ok_or_else(|| LivestreamError::NoUploads(channel.id.clone()))?;

        let mut livestreams: Vec<LivestreamEntry> = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .call("list uploads", || self.catalog.playlist_page(&uploads, page_token.clone()))
                .await?;
            pages += 1;

            for batch in page.video_ids.chunks(MAX_PAGE_SIZE) {
                let found = self.call("video details", || self.catalog.livestreams(batch)).await?;
                livestreams.extend(found);
            }
            tracing::debug!(page = pages, found = livestreams.len(), "Scanned uploads page");

            page_token = page.next_page_token;
            if page_token.is_none() || livestreams.len() >= self.max_results {
                break;
            }
        }

        livestreams.truncate(self.max_results);
        tracing::info!(channel = %channel.title, livestreams = livestreams.len(), pages, "Collected livestreams");

        Ok(LivestreamListing {
            total: livestreams.len(),
            channel,
            livestreams,
            generated_at: Utc::now().to_rfc3339(),
        })
    }
}
