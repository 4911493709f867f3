use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{
    CapabilityError, ChannelCatalog, ChannelInfo, ChannelLocator, LivestreamEntry, MetadataLookup, PlaylistPage,
};
use crate::resolver::VideoIdentifier;

const BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Largest page the list endpoints accept
pub const MAX_PAGE_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Snippet {
    title: String,
    description: String,
    published_at: Option<String>,
    channel_id: Option<String>,
    channel_title: Option<String>,
    thumbnails: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Statistics {
    view_count: Option<String>,
    subscriber_count: Option<String>,
    video_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ContentDetails {
    related_playlists: Option<RelatedPlaylists>,
    video_id: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveStreamingDetails {
    actual_start_time: Option<String>,
    actual_end_time: Option<String>,
    scheduled_start_time: Option<String>,
    concurrent_viewers: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    #[serde(default)]
    id: serde_json::Value,
    #[serde(default)]
    snippet: Snippet,
    #[serde(default)]
    statistics: Statistics,
    #[serde(default)]
    content_details: ContentDetails,
    #[serde(default)]
    live_streaming_details: Option<LiveStreamingDetails>,
}

impl Item {
    /// Plain ids on most resources, `{"channelId": ...}` on search results
    fn id_str(&self) -> Option<&str> {
        self.id.as_str().or_else(|| self.id["channelId"].as_str())
    }
}

/// Pick the search result whose title matches `name` exactly, then one containing it, then the first
pub fn best_channel_match<'a>(name: &str, candidates: &'a [(String, String)]) -> Option<&'a str> {
    let wanted = name.to_lowercase();
    candidates
        .iter()
        .find(|(_, title)| title.to_lowercase() == wanted)
        .or_else(|| candidates.iter().find(|(_, title)| title.to_lowercase().contains(&wanted)))
        .or_else(|| candidates.first())
        .map(|(id, _)| id.as_str())
}

fn channel_from_item(item: Item) -> Option<ChannelInfo> {
    let id = item.id_str()?.to_string();
    Some(ChannelInfo {
        id,
        title: item.snippet.title,
        description: item.snippet.description,
        published_at: item.snippet.published_at,
        view_count: item.statistics.view_count,
        subscriber_count: item.statistics.subscriber_count.unwrap_or_else(|| "hidden".to_string()),
        video_count: item.statistics.video_count,
        uploads_playlist: item.content_details.related_playlists.and_then(|p| p.uploads),
    })
}

fn livestream_from_item(item: Item) -> Option<LivestreamEntry> {
    let id = item.id_str()?.to_string();
    let live = item.live_streaming_details?;
    Some(LivestreamEntry {
        url: format!("https://www.youtube.com/watch?v={id}"),
        id,
        title: item.snippet.title,
        description: item.snippet.description,
        published_at: item.snippet.published_at,
        channel_id: item.snippet.channel_id,
        channel_title: item.snippet.channel_title,
        thumbnails: item.snippet.thumbnails,
        duration: item.content_details.duration,
        view_count: item.statistics.view_count,
        like_count: item.statistics.like_count,
        comment_count: item.statistics.comment_count,
        actual_start_time: live.actual_start_time,
        actual_end_time: live.actual_end_time,
        scheduled_start_time: live.scheduled_start_time,
        concurrent_viewers: live.concurrent_viewers,
    })
}

/// YouTube Data API v3 client for video titles and channel listings
pub struct YouTubeDataApi {
    client: Client,
    api_key: String,
}

impl YouTubeDataApi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
        }
    }

    async fn list(&self, path: &str, query: &[(&str, &str)]) -> Result<ListResponse<Item>, CapabilityError> {
        let response = self
            .client
            .get(format!("{BASE_URL}/{path}"))
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .inspect_err(|e| tracing::warn!(error = %e, path, "Data API request failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::from_status(status, &body));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MetadataLookup for YouTubeDataApi {
    async fn title(&self, id: &VideoIdentifier) -> Result<Option<String>, CapabilityError> {
        let list = self.list("videos", &[("part", "snippet"), ("id", id.as_str())]).await?;
        Ok(list.items.into_iter().next().map(|item| item.snippet.title))
    }
}

#[async_trait]
impl ChannelCatalog for YouTubeDataApi {
    async fn find_channel_id(&self, locator: &ChannelLocator) -> Result<Option<String>, CapabilityError> {
        let list = match locator {
            ChannelLocator::Id(id) => return Ok(Some(id.clone())),
            ChannelLocator::Handle(handle) => {
                let handle = format!("@{handle}");
                self.list("channels", &[("part", "id"), ("forHandle", handle.as_str())]).await?
            }
            ChannelLocator::Username(name) => {
                self.list("channels", &[("part", "id"), ("forUsername", name.as_str())]).await?
            }
            ChannelLocator::Custom(name) => {
                let list = self
                    .list(
                        "search",
                        &[("part", "snippet"), ("type", "channel"), ("q", name.as_str()), ("maxResults", "5")],
                    )
                    .await?;
                let candidates: Vec<(String, String)> = list
                    .items
                    .iter()
                    .filter_map(|item| Some((item.id_str()?.to_string(), item.snippet.title.clone())))
                    .collect();
                tracing::debug!(name = %name, candidates = candidates.len(), "Searched for channel");
                return Ok(best_channel_match(name, &candidates).map(str::to_string));
            }
        };
        Ok(list.items.first().and_then(Item::id_str).map(str::to_string))
    }

    async fn channel(&self, channel_id: &str) -> Result<ChannelInfo, CapabilityError> {
        let list = self
            .list("channels", &[("part", "snippet,statistics,contentDetails"), ("id", channel_id)])
            .await?;
        list.items
            .into_iter()
            .next()
            .and_then(channel_from_item)
            .ok_or_else(|| CapabilityError::NotFound(format!("channel {channel_id}")))
    }

    async fn playlist_page(
        &self,
        playlist_id: &str,
        page_token: Option<String>,
    ) -> Result<PlaylistPage, CapabilityError> {
        let page_size = MAX_PAGE_SIZE.to_string();
        let mut query = vec![
            ("part", "contentDetails"),
            ("playlistId", playlist_id),
            ("maxResults", page_size.as_str()),
        ];
        if let Some(token) = page_token.as_deref() {
            query.push(("pageToken", token));
        }
        let list = self.list("playlistItems", &query).await?;
        Ok(PlaylistPage {
            video_ids: list.items.into_iter().filter_map(|item| item.content_details.video_id).collect(),
            next_page_token: list.next_page_token,
        })
    }

    async fn livestreams(&self, video_ids: &[String]) -> Result<Vec<LivestreamEntry>, CapabilityError> {
        if video_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = video_ids.join(",");
        let list = self
            .list(
                "videos",
                &[("part", "snippet,contentDetails,statistics,liveStreamingDetails"), ("id", ids.as_str())],
            )
            .await?;
        Ok(list.items.into_iter().filter_map(livestream_from_item).collect())
    }
}
