use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{CapabilityError, MetadataLookup};
use crate::resolver::VideoIdentifier;

const ENDPOINT: &str = "https://www.youtube.com/oembed";

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    #[serde(default)]
    title: Option<String>,
}

/// Title lookup through the public oEmbed endpoint (no credentials needed)
pub struct OEmbedLookup {
    client: Client,
}

impl OEmbedLookup {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn request_url(&self, id: &VideoIdentifier) -> String {
        format!(
            "{}?url={}&format=json",
            ENDPOINT,
            urlencoding::encode(&id.watch_url())
        )
    }
}

#[async_trait]
impl MetadataLookup for OEmbedLookup {
    async fn title(&self, id: &VideoIdentifier) -> Result<Option<String>, CapabilityError> {
        let response = self.client.get(self.request_url(id)).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::from_status(status, &body));
        }

        let body: OEmbedResponse = response.json().await?;
        Ok(body.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()))
    }
}

impl Default for OEmbedLookup {
    fn default() -> Self {
        Self::new()
    }
}
