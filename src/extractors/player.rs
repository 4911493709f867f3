use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::youtube::DESKTOP_USER_AGENT;
use super::{CapabilityError, CaptionTrack, CaptionsApi};
use crate::resolver::VideoIdentifier;
use crate::transcribe::processor::parse_vtt;
use crate::transcribe::TranscriptSegment;

const PLAYER_RESPONSE_MARKER: &str = "ytInitialPlayerResponse = ";

/// Public caption tracks advertised by the watch page player response
pub struct PlayerCaptions {
    client: Client,
}

impl PlayerCaptions {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    async fn get_text(&self, url: &str) -> Result<String, CapabilityError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, DESKTOP_USER_AGENT)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.8")
            .send()
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Watch page request failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::from_status(status, &body));
        }
        Ok(response.text().await?)
    }
}

impl Default for PlayerCaptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull the `ytInitialPlayerResponse` object out of a watch page
pub fn extract_player_response(html: &str) -> Option<Value> {
    let marker = html.find(PLAYER_RESPONSE_MARKER)?;
    let rest = &html[marker + PLAYER_RESPONSE_MARKER.len()..];
    let start = rest.find('{')?;
    // the stream deserializer stops at the end of the first complete value
    serde_json::Deserializer::from_str(&rest[start..])
        .into_iter::<Value>()
        .next()?
        .ok()
}

/// Caption tracks listed in a player response, or the reason the video cannot play
pub fn tracks_from_player_response(response: &Value) -> Result<Vec<CaptionTrack>, CapabilityError> {
    let status = response["playabilityStatus"]["status"].as_str().unwrap_or("OK");
    if matches!(status, "ERROR" | "LOGIN_REQUIRED" | "UNPLAYABLE") {
        let reason = response["playabilityStatus"]["reason"].as_str().unwrap_or(status);
        return Err(CapabilityError::NotFound(reason.to_string()));
    }

    let Some(tracks) = response["captions"]["playerCaptionsTracklistRenderer"]["captionTracks"].as_array() else {
        return Ok(Vec::new());
    };

    Ok(tracks
        .iter()
        .filter_map(|track| {
            let locator = track["baseUrl"].as_str()?.to_string();
            let language = track["languageCode"].as_str()?.to_string();
            let name = track["name"]["simpleText"]
                .as_str()
                .or_else(|| track["name"]["runs"][0]["text"].as_str())
                .map(str::to_string)
                .filter(|n| !n.is_empty());
            Some(CaptionTrack {
                id: track["vssId"].as_str().unwrap_or(&language).to_string(),
                is_auto_generated: track["kind"].as_str() == Some("asr"),
                language,
                name,
                locator,
            })
        })
        .collect())
}

/// Ask the timed-text endpoint for WebVTT, replacing any format it was given
pub fn vtt_url(base_url: &str) -> Result<String, CapabilityError> {
    let mut url = url::Url::parse(base_url).map_err(|e| CapabilityError::Parse(format!("caption url: {e}")))?;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| *key != "fmt")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut().clear().extend_pairs(pairs).append_pair("fmt", "vtt");
    Ok(url.into())
}

#[async_trait]
impl CaptionsApi for PlayerCaptions {
    async fn list_tracks(&self, id: &VideoIdentifier) -> Result<Vec<CaptionTrack>, CapabilityError> {
        let html = self.get_text(&id.watch_url()).await?;
        let response = extract_player_response(&html)
            .ok_or_else(|| CapabilityError::Parse(format!("no player response on the watch page of {id}")))?;

        let tracks = tracks_from_player_response(&response)?;
        tracing::debug!(video_id = %id, tracks = tracks.len(), "Listed caption tracks");
        Ok(tracks)
    }

    async fn download_track(&self, track: &CaptionTrack) -> Result<Vec<TranscriptSegment>, CapabilityError> {
        let vtt = self.get_text(&vtt_url(&track.locator)?).await?;
        Ok(parse_vtt(&vtt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_player_response_from_page() {
        let html = r#"<script>var ytInitialPlayerResponse = {"videoDetails": {"title": "a } b"}, "captions": {}};var meta = {"x": 1};</script>"#;
        let response = extract_player_response(html).unwrap();
        assert_eq!(response["videoDetails"]["title"], "a } b");
        assert!(extract_player_response("<html>consent</html>").is_none());
    }

    #[test]
    fn test_tracks_from_player_response() {
        let response = json!({
            "playabilityStatus": {"status": "OK"},
            "captions": {"playerCaptionsTracklistRenderer": {"captionTracks": [
                {"baseUrl": "https://www.youtube.com/api/timedtext?v=abc12345678&lang=ja", "languageCode": "ja",
                 "kind": "asr", "vssId": "a.ja", "name": {"simpleText": "Japanese (auto-generated)"}},
                {"baseUrl": "https://www.youtube.com/api/timedtext?v=abc12345678&lang=en", "languageCode": "en",
                 "vssId": ".en", "name": {"runs": [{"text": "English"}]}},
                {"languageCode": "fr"}
            ]}}
        });
        let tracks = tracks_from_player_response(&response).unwrap();
        assert_eq!(tracks.len(), 2);
        assert!(tracks[0].is_auto_generated);
        assert_eq!(tracks[0].id, "a.ja");
        assert_eq!(tracks[1].name.as_deref(), Some("English"));
        assert!(!tracks[1].is_auto_generated);
    }

    #[test]
    fn test_no_captions_and_unplayable() {
        assert!(tracks_from_player_response(&json!({"playabilityStatus": {"status": "OK"}}))
            .unwrap()
            .is_empty());

        let err = tracks_from_player_response(&json!({
            "playabilityStatus": {"status": "ERROR", "reason": "Video unavailable"}
        }))
        .unwrap_err();
        assert!(err.is_content_absence());
    }

    #[test]
    fn test_vtt_url_replaces_format() {
        let url = vtt_url("https://www.youtube.com/api/timedtext?v=abc12345678&fmt=srv3&lang=en").unwrap();
        assert_eq!(url, "https://www.youtube.com/api/timedtext?v=abc12345678&lang=en&fmt=vtt");
        assert!(vtt_url("not a url").is_err());
    }
}
