use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use tracing::debug;

const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3/";

/// Maximum number of video ids accepted by one detail lookup request.
pub const MAX_IDS_PER_DETAIL_REQUEST: usize = 50;

/// Search parameters for one first-stage query.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: u32,
    /// RFC 3339 UTC lower bound on publish time.
    pub published_after: String,
}

/// One hit from the first-stage search, snippet fields only.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub channel_name: String,
    pub channel_id: String,
    pub published_at: DateTime<Utc>,
    pub thumbnail_url: String,
}

/// Second-stage detail fields for one video.
#[derive(Debug, Clone)]
pub struct VideoDetails {
    pub video_id: String,
    pub duration_seconds: i64,
    pub view_count: i64,
    pub like_count: i64,
    pub country_code: Option<String>,
}

/// Seam between the pipeline and the video platform. The pipeline only ever
/// talks to this trait, so tests substitute a recording mock.
#[async_trait]
pub trait VideoApi: Send + Sync {
    async fn search_videos(&self, request: &SearchRequest) -> Result<Vec<SearchHit>>;

    /// Detail lookup for up to [`MAX_IDS_PER_DETAIL_REQUEST`] ids. Callers
    /// chunk larger id sets; the client rejects oversized batches.
    async fn list_videos(&self, ids: &[String]) -> Result<Vec<VideoDetails>>;
}

#[derive(Clone)]
pub struct YouTubeClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for YouTubeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YouTubeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl YouTubeClient {
    pub fn new(api_key: &str) -> Result<Self> {
        let base_url = Url::parse(YOUTUBE_API_BASE).expect("valid default YouTube URL");
        Self::with_base_url(api_key, base_url)
    }

    pub fn with_base_url(api_key: &str, base_url: Url) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!(
                "YouTube API key is required. Set youtube.api_key in config.yaml \
                 or the YOUTUBE_API_KEY environment variable."
            );
        }
        let http = Client::builder()
            .user_agent("tutor-scout/0.1")
            .build()
            .expect("reqwest client");
        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    pub fn build_search_request(&self, request: &SearchRequest) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("search")
            .context("invalid YouTube base URL")?;
        let max_results = request.max_results.to_string();
        self.http
            .get(endpoint)
            .query(&[
                ("part", "snippet"),
                ("q", request.query.as_str()),
                ("type", "video"),
                // Coarse platform-side duration class; the precise cut
                // happens after the detail lookup.
                ("videoDuration", "medium"),
                ("relevanceLanguage", "en"),
                ("maxResults", max_results.as_str()),
                ("order", "relevance"),
                ("publishedAfter", request.published_after.as_str()),
                ("safeSearch", "none"),
                ("videoDefinition", "high"),
                ("key", self.api_key.as_str()),
            ])
            .build()
            .context("failed to build search request")
    }

    pub fn build_videos_request(&self, ids: &[String]) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("videos")
            .context("invalid YouTube base URL")?;
        self.http
            .get(endpoint)
            .query(&[
                ("part", "contentDetails,statistics,snippet"),
                ("id", ids.join(",").as_str()),
                ("key", self.api_key.as_str()),
            ])
            .build()
            .context("failed to build videos request")
    }

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        debug!(url = %request.url().path(), "sending YouTube request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach YouTube")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("YouTube API error {}: {}", status, body));
        }
        Ok(res)
    }
}

#[async_trait]
impl VideoApi for YouTubeClient {
    async fn search_videos(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let req = self.build_search_request(request)?;
        let res = self.execute(req).await?;
        let payload: SearchResponse = res.json().await.context("invalid search response")?;
        Ok(map_search_response(payload))
    }

    async fn list_videos(&self, ids: &[String]) -> Result<Vec<VideoDetails>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > MAX_IDS_PER_DETAIL_REQUEST {
            bail!(
                "detail lookup limited to {} ids per request, got {}",
                MAX_IDS_PER_DETAIL_REQUEST,
                ids.len()
            );
        }
        let req = self.build_videos_request(ids)?;
        let res = self.execute(req).await?;
        let payload: VideosResponse = res.json().await.context("invalid videos response")?;
        Ok(map_videos_response(payload))
    }
}

/// Parse an ISO 8601-style duration restricted to H/M/S components
/// (`PT1H2M3S`, `PT15M`, `PT45S`, ...). Absent components count as zero and
/// anything unparseable collapses to zero rather than dropping the record.
pub fn parse_duration(duration: &str) -> i64 {
    static DURATION_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?").expect("valid regex"));

    let Some(caps) = DURATION_RE.captures(duration) else {
        return 0;
    };
    let component = |i: usize| -> i64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .unwrap_or(0)
    };
    component(1) * 3600 + component(2) * 60 + component(3)
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
    #[serde(rename = "channelId", default)]
    channel_id: String,
    #[serde(rename = "publishedAt")]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

fn map_search_response(payload: SearchResponse) -> Vec<SearchHit> {
    payload
        .items
        .into_iter()
        .filter_map(|item| {
            let video_id = item.id.video_id?;
            let published_at = item.snippet.published_at?;
            Some(SearchHit {
                video_id,
                title: item.snippet.title,
                description: item.snippet.description,
                channel_name: item.snippet.channel_title,
                channel_id: item.snippet.channel_id,
                published_at,
                thumbnail_url: item
                    .snippet
                    .thumbnails
                    .high
                    .map(|t| t.url)
                    .unwrap_or_default(),
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    #[serde(rename = "contentDetails", default)]
    content_details: ContentDetails,
    #[serde(default)]
    statistics: Statistics,
    #[serde(default)]
    snippet: VideoSnippet,
}

#[derive(Debug, Default, Deserialize)]
struct ContentDetails {
    #[serde(default)]
    duration: String,
}

// Statistics counts arrive as JSON strings, not numbers.
#[derive(Debug, Default, Deserialize)]
struct Statistics {
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
    #[serde(rename = "likeCount")]
    like_count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VideoSnippet {
    #[serde(rename = "defaultAudioLanguage")]
    default_audio_language: Option<String>,
}

fn map_videos_response(payload: VideosResponse) -> Vec<VideoDetails> {
    payload
        .items
        .into_iter()
        .map(|item| VideoDetails {
            video_id: item.id,
            duration_seconds: parse_duration(&item.content_details.duration),
            view_count: parse_count(item.statistics.view_count.as_deref()),
            like_count: parse_count(item.statistics.like_count.as_deref()),
            country_code: item
                .snippet
                .default_audio_language
                .filter(|c| !c.is_empty()),
        })
        .collect()
}

fn parse_count(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0)
}
