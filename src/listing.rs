#![forbid(unsafe_code)]

//! Paginated reads of a channel's uploads playlist through the public
//! `playlistItems` endpoint.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{MAX_PAGE_SIZE, REQUEST_TIMEOUT};
use crate::feed::VideoRecord;

/// One page of the `playlistItems` response. Every field is optional on the
/// wire; absent values surface as `None` in the resulting record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub snippet: Option<Snippet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub title: Option<String>,
    pub published_at: Option<String>,
    #[serde(default)]
    pub thumbnails: Thumbnails,
    pub description: Option<String>,
    pub channel_id: Option<String>,
    pub channel_title: Option<String>,
    #[serde(default)]
    pub resource_id: ResourceId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thumbnails {
    pub default: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    pub high: Option<Thumbnail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thumbnail {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub video_id: Option<String>,
}

/// Picks the best available thumbnail: high, then medium, then default.
pub fn select_thumbnail(thumbnails: &Thumbnails) -> String {
    [&thumbnails.high, &thumbnails.medium, &thumbnails.default]
        .into_iter()
        .flatten()
        .filter_map(|thumb| thumb.url.as_deref())
        .find(|url| !url.is_empty())
        .unwrap_or_default()
        .to_string()
}

impl VideoRecord {
    /// Normalizes a listing entry. Entries without a video id cannot be keyed
    /// and yield `None`.
    pub fn from_item(item: PlaylistItem) -> Option<Self> {
        let snippet = item.snippet.unwrap_or_default();
        let id = snippet.resource_id.video_id.filter(|id| !id.is_empty())?;
        Some(VideoRecord {
            id,
            title: snippet.title,
            published: snippet.published_at,
            thumbnail: select_thumbnail(&snippet.thumbnails),
            description: snippet.description,
            channel_id: snippet.channel_id,
            channel_title: snippet.channel_title,
            subtitle_url: None,
            extras: serde_json::Map::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest<'a> {
    pub playlist_id: &'a str,
    pub page_size: u32,
    pub page_token: Option<&'a str>,
}

/// Source of listing pages. A non-success status, a transport failure, and
/// an undecodable body are all reported as `Err`.
pub trait ListingTransport {
    fn fetch_page(&self, request: &PageRequest<'_>) -> Result<ListingPage>;
}

/// Blocking HTTP client for the real endpoint.
pub struct HttpListing {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl HttpListing {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

impl ListingTransport for HttpListing {
    fn fetch_page(&self, request: &PageRequest<'_>) -> Result<ListingPage> {
        let mut call = self
            .agent
            .get(&self.base_url)
            .query("part", "snippet")
            .query("playlistId", request.playlist_id)
            .query("maxResults", &request.page_size.to_string())
            .query("key", &self.api_key);
        if let Some(token) = request.page_token {
            call = call.query("pageToken", token);
        }

        match call.call() {
            Ok(response) => response
                .into_json::<ListingPage>()
                .context("decoding listing response"),
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(anyhow!("listing API returned status {code}: {}", body.trim()))
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(anyhow::Error::new(transport).context("requesting listing page"))
            }
        }
    }
}

/// Walks the playlist page by page until there is no continuation token or
/// `fetch_limit` items have been seen. A failed page ends the walk but keeps
/// whatever earlier pages produced.
pub fn fetch_playlist_videos<T>(
    transport: &T,
    playlist_id: &str,
    page_size: u32,
    fetch_limit: usize,
) -> Vec<VideoRecord>
where
    T: ListingTransport + ?Sized,
{
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let mut videos = Vec::new();
    let mut page_token: Option<String> = None;
    let mut total_fetched = 0usize;

    while total_fetched < fetch_limit {
        let request = PageRequest {
            playlist_id,
            page_size,
            page_token: page_token.as_deref(),
        };
        let page = match transport.fetch_page(&request) {
            Ok(page) => page,
            Err(err) => {
                warn!(playlist_id, error = %format!("{err:#}"), "error fetching playlist page");
                break;
            }
        };

        let item_count = page.items.len();
        total_fetched += item_count;
        for item in page.items {
            match VideoRecord::from_item(item) {
                Some(video) => videos.push(video),
                None => debug!(playlist_id, "skipping playlist item without a video id"),
            }
        }

        // An empty page that still carries a token would never advance.
        match page.next_page_token.filter(|token| !token.is_empty()) {
            Some(token) if item_count > 0 => page_token = Some(token),
            _ => break,
        }
    }

    videos
}
