//! YouTube channel and live-stream discovery.
//!
//! Everything here is page scraping. The heuristics are best effort: a page
//! layout change degrades to "no live stream found", never to a panic.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use reqwest::header::ACCEPT_LANGUAGE;
use tracing::{debug, info};

use crate::error::{ChatError, Result};

const YOUTUBE_BASE: &str = "https://www.youtube.com";

macro_rules! lazy_regex {
    ($name:ident, $pattern:expr) => {
        #[allow(clippy::expect_used)]
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($pattern).expect("valid youtube regex"));
    };
}

lazy_regex!(META_CHANNEL_ID, r#"<meta itemprop="channelId" content="(UC[^"]{22})">"#);
lazy_regex!(EXTERNAL_ID, r#""externalId":"(UC[^"]{22})""#);
lazy_regex!(CHANNEL_ID, r#""channelId":"(UC[^"]{22})""#);
lazy_regex!(BROWSE_ID, r#""browseId":"(UC[^"]{22})""#);
lazy_regex!(WATCH_URL_ID, r"[?&]v=([^&]{11})");
lazy_regex!(CANONICAL_ID, r#"canonical" href="https://www\.youtube\.com/watch\?v=([^"]+)""#);
lazy_regex!(VIDEO_ID, r#""videoId":"([^"]{11})""#);
lazy_regex!(TITLE_RUNS, r#""title":\{"runs":\[\{"text":"([^"]+)""#);
lazy_regex!(TITLE_PLAIN, r#""title":"([^"]+)""#);
lazy_regex!(TITLE_TAG, r"<title>([^<]+)</title>");
lazy_regex!(OWNER_CHANNEL_NAME, r#""ownerChannelName":"([^"]+)""#);
lazy_regex!(AUTHOR, r#""author":"([^"]+)""#);
lazy_regex!(CHANNEL_NAME, r#""channelName":"([^"]+)""#);

/// Markers that show up on a channel's `/live` page while it is broadcasting.
const LIVE_MARKERS: &[&str] = &[
    r#""isLiveNow":true"#,
    r#""isLive":true"#,
    r#"{"iconType":"LIVE"}"#,
    r#""style":"LIVE""#,
    "BADGE_STYLE_TYPE_LIVE_NOW",
    r#""text":"LIVE""#,
];

/// A broadcast currently running on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveStream {
    pub video_id: String,
    pub title: String,
    pub channel_name: String,
}

/// Whether the input already is a canonical channel id.
pub fn is_channel_id(input: &str) -> bool {
    input.starts_with("UC") && input.len() == 24
}

fn first_capture(regexes: &[&Regex], text: &str) -> Option<String> {
    regexes
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Find the channel id on a channel page.
pub fn extract_channel_id(html: &str) -> Option<String> {
    first_capture(&[&META_CHANNEL_ID, &EXTERNAL_ID, &CHANNEL_ID, &BROWSE_ID], html)
}

pub fn has_live_indicator(html: &str) -> bool {
    LIVE_MARKERS.iter().any(|marker| html.contains(marker))
}

/// Video id of the broadcast, preferring the URL we were redirected to.
pub fn extract_video_id(final_url: &str, html: &str) -> Option<String> {
    if final_url.contains("/watch?v=")
        && let Some(id) = first_capture(&[&WATCH_URL_ID], final_url)
    {
        return Some(id);
    }
    first_capture(&[&CANONICAL_ID, &VIDEO_ID], html)
}

/// Owner channel id as advertised by a watch page.
pub fn extract_owner_channel_id(html: &str) -> Option<String> {
    first_capture(&[&CHANNEL_ID], html)
}

pub fn extract_title(html: &str) -> String {
    first_capture(&[&TITLE_RUNS, &TITLE_PLAIN, &TITLE_TAG], html)
        .map(|raw| {
            raw.replace("\\\"", "\"")
                .replace("\\n", " ")
                .replace('\\', "")
                .replace(" - YouTube", "")
                .trim()
                .to_string()
        })
        .unwrap_or_else(|| "Unknown Stream".to_string())
}

pub fn extract_channel_name(html: &str) -> String {
    first_capture(&[&OWNER_CHANNEL_NAME, &AUTHOR, &CHANNEL_NAME], html)
        .unwrap_or_else(|| "Unknown Channel".to_string())
}

/// Resolves channel handles and finds their current broadcast.
#[derive(Debug, Clone)]
pub struct YouTubeDiscovery {
    client: Client,
    base_url: String,
}

impl YouTubeDiscovery {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: YOUTUBE_BASE.to_string(),
        }
    }

    /// Point discovery at another host (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_page(&self, url: &str) -> Result<(String, String)> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?;
        let final_url = response.url().to_string();
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::discovery(format!("{} returned {}", url, status)));
        }
        Ok((final_url, response.text().await?))
    }

    /// Resolve `@handle`, custom names or a `UC…` id to a channel id.
    pub async fn resolve_channel_id(&self, handle: &str) -> Result<String> {
        let handle = handle.trim();
        if is_channel_id(handle) {
            return Ok(handle.to_string());
        }

        let clean = handle.trim_start_matches('@');
        let candidates = [
            format!("{}/@{}", self.base_url, clean),
            format!("{}/c/{}", self.base_url, clean),
            format!("{}/{}", self.base_url, clean),
        ];

        for url in &candidates {
            match self.fetch_page(url).await {
                Ok((_, html)) => {
                    if let Some(id) = extract_channel_id(&html) {
                        info!(handle = clean, channel_id = %id, "Resolved YouTube channel");
                        return Ok(id);
                    }
                }
                Err(e) => debug!("Channel page {} unavailable: {}", url, e),
            }
        }

        Err(ChatError::discovery(format!(
            "could not find a channel id for @{}",
            clean
        )))
    }

    /// Current broadcast of `channel_id`, if any.
    ///
    /// Streams found on the page that belong to another channel (raids,
    /// featured videos) are ignored.
    pub async fn find_live_stream(&self, channel_id: &str) -> Result<Option<LiveStream>> {
        let live_url = format!("{}/channel/{}/live", self.base_url, channel_id);
        let (final_url, html) = self.fetch_page(&live_url).await?;

        let is_watch_page = final_url.contains("/watch?v=");
        if !has_live_indicator(&html) && !is_watch_page {
            return Ok(None);
        }

        let Some(video_id) = extract_video_id(&final_url, &html) else {
            return Ok(None);
        };

        let watch_url = format!("{}/watch?v={}", self.base_url, video_id);
        let (_, watch_html) = self.fetch_page(&watch_url).await?;

        let owner = extract_owner_channel_id(&watch_html);
        debug!(
            video_id = %video_id,
            owner = ?owner,
            expected = channel_id,
            "Verifying stream owner"
        );
        if owner.as_deref() != Some(channel_id) {
            info!(video_id = %video_id, "Live stream found but it belongs to another channel");
            return Ok(None);
        }

        Ok(Some(LiveStream {
            title: extract_title(&watch_html),
            channel_name: extract_channel_name(&watch_html),
            video_id,
        }))
    }
}
