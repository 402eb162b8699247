// Request-scoped data models shared by the extractor, selector and relay

use std::fmt;

use serde::Serialize;

use super::errors::ProxyError;

const WATCH_URL_BASE: &str = "https://www.youtube.com/watch?v=";
const THUMBNAIL_CDN: &str = "https://i.ytimg.com/vi";

/// Opaque catalog identifier, validated so it is safe to embed in a URL
/// and can never be mistaken for a yt-dlp option
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoIdentifier(String);

impl VideoIdentifier {
    pub fn parse(raw: &str) -> Result<Self, ProxyError> {
        let valid = !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if !valid {
            return Err(ProxyError::upstream(format!(
                "Invalid video identifier: {:?}",
                raw
            )));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical catalog URL handed to the extraction backend
    pub fn watch_url(&self) -> String {
        format!("{}{}", WATCH_URL_BASE, self.0)
    }
}

impl fmt::Display for VideoIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Thumbnail derived from the id when the upstream gives none
pub fn default_thumbnail(id: &str) -> String {
    format!("{}/{}/mqdefault.jpg", THUMBNAIL_CDN, id)
}

/// One candidate encoding of a video
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatDescriptor {
    /// Format ID (e.g., "18", "137+140")
    pub format_id: String,
    /// Container extension (mp4, webm, m4a)
    pub ext: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
    /// Upstream resolution label (e.g., "640x360", "audio only")
    pub resolution: Option<String>,
    /// Direct media URL; None means the format needs further resolution
    pub url: Option<String>,
    /// Delivery protocol (https, m3u8_native, http_dash_segments, ...)
    pub protocol: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    /// Parts of a merged/adaptive format (video + audio delivered separately)
    pub components: Vec<FormatDescriptor>,
}

impl FormatDescriptor {
    pub fn has_url(&self) -> bool {
        self.url.as_deref().map_or(false, |u| !u.is_empty())
    }

    /// Non-empty direct URL, if any
    pub fn direct_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.is_empty())
    }

    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref().map_or(true, |v| v != "none")
    }

    /// Segmented/adaptive delivery that players cannot consume progressively
    pub fn is_segmented(&self) -> bool {
        let by_protocol = self.protocol.as_deref().map_or(false, |p| {
            p.starts_with("m3u8") || p == "http_dash_segments" || p.contains("dash")
        });
        let by_url = self
            .direct_url()
            .map_or(false, |u| u.split('?').next().unwrap_or(u).ends_with(".m3u8"));
        by_protocol || by_url
    }

    /// Resolution label for diagnostics
    pub fn resolution_label(&self) -> String {
        if let Some(res) = self.resolution.as_deref().filter(|r| !r.is_empty()) {
            return res.to_string();
        }
        match (self.width, self.height) {
            (Some(w), Some(h)) => format!("{}x{}", w, h),
            (None, Some(h)) => format!("{}p", h),
            _ if !self.has_video() => "audio only".to_string(),
            _ => "unknown".to_string(),
        }
    }
}

/// Metadata for one catalog item, as returned by the extraction backend
#[derive(Debug, Clone, Default)]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
    /// Duration in seconds, as reported upstream
    pub duration: Option<f64>,
    /// Upstream order; a hint only
    pub formats: Vec<FormatDescriptor>,
    /// The upstream's own best guess; may lack a URL when merged
    pub best: FormatDescriptor,
}

/// One entry of a catalog search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub title: Option<String>,
    pub channel: Option<String>,
    /// Always populated (explicit or derived from the id)
    pub thumbnail: String,
    pub duration: Option<f64>,
}

/// Diagnostic view of one format, as served by /formats
#[derive(Debug, Clone, Serialize)]
pub struct FormatSummary {
    pub id: String,
    pub ext: String,
    pub resolution: String,
    pub has_url: bool,
}

impl From<&FormatDescriptor> for FormatSummary {
    fn from(f: &FormatDescriptor) -> Self {
        Self {
            id: f.format_id.clone(),
            ext: f.ext.clone(),
            resolution: f.resolution_label(),
            has_url: f.has_url(),
        }
    }
}

/// Resolved URL plus the metadata the /video route reports
#[derive(Debug, Clone)]
pub struct VideoResponse {
    pub url: String,
    pub title: String,
    pub duration: Option<f64>,
}
