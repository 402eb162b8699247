// yt-dlp JSON -> domain models
//
// yt-dlp output is loosely typed: nearly every field is optional and the
// location of merged-format components moved between releases
// (`requested_formats` at top level vs. under `requested_downloads`).
// Everything is normalised here so nothing downstream checks field presence.

use serde::Deserialize;

use crate::proxy::errors::ProxyError;
use crate::proxy::models::{default_thumbnail, FormatDescriptor, SearchResult, VideoMetadata};

#[derive(Debug, Default, Deserialize)]
struct RawFormat {
    format_id: Option<String>,
    ext: Option<String>,
    height: Option<u32>,
    width: Option<u32>,
    resolution: Option<String>,
    url: Option<String>,
    protocol: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDownload {
    requested_formats: Option<Vec<RawFormat>>,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    formats: Option<Vec<RawFormat>>,
    requested_formats: Option<Vec<RawFormat>>,
    requested_downloads: Option<Vec<RawDownload>>,
    #[serde(flatten)]
    top: RawFormat,
}

#[derive(Debug, Deserialize)]
struct RawThumbnail {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    id: Option<String>,
    title: Option<String>,
    channel: Option<String>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    thumbnails: Option<Vec<RawThumbnail>>,
    duration: Option<f64>,
    entries: Option<Vec<Option<RawEntry>>>,
}

#[derive(Debug, Deserialize)]
struct RawPlaylist {
    entries: Option<Vec<Option<RawEntry>>>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

impl From<RawFormat> for FormatDescriptor {
    fn from(f: RawFormat) -> Self {
        Self {
            format_id: f.format_id.unwrap_or_default(),
            ext: f.ext.unwrap_or_default(),
            height: f.height,
            width: f.width,
            resolution: non_empty(f.resolution),
            url: non_empty(f.url),
            protocol: f.protocol,
            vcodec: f.vcodec,
            acodec: f.acodec,
            components: Vec::new(),
        }
    }
}

fn parse_json<'a, T: Deserialize<'a>>(stdout: &'a [u8]) -> Result<T, ProxyError> {
    serde_json::from_slice(stdout)
        .map_err(|e| ProxyError::upstream(format!("Invalid JSON from extractor: {}", e)))
}

/// Parse `--dump-json` output for one video
pub fn parse_video_metadata(stdout: &[u8]) -> Result<VideoMetadata, ProxyError> {
    let raw: RawInfo = parse_json(stdout)?;

    let components = raw
        .requested_formats
        .filter(|c| !c.is_empty())
        .or_else(|| {
            raw.requested_downloads
                .unwrap_or_default()
                .into_iter()
                .filter_map(|d| d.requested_formats)
                .find(|c| !c.is_empty())
        })
        .unwrap_or_default();

    let mut best = FormatDescriptor::from(raw.top);
    best.components = components.into_iter().map(FormatDescriptor::from).collect();

    let formats = raw
        .formats
        .unwrap_or_default()
        .into_iter()
        .map(FormatDescriptor::from)
        .collect();

    Ok(VideoMetadata {
        id: raw.id.unwrap_or_default(),
        title: non_empty(raw.title).unwrap_or_else(|| "Unknown".to_string()),
        duration: raw.duration,
        formats,
        best,
    })
}

fn flatten_entries(entries: Vec<Option<RawEntry>>, out: &mut Vec<SearchResult>) {
    for mut entry in entries.into_iter().flatten() {
        if let Some(nested) = entry.entries.take() {
            flatten_entries(nested, out);
            continue;
        }

        let id = match non_empty(entry.id) {
            Some(id) => id,
            None => continue,
        };

        let thumbnail = non_empty(entry.thumbnail)
            .or_else(|| {
                entry
                    .thumbnails
                    .unwrap_or_default()
                    .into_iter()
                    .rev()
                    .find_map(|t| non_empty(t.url))
            })
            .unwrap_or_else(|| default_thumbnail(&id));

        out.push(SearchResult {
            title: entry.title,
            channel: non_empty(entry.channel).or_else(|| non_empty(entry.uploader)),
            thumbnail,
            duration: entry.duration,
            id,
        });
    }
}

/// Parse `--dump-single-json --flat-playlist` search output.
/// Null and id-less entries (private/removed videos) are dropped.
pub fn parse_search_results(stdout: &[u8], limit: usize) -> Result<Vec<SearchResult>, ProxyError> {
    let raw: RawPlaylist = parse_json(stdout)?;

    let mut results = Vec::new();
    flatten_entries(raw.entries.unwrap_or_default(), &mut results);
    results.truncate(limit);

    Ok(results)
}
