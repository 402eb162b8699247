// FormatSelector - declarative, deterministic choice of a direct media URL
//
// A policy is an ordered list of tiers; each tier is a conjunction of
// predicates over a FormatDescriptor. Policies round-trip through yt-dlp
// selector syntax so the same expression can be handed to the extractor
// for server-side filtering:
//
//   best[ext=mp4][height<=360]/best[height<=360]/best
//
// Upstream ordering is never trusted: tiers decide, list position only
// breaks ties.

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use super::errors::ProxyError;
use super::models::{FormatDescriptor, VideoMetadata};

lazy_static::lazy_static! {
    static ref TIER_RE: Regex = Regex::new(r"^(best|b|worst|w)((?:\[[^\]]+\])*)$").unwrap();
    static ref FILTER_RE: Regex = Regex::new(r"\[([a-z]+)(<=|>=|=)([A-Za-z0-9]+)\]").unwrap();
}

/// Default policy for metadata lookups (/video, /play)
pub const DEFAULT_VIDEO_FORMAT: &str = "best[height<=480]/best";

/// Default policy for proxied streams; smaller and mp4-first for old players
pub const DEFAULT_STREAM_FORMAT: &str = "best[ext=mp4][height<=360]/best[height<=360]/best";

/// Single condition on a format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatPredicate {
    Ext(String),
    MaxHeight(u32),
    MinHeight(u32),
}

impl FormatPredicate {
    pub fn matches(&self, format: &FormatDescriptor) -> bool {
        match self {
            Self::Ext(ext) => format.ext.eq_ignore_ascii_case(ext),
            Self::MaxHeight(max) => format.height.map_or(false, |h| h <= *max),
            Self::MinHeight(min) => format.height.map_or(false, |h| h >= *min),
        }
    }
}

impl fmt::Display for FormatPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ext(ext) => write!(f, "[ext={}]", ext),
            Self::MaxHeight(h) => write!(f, "[height<={}]", h),
            Self::MinHeight(h) => write!(f, "[height>={}]", h),
        }
    }
}

/// Conjunction of predicates; an empty tier matches anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatTier {
    pub predicates: Vec<FormatPredicate>,
}

impl FormatTier {
    pub fn new(predicates: Vec<FormatPredicate>) -> Self {
        Self { predicates }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn matches(&self, format: &FormatDescriptor) -> bool {
        self.predicates.iter().all(|p| p.matches(format))
    }
}

impl fmt::Display for FormatTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("best")?;
        for p in &self.predicates {
            write!(f, "{}", p)?;
        }
        Ok(())
    }
}

/// Ordered preference policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPolicy {
    pub tiers: Vec<FormatTier>,
}

impl FormatPolicy {
    pub fn new(tiers: Vec<FormatTier>) -> Self {
        Self { tiers }
    }

    pub fn default_video() -> Self {
        DEFAULT_VIDEO_FORMAT
            .parse()
            .unwrap_or_else(|_| Self::new(vec![FormatTier::any()]))
    }

    pub fn default_stream() -> Self {
        DEFAULT_STREAM_FORMAT
            .parse()
            .unwrap_or_else(|_| Self::new(vec![FormatTier::any()]))
    }

    /// True when some tier accepts any format
    pub fn has_catch_all(&self) -> bool {
        self.tiers.iter().any(|t| t.predicates.is_empty())
    }

    /// yt-dlp `-f` expression for this policy.
    ///
    /// Always ends in a catch-all tier so yt-dlp returns metadata even when
    /// no configured tier matches; the local fallback chain decides then.
    pub fn to_format_spec(&self) -> String {
        if self.has_catch_all() {
            self.to_string()
        } else {
            format!("{}/{}", self, FormatTier::any())
        }
    }
}

impl fmt::Display for FormatPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spec = self
            .tiers
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join("/");
        f.write_str(&spec)
    }
}

impl FromStr for FormatPolicy {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tiers = Vec::new();

        for raw in s.split('/') {
            let raw = raw.trim();
            let caps = TIER_RE.captures(raw).ok_or_else(|| {
                ProxyError::Config(format!("Unsupported format tier: {:?}", raw))
            })?;

            let filters = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let mut predicates = Vec::new();
            let mut consumed = 0;

            for fc in FILTER_RE.captures_iter(filters) {
                consumed += fc[0].len();
                let predicate = match (&fc[1], &fc[2]) {
                    ("ext", "=") => FormatPredicate::Ext(fc[3].to_lowercase()),
                    ("height", op) => {
                        let n: u32 = fc[3].parse().map_err(|_| {
                            ProxyError::Config(format!("Invalid height in {:?}", raw))
                        })?;
                        match op {
                            "<=" => FormatPredicate::MaxHeight(n),
                            ">=" => FormatPredicate::MinHeight(n),
                            _ => {
                                return Err(ProxyError::Config(format!(
                                    "Unsupported height comparison in {:?}",
                                    raw
                                )))
                            }
                        }
                    }
                    (field, _) => {
                        return Err(ProxyError::Config(format!(
                            "Unsupported format filter {:?} in {:?}",
                            field, raw
                        )))
                    }
                };
                predicates.push(predicate);
            }

            if consumed != filters.len() {
                return Err(ProxyError::Config(format!(
                    "Malformed format filter in {:?}",
                    raw
                )));
            }

            tiers.push(FormatTier::new(predicates));
        }

        if tiers.is_empty() {
            return Err(ProxyError::Config("Empty format policy".to_string()));
        }

        Ok(Self::new(tiers))
    }
}

/// Outcome of a selection
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub url: String,
    pub format_id: String,
    pub ext: String,
    pub segmented: bool,
}

impl Selection {
    fn from_format(format: &FormatDescriptor, url: &str) -> Self {
        Self {
            url: url.to_string(),
            format_id: format.format_id.clone(),
            ext: format.ext.clone(),
            segmented: format.is_segmented(),
        }
    }
}

/// Format selector
pub struct FormatSelector;

impl FormatSelector {
    /// Pick the best direct URL for `metadata` under `policy`
    pub fn select(metadata: &VideoMetadata, policy: &FormatPolicy) -> Result<Selection, ProxyError> {
        for tier in &policy.tiers {
            if let Some(url) = metadata.best.direct_url().filter(|_| tier.matches(&metadata.best)) {
                return Ok(Selection::from_format(&metadata.best, url));
            }

            let first = metadata
                .formats
                .iter()
                .filter(|f| tier.matches(f))
                .find_map(|f| f.direct_url().map(|url| (f, url)));

            if let Some((format, url)) = first {
                return Ok(Selection::from_format(format, url));
            }
        }

        Self::fallback(metadata)
    }

    /// No tier matched: top-level URL, then merged components, then the
    /// last format carrying a URL
    fn fallback(metadata: &VideoMetadata) -> Result<Selection, ProxyError> {
        let best = &metadata.best;

        if let Some(url) = best.direct_url() {
            return Ok(Selection::from_format(best, url));
        }

        let component = best
            .components
            .iter()
            .filter(|c| c.has_video())
            .chain(best.components.iter().filter(|c| !c.has_video()))
            .find_map(|c| c.direct_url().map(|url| (c, url)));

        if let Some((format, url)) = component {
            return Ok(Selection::from_format(format, url));
        }

        let last = metadata
            .formats
            .iter()
            .rev()
            .find_map(|f| f.direct_url().map(|url| (f, url)));

        match last {
            Some((format, url)) => Ok(Selection::from_format(format, url)),
            None => Err(ProxyError::VideoUnresolvable(format!(
                "no format of {:?} carries a direct URL",
                metadata.id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(id: &str, ext: &str, height: Option<u32>, url: Option<&str>) -> FormatDescriptor {
        FormatDescriptor {
            format_id: id.to_string(),
            ext: ext.to_string(),
            height,
            url: url.map(|u| u.to_string()),
            ..Default::default()
        }
    }

    fn metadata(formats: Vec<FormatDescriptor>, best: FormatDescriptor) -> VideoMetadata {
        VideoMetadata {
            id: "abc123".to_string(),
            title: "Test".to_string(),
            duration: Some(10.0),
            formats,
            best,
        }
    }

    #[test]
    fn test_documented_example() {
        let meta = metadata(
            vec![
                fmt("1", "mp4", Some(240), Some("u1")),
                fmt("2", "webm", Some(480), Some("u2")),
            ],
            FormatDescriptor::default(),
        );
        let policy = FormatPolicy::new(vec![FormatTier::new(vec![
            FormatPredicate::Ext("mp4".into()),
            FormatPredicate::MaxHeight(480),
        ])]);

        let selection = FormatSelector::select(&meta, &policy).unwrap();
        assert_eq!(selection.url, "u1");
    }

    #[test]
    fn test_top_level_preferred_within_tier() {
        let best = fmt("18", "mp4", Some(360), Some("top"));
        let meta = metadata(
            vec![fmt("17", "mp4", Some(144), Some("low")), best.clone()],
            best,
        );
        let policy: FormatPolicy = "best[height<=480]".parse().unwrap();
        assert_eq!(FormatSelector::select(&meta, &policy).unwrap().url, "top");
    }

    #[test]
    fn test_tiers_evaluated_in_order() {
        let meta = metadata(
            vec![
                fmt("a", "webm", Some(360), Some("webm360")),
                fmt("b", "mp4", Some(720), Some("mp4720")),
            ],
            FormatDescriptor::default(),
        );
        let policy: FormatPolicy = "best[ext=mp4][height<=360]/best[height<=360]/best".parse().unwrap();
        assert_eq!(FormatSelector::select(&meta, &policy).unwrap().url, "webm360");
    }

    #[test]
    fn test_urlless_matches_are_skipped() {
        let meta = metadata(
            vec![
                fmt("a", "mp4", Some(360), None),
                fmt("b", "mp4", Some(240), Some("")),
                fmt("c", "mp4", Some(144), Some("ok")),
            ],
            FormatDescriptor::default(),
        );
        let policy: FormatPolicy = "best[ext=mp4]".parse().unwrap();
        assert_eq!(FormatSelector::select(&meta, &policy).unwrap().url, "ok");
    }

    #[test]
    fn test_fallback_to_top_level_url() {
        let meta = metadata(
            vec![fmt("a", "webm", Some(1080), Some("big"))],
            fmt("22", "mp4", Some(720), Some("top")),
        );
        let policy: FormatPolicy = "best[height<=240]".parse().unwrap();
        assert_eq!(FormatSelector::select(&meta, &policy).unwrap().url, "top");
    }

    #[test]
    fn test_fallback_into_merged_components() {
        let mut audio = fmt("140", "m4a", None, Some("audio-url"));
        audio.vcodec = Some("none".into());
        let mut video = fmt("137", "mp4", Some(1080), Some("video-url"));
        video.vcodec = Some("avc1.640028".into());

        let mut best = fmt("137+140", "mp4", Some(1080), None);
        best.components = vec![audio, video];

        let meta = metadata(vec![], best);
        let policy: FormatPolicy = "best[height<=240]".parse().unwrap();
        assert_eq!(FormatSelector::select(&meta, &policy).unwrap().url, "video-url");
    }

    #[test]
    fn test_fallback_to_last_url_in_list() {
        let meta = metadata(
            vec![
                fmt("a", "webm", Some(1080), Some("first")),
                fmt("b", "webm", Some(1440), Some("last")),
                fmt("c", "webm", Some(2160), None),
            ],
            FormatDescriptor::default(),
        );
        let policy: FormatPolicy = "best[ext=mp4]".parse().unwrap();
        assert_eq!(FormatSelector::select(&meta, &policy).unwrap().url, "last");
    }

    #[test]
    fn test_no_url_anywhere_is_unresolvable() {
        let meta = metadata(
            vec![fmt("a", "mp4", Some(360), None), fmt("b", "webm", None, Some(""))],
            fmt("a+b", "mp4", Some(360), None),
        );
        let policy = FormatPolicy::default_video();
        let err = FormatSelector::select(&meta, &policy).unwrap_err();
        assert!(matches!(err, ProxyError::VideoUnresolvable(_)));
    }

    #[test]
    fn test_selection_is_idempotent() {
        let meta = metadata(
            vec![
                fmt("a", "mp4", Some(360), Some("x")),
                fmt("b", "mp4", Some(360), Some("y")),
            ],
            FormatDescriptor::default(),
        );
        let policy = FormatPolicy::default_stream();
        let first = FormatSelector::select(&meta, &policy).unwrap();
        for _ in 0..10 {
            assert_eq!(FormatSelector::select(&meta, &policy).unwrap(), first);
        }
    }

    #[test]
    fn test_height_predicates_need_a_height() {
        let audio = fmt("140", "m4a", None, Some("a"));
        assert!(!FormatPredicate::MaxHeight(480).matches(&audio));
        assert!(!FormatPredicate::MinHeight(1).matches(&audio));
        assert!(FormatTier::any().matches(&audio));
    }

    #[test]
    fn test_policy_round_trip() {
        let policy: FormatPolicy = DEFAULT_STREAM_FORMAT.parse().unwrap();
        assert_eq!(policy.tiers.len(), 3);
        assert_eq!(
            policy.tiers[0].predicates,
            vec![FormatPredicate::Ext("mp4".into()), FormatPredicate::MaxHeight(360)]
        );
        assert_eq!(policy.to_format_spec(), DEFAULT_STREAM_FORMAT);
    }

    #[test]
    fn test_policy_aliases() {
        let policy: FormatPolicy = "b/worst".parse().unwrap();
        assert_eq!(policy.tiers, vec![FormatTier::any(), FormatTier::any()]);
        assert_eq!(policy.to_format_spec(), "best/best");
    }

    #[test]
    fn test_upstream_expression_gets_catch_all() {
        let policy: FormatPolicy = "best[ext=mp4]".parse().unwrap();
        assert!(!policy.has_catch_all());
        assert_eq!(policy.to_string(), "best[ext=mp4]");
        assert_eq!(policy.to_format_spec(), "best[ext=mp4]/best");

        // a webm-only answer to that expression still resolves locally
        let meta = metadata(
            vec![fmt("43", "webm", Some(360), Some("webm-url"))],
            fmt("43", "webm", Some(360), Some("webm-url")),
        );
        assert_eq!(FormatSelector::select(&meta, &policy).unwrap().url, "webm-url");
    }

    #[test]
    fn test_catch_all_not_duplicated() {
        let policy = FormatPolicy::default_video();
        assert!(policy.has_catch_all());
        assert_eq!(policy.to_format_spec(), DEFAULT_VIDEO_FORMAT);
    }

    #[test]
    fn test_policy_rejects_unknown_filters() {
        assert!("best[fps>=60]".parse::<FormatPolicy>().is_err());
        assert!("bv*+ba".parse::<FormatPolicy>().is_err());
        assert!("best[height<=abc]".parse::<FormatPolicy>().is_err());
        assert!("best[height<=360]junk".parse::<FormatPolicy>().is_err());
    }
}
