// Resolution service - orchestrates extractor -> selector -> relay
//
// Every call is request-scoped: nothing here outlives the request that
// created it, and all upstream calls are single-attempt.

use std::fmt;

use super::errors::ProxyError;
use super::extractors::{InfoExtractor, SEARCH_LIMIT};
use super::format_selector::{FormatPolicy, FormatSelector, Selection};
use super::models::{FormatSummary, SearchResult, VideoIdentifier, VideoMetadata, VideoResponse};
use super::relay::{ResolvedStream, StreamRelay};

/// Canned query standing in for a trending feed (none exists upstream)
pub const TRENDING_QUERY: &str = "music 2024";

/// Per-request lifecycle, logged as the request advances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Start,
    Resolving,
    Selecting,
    Streaming,
    Responding,
    Done,
    Error,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Resolving => "resolving",
            Self::Selecting => "selecting",
            Self::Streaming => "streaming",
            Self::Responding => "responding",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Tracks one request through its phases
struct RequestTrace<'a> {
    target: &'a str,
    phase: RequestPhase,
}

impl<'a> RequestTrace<'a> {
    fn start(target: &'a str) -> Self {
        tracing::debug!("[Service] {} -> {}", target, RequestPhase::Start);
        Self {
            target,
            phase: RequestPhase::Start,
        }
    }

    fn advance(&mut self, next: RequestPhase) {
        tracing::debug!("[Service] {}: {} -> {}", self.target, self.phase, next);
        self.phase = next;
    }

    /// Record the outcome; errors are reachable from every phase
    fn finish<T>(mut self, result: Result<T, ProxyError>) -> Result<T, ProxyError> {
        match &result {
            Ok(_) => self.advance(RequestPhase::Done),
            Err(e) => {
                tracing::warn!("[Service] {} failed while {}: {}", self.target, self.phase, e);
                self.advance(RequestPhase::Error);
            }
        }
        result
    }
}

pub struct ResolutionService {
    extractor: Box<dyn InfoExtractor>,
    relay: StreamRelay,
    video_policy: FormatPolicy,
    stream_policy: FormatPolicy,
}

impl ResolutionService {
    pub fn new(
        extractor: Box<dyn InfoExtractor>,
        relay: StreamRelay,
        video_policy: FormatPolicy,
        stream_policy: FormatPolicy,
    ) -> Self {
        Self {
            extractor,
            relay,
            video_policy,
            stream_policy,
        }
    }

    pub fn relay(&self) -> &StreamRelay {
        &self.relay
    }

    pub fn extractor_name(&self) -> &'static str {
        self.extractor.name()
    }

    async fn lookup(
        &self,
        trace: &mut RequestTrace<'_>,
        raw_id: &str,
        policy: &FormatPolicy,
    ) -> Result<VideoMetadata, ProxyError> {
        let id = VideoIdentifier::parse(raw_id)?;
        trace.advance(RequestPhase::Resolving);
        self.extractor.resolve(&id, policy).await
    }

    async fn resolve_selection(
        &self,
        trace: &mut RequestTrace<'_>,
        raw_id: &str,
        policy: &FormatPolicy,
    ) -> Result<(VideoMetadata, Selection), ProxyError> {
        let metadata = self.lookup(trace, raw_id, policy).await?;
        trace.advance(RequestPhase::Selecting);
        let selection = FormatSelector::select(&metadata, policy)?;
        Ok((metadata, selection))
    }

    /// Resolved URL plus title/duration; no media bytes move
    pub async fn video(&self, raw_id: &str) -> Result<VideoResponse, ProxyError> {
        let mut trace = RequestTrace::start(raw_id);
        let result = async {
            let (metadata, selection) = self
                .resolve_selection(&mut trace, raw_id, &self.video_policy)
                .await?;
            trace.advance(RequestPhase::Responding);
            Ok::<_, ProxyError>(VideoResponse {
                url: selection.url,
                title: metadata.title,
                duration: metadata.duration,
            })
        }
        .await;
        trace.finish(result)
    }

    /// Direct URL for the client to fetch itself
    pub async fn play(&self, raw_id: &str) -> Result<String, ProxyError> {
        let mut trace = RequestTrace::start(raw_id);
        let result = async {
            let (_, selection) = self
                .resolve_selection(&mut trace, raw_id, &self.video_policy)
                .await?;
            trace.advance(RequestPhase::Responding);
            Ok::<_, ProxyError>(selection.url)
        }
        .await;
        trace.finish(result)
    }

    /// Live byte stream of the stream-policy selection
    pub async fn stream(&self, raw_id: &str) -> Result<ResolvedStream, ProxyError> {
        let mut trace = RequestTrace::start(raw_id);
        let result = async {
            let (_, selection) = self
                .resolve_selection(&mut trace, raw_id, &self.stream_policy)
                .await?;
            trace.advance(RequestPhase::Streaming);
            self.relay.open_stream(&selection).await
        }
        .await;
        trace.finish(result)
    }

    /// Diagnostic listing of every format the upstream reported
    pub async fn formats(&self, raw_id: &str) -> Result<Vec<FormatSummary>, ProxyError> {
        let mut trace = RequestTrace::start(raw_id);
        let result = async {
            let metadata = self
                .lookup(&mut trace, raw_id, &self.video_policy)
                .await?;
            trace.advance(RequestPhase::Responding);
            Ok::<Vec<FormatSummary>, ProxyError>(
                metadata.formats.iter().map(FormatSummary::from).collect(),
            )
        }
        .await;
        trace.finish(result)
    }

    pub async fn search(&self, query: Option<&str>) -> Result<Vec<SearchResult>, ProxyError> {
        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or(ProxyError::NoQueryProvided)?;

        let trace = RequestTrace::start(query);
        let result = self.extractor.search(query, SEARCH_LIMIT).await;
        trace.finish(result.map(|mut videos| {
            videos.truncate(SEARCH_LIMIT);
            videos
        }))
    }

    pub async fn trending(&self) -> Result<Vec<SearchResult>, ProxyError> {
        self.search(Some(TRENDING_QUERY)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::FormatDescriptor;
    use crate::proxy::relay::{FilterCommand, RelayConfig, RelayMode, Transport};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeExtractor {
        metadata: Option<VideoMetadata>,
        results: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl InfoExtractor for FakeExtractor {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn resolve(
            &self,
            _id: &VideoIdentifier,
            _policy: &FormatPolicy,
        ) -> Result<VideoMetadata, ProxyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.metadata
                .clone()
                .ok_or_else(|| ProxyError::upstream("ERROR: [youtube] x: Video unavailable"))
        }

        async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ProxyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..self.results.min(limit))
                .map(|i| SearchResult {
                    id: format!("{}{}", query.len(), i),
                    title: Some(format!("{} #{}", query, i)),
                    channel: None,
                    thumbnail: String::new(),
                    duration: None,
                })
                .collect())
        }
    }

    fn progressive(id: &str, height: u32, url: &str) -> FormatDescriptor {
        FormatDescriptor {
            format_id: id.into(),
            ext: "mp4".into(),
            height: Some(height),
            url: Some(url.into()),
            protocol: Some("https".into()),
            ..Default::default()
        }
    }

    fn metadata() -> VideoMetadata {
        let f18 = progressive("18", 360, "https://cdn.example/18");
        VideoMetadata {
            id: "abc123".into(),
            title: "Test Video".into(),
            duration: Some(212.0),
            formats: vec![
                FormatDescriptor {
                    format_id: "137".into(),
                    ext: "mp4".into(),
                    height: Some(1080),
                    ..Default::default()
                },
                f18.clone(),
            ],
            best: f18,
        }
    }

    fn service_with(metadata: Option<VideoMetadata>, results: usize) -> (ResolutionService, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let extractor = FakeExtractor {
            metadata,
            results,
            calls: Arc::clone(&calls),
        };
        let relay_config = RelayConfig::default()
            .with_mode(RelayMode::Filtered)
            .with_filter(FilterCommand::new(
                "sh",
                vec!["-c".into(), "printf relayed".into()],
            ));
        let service = ResolutionService::new(
            Box::new(extractor),
            StreamRelay::new(relay_config).unwrap(),
            FormatPolicy::default_video(),
            FormatPolicy::default_stream(),
        );
        (service, calls)
    }

    #[tokio::test]
    async fn test_video_returns_selected_url_and_metadata() {
        let (service, _) = service_with(Some(metadata()), 0);
        let response = service.video("abc123").await.unwrap();
        assert_eq!(response.url, "https://cdn.example/18");
        assert_eq!(response.title, "Test Video");
        assert_eq!(response.duration, Some(212.0));
    }

    #[tokio::test]
    async fn test_play_returns_url() {
        let (service, _) = service_with(Some(metadata()), 0);
        assert_eq!(service.play("abc123").await.unwrap(), "https://cdn.example/18");
    }

    #[tokio::test]
    async fn test_invalid_identifier_never_reaches_extractor() {
        let (service, calls) = service_with(Some(metadata()), 0);
        for raw in ["--exec=rm", "abc&list=x", "../etc", ""] {
            let err = service.video(raw).await.unwrap_err();
            assert!(matches!(err, ProxyError::UpstreamUnavailable { .. }), "{:?}", raw);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_leading_dash_identifier_is_resolved() {
        let (service, calls) = service_with(Some(metadata()), 0);
        let response = service.video("-ZFbUjAWkIQ").await.unwrap();
        assert_eq!(response.url, "https://cdn.example/18");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_single_attempt() {
        let (service, calls) = service_with(None, 0);
        let err = service.play("abc123").await.unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamUnavailable { .. }));
        assert_eq!(err.http_status(), 500);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_usable_url_is_unresolvable() {
        let mut meta = metadata();
        meta.formats.iter_mut().for_each(|f| f.url = None);
        meta.best.url = None;
        let (service, _) = service_with(Some(meta), 0);
        let err = service.video("abc123").await.unwrap_err();
        assert!(matches!(err, ProxyError::VideoUnresolvable(_)));
    }

    #[tokio::test]
    async fn test_formats_lists_everything() {
        let (service, _) = service_with(Some(metadata()), 0);
        let formats = service.formats("abc123").await.unwrap();
        assert_eq!(formats.len(), 2);
        assert_eq!(formats[0].id, "137");
        assert!(!formats[0].has_url);
        assert_eq!(formats[0].resolution, "1080p");
        assert!(formats[1].has_url);
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected_without_lookup() {
        let (service, calls) = service_with(None, 5);
        for query in [None, Some(""), Some("   ")] {
            let err = service.search(query).await.unwrap_err();
            assert!(matches!(err, ProxyError::NoQueryProvided));
            assert_eq!(err.http_status(), 400);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_and_trending_are_bounded() {
        let (service, _) = service_with(None, 50);
        let found = service.search(Some("cats")).await.unwrap();
        assert_eq!(found.len(), SEARCH_LIMIT);

        let trending = service.trending().await.unwrap();
        assert_eq!(trending.len(), SEARCH_LIMIT);
        assert_eq!(trending[0].title.as_deref(), Some("music 2024 #0"));
    }

    #[tokio::test]
    async fn test_stream_relays_selection() {
        let (service, _) = service_with(Some(metadata()), 0);
        let resolved = service.stream("abc123").await.unwrap();
        assert_eq!(resolved.transport, Transport::Filtered);
        assert_eq!(resolved.content_type, "video/mp4");

        let mut body = resolved.into_body();
        let mut collected = Vec::new();
        while let Some(chunk) = body.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"relayed");
        assert_eq!(service.relay().active_transfers(), 0);
    }
}
