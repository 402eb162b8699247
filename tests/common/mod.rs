//! Shared harness for integration tests.
//!
//! Starts the real router on a random port with a scripted extractor in
//! place of yt-dlp.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;

use oldtube_proxy_lib::proxy::{
    FormatDescriptor, FormatPolicy, InfoExtractor, ProxyError, RelayConfig, ResolutionService,
    SearchResult, StreamRelay, VideoIdentifier, VideoMetadata,
};
use oldtube_proxy_lib::{create_router, AppContext, ProxyConfig};

/// Extractor answering from fixed fixtures
#[derive(Default)]
pub struct FakeExtractor {
    pub videos: HashMap<String, VideoMetadata>,
    pub search_results: usize,
}

impl FakeExtractor {
    pub fn with_video(mut self, metadata: VideoMetadata) -> Self {
        self.videos.insert(metadata.id.clone(), metadata);
        self
    }

    pub fn with_search_results(mut self, count: usize) -> Self {
        self.search_results = count;
        self
    }
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
        id: &VideoIdentifier,
        _policy: &FormatPolicy,
    ) -> Result<VideoMetadata, ProxyError> {
        self.videos.get(id.as_str()).cloned().ok_or_else(|| {
            ProxyError::from(format!("ERROR: [youtube] {}: Video unavailable", id))
        })
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ProxyError> {
        Ok((0..self.search_results.min(limit))
            .map(|i| SearchResult {
                id: format!("vid{:03}", i),
                title: Some(format!("{} result {}", query, i)),
                channel: Some("Channel".to_string()),
                thumbnail: format!("https://i.ytimg.com/vi/vid{:03}/mqdefault.jpg", i),
                duration: Some(60.0),
            })
            .collect())
    }
}

/// Progressive mp4 format served from `url`
pub fn progressive(format_id: &str, height: u32, url: &str) -> FormatDescriptor {
    FormatDescriptor {
        format_id: format_id.to_string(),
        ext: "mp4".to_string(),
        height: Some(height),
        url: Some(url.to_string()),
        protocol: Some("https".to_string()),
        ..Default::default()
    }
}

/// Video whose only playable format is at `url`
pub fn video(id: &str, url: &str) -> VideoMetadata {
    let format = progressive("18", 360, url);
    VideoMetadata {
        id: id.to_string(),
        title: format!("Video {}", id),
        duration: Some(212.0),
        formats: vec![format.clone()],
        best: format,
    }
}

/// Video that resolves but carries no direct URL anywhere
pub fn urlless_video(id: &str) -> VideoMetadata {
    let merged = FormatDescriptor {
        format_id: "137+140".to_string(),
        ext: "mp4".to_string(),
        height: Some(1080),
        ..Default::default()
    };
    VideoMetadata {
        id: id.to_string(),
        title: "Merged only".to_string(),
        duration: None,
        formats: vec![merged.clone()],
        best: merged,
    }
}

pub struct TestServer {
    pub ctx: AppContext,
    pub addr: SocketAddr,
}

impl TestServer {
    pub async fn start(config: ProxyConfig, extractor: FakeExtractor) -> Self {
        let ctx = AppContext::with_extractor(&config, Box::new(extractor))
            .expect("failed to build context");
        Self::serve(ctx).await
    }

    /// Start with an explicit relay (custom filter command)
    pub async fn start_with_relay(relay: RelayConfig, extractor: FakeExtractor) -> Self {
        let service = ResolutionService::new(
            Box::new(extractor),
            StreamRelay::new(relay).expect("failed to build relay"),
            FormatPolicy::default_video(),
            FormatPolicy::default_stream(),
        );
        Self::serve(AppContext::new(service)).await
    }

    async fn serve(ctx: AppContext) -> Self {
        let app = create_router(ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self { ctx, addr }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}
