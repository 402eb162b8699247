// InfoExtractor Orchestrator - mode selection
//
// Strategy:
// 1. Explicit mode (python / cli) is used as configured
// 2. Auto picks the first *available* backend: CLI, then Python
// 3. The choice is made once at start-up; a failed lookup is reported,
//    never retried on the other backend

use async_trait::async_trait;

use super::cli::CliInfoExtractor;
use super::python::PythonInfoExtractor;
use super::traits::{ExtractorConfig, ExtractorMode, InfoExtractor};
use crate::proxy::errors::ProxyError;
use crate::proxy::format_selector::FormatPolicy;
use crate::proxy::models::{SearchResult, VideoIdentifier, VideoMetadata};

/// Orchestrator that owns the selected extractor
pub struct InfoExtractorOrchestrator {
    active: Box<dyn InfoExtractor>,
    mode: ExtractorMode,
}

impl InfoExtractorOrchestrator {
    pub fn new(config: &ExtractorConfig) -> Self {
        let (active, mode): (Box<dyn InfoExtractor>, ExtractorMode) = match config.mode {
            ExtractorMode::Python => (Box::new(PythonInfoExtractor::new(config)), ExtractorMode::Python),
            ExtractorMode::Cli => (Box::new(CliInfoExtractor::new(config)), ExtractorMode::Cli),
            ExtractorMode::Auto => Self::pick_available(config),
        };

        if active.is_available() {
            tracing::info!("[Orchestrator] Using {} ({} mode)", active.name(), mode);
        } else {
            tracing::warn!(
                "[Orchestrator] {} is not available; lookups will fail until yt-dlp is installed",
                active.name()
            );
        }

        Self { active, mode }
    }

    /// Wrap an already-built extractor (tests, embedding)
    pub fn with_extractor(active: Box<dyn InfoExtractor>) -> Self {
        Self {
            active,
            mode: ExtractorMode::Auto,
        }
    }

    fn pick_available(config: &ExtractorConfig) -> (Box<dyn InfoExtractor>, ExtractorMode) {
        let cli = CliInfoExtractor::new(config);
        if cli.is_available() {
            return (Box::new(cli), ExtractorMode::Cli);
        }

        let python = PythonInfoExtractor::new(config);
        if python.is_available() {
            return (Box::new(python), ExtractorMode::Python);
        }

        (Box::new(cli), ExtractorMode::Cli)
    }

    pub fn mode(&self) -> ExtractorMode {
        self.mode
    }
}

#[async_trait]
impl InfoExtractor for InfoExtractorOrchestrator {
    fn name(&self) -> &'static str {
        self.active.name()
    }

    fn is_available(&self) -> bool {
        self.active.is_available()
    }

    async fn resolve(
        &self,
        id: &VideoIdentifier,
        policy: &FormatPolicy,
    ) -> Result<VideoMetadata, ProxyError> {
        self.active.resolve(id, policy).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ProxyError> {
        self.active.search(query, limit).await
    }
}
