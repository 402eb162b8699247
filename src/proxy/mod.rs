// Proxy module - resolution and streaming pipeline
//
// extractor (yt-dlp) -> format selector -> relay (direct / filtered)

pub mod errors;
pub mod extractors;
pub mod format_selector;
pub mod models;
pub mod relay;
pub mod service;
pub mod utils;

pub use errors::ProxyError;
pub use extractors::{ExtractorConfig, ExtractorMode, InfoExtractor, InfoExtractorOrchestrator};
pub use format_selector::{FormatPolicy, FormatSelector, Selection};
pub use models::{FormatDescriptor, FormatSummary, SearchResult, VideoIdentifier, VideoMetadata, VideoResponse};
pub use relay::{FilterCommand, RelayConfig, RelayMode, ResolvedStream, StreamRelay, Transport};
pub use service::{RequestPhase, ResolutionService, TRENDING_QUERY};
