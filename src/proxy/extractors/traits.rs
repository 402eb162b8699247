// InfoExtractor trait and common types

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::proxy::errors::ProxyError;
use crate::proxy::format_selector::FormatPolicy;
use crate::proxy::models::{SearchResult, VideoIdentifier, VideoMetadata};

/// Upper bound on search results per query
pub const SEARCH_LIMIT: usize = 20;

/// Browser-like user agent; some CDNs reject default client signatures
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Extraction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractorMode {
    /// Python module yt_dlp
    Python,
    /// CLI binary yt-dlp
    Cli,
    /// First available of CLI, then Python
    #[default]
    Auto,
}

impl fmt::Display for ExtractorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::Cli => write!(f, "cli"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for ExtractorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" => Ok(Self::Python),
            "cli" => Ok(Self::Cli),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown extractor mode: {}", other)),
        }
    }
}

/// Configuration for info extraction
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub mode: ExtractorMode,
    /// Explicit yt-dlp binary path (CLI mode)
    pub ytdlp_path: Option<String>,
    /// Python interpreter (Python mode)
    pub python_cmd: Option<String>,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// Hard limit on one extraction subprocess, in seconds
    pub timeout_seconds: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            mode: ExtractorMode::Auto,
            ytdlp_path: None,
            python_cmd: None,
            proxy: None,
            timeout_seconds: 30,
        }
    }
}

impl ExtractorConfig {
    pub fn with_mode(mut self, mode: ExtractorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_ytdlp_path(mut self, path: Option<String>) -> Self {
        self.ytdlp_path = path;
        self
    }

    pub fn with_python_cmd(mut self, cmd: Option<String>) -> Self {
        self.python_cmd = cmd;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// Black-box extraction capability
#[async_trait]
pub trait InfoExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Check if this extractor is available
    fn is_available(&self) -> bool;

    /// Look up one catalog item, asking the backend to pre-filter by `policy`
    async fn resolve(
        &self,
        id: &VideoIdentifier,
        policy: &FormatPolicy,
    ) -> Result<VideoMetadata, ProxyError>;

    /// Catalog search, at most `limit` (capped at SEARCH_LIMIT) results
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ProxyError>;
}
