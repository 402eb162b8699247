// Error taxonomy for the resolution and streaming pipeline

use thiserror::Error;

use super::extractors::{diagnose_error, BlockingReason};

#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// Extraction backend or catalog fault (network, parse, unavailable video, ...)
    #[error("{message}")]
    UpstreamUnavailable {
        message: String,
        reason: Option<BlockingReason>,
    },

    /// The identifier resolved, but no format carries a playable URL
    #[error("No playable format found: {0}")]
    VideoUnresolvable(String),

    /// Client did not supply a required query parameter
    #[error("No query provided")]
    NoQueryProvided,

    /// Fault while opening or relaying the media byte stream
    #[error("Stream transport failure: {0}")]
    StreamTransportFailure(String),

    /// An upstream call exceeded its time budget
    #[error("Timed out after {seconds}s while {what}")]
    Timeout { what: &'static str, seconds: u64 },

    /// Invalid configuration value (policy expression, filter template, ...)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProxyError {
    /// Wrap an upstream message, attaching the diagnosed blocking reason
    pub fn upstream(message: impl Into<String>) -> Self {
        let message = message.into();
        let reason = diagnose_error(&message);
        Self::UpstreamUnavailable { message, reason }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::NoQueryProvided => 400,
            _ => 500,
        }
    }

    pub fn blocking_reason(&self) -> Option<BlockingReason> {
        match self {
            Self::UpstreamUnavailable { reason, .. } => *reason,
            Self::Timeout { .. } => Some(BlockingReason::NetworkTimeout),
            _ => None,
        }
    }
}

// Raw yt-dlp stderr comes through as a String; classify it into the taxonomy
impl From<String> for ProxyError {
    fn from(s: String) -> Self {
        let trimmed = s.trim();

        // yt-dlp prefixes fatal lines with "ERROR: "; keep only the last one
        let message = trimmed
            .lines()
            .rev()
            .find(|line| line.starts_with("ERROR:"))
            .map(|line| line.trim_start_matches("ERROR:").trim().to_string())
            .unwrap_or_else(|| trimmed.to_string());

        if message.is_empty() {
            return Self::upstream("Extraction backend failed without output");
        }

        if message.contains("Requested format is not available") {
            return Self::VideoUnresolvable(message);
        }

        Self::upstream(message)
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        Self::StreamTransportFailure(e.to_string())
    }
}
