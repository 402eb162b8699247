// CLI InfoExtractor - uses native `yt-dlp` binary
//
// Faster start-up than the Python module and no interpreter dependency;
// the default for server deployments.

use async_trait::async_trait;

use super::command::YtDlpCommand;
use super::traits::{ExtractorConfig, InfoExtractor};
use crate::proxy::errors::ProxyError;
use crate::proxy::format_selector::FormatPolicy;
use crate::proxy::models::{SearchResult, VideoIdentifier, VideoMetadata};
use crate::proxy::utils::{find_binary, probe_command};

/// CLI-based info extractor using yt-dlp binary
pub struct CliInfoExtractor {
    command: YtDlpCommand,
}

impl CliInfoExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        let path = config
            .ytdlp_path
            .clone()
            .or_else(|| find_binary("yt-dlp"))
            .unwrap_or_else(|| "yt-dlp".to_string());

        Self {
            command: YtDlpCommand::new(path, Vec::new(), config),
        }
    }
}

#[async_trait]
impl InfoExtractor for CliInfoExtractor {
    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }

    fn is_available(&self) -> bool {
        probe_command(self.command.program(), &["--version"])
    }

    async fn resolve(
        &self,
        id: &VideoIdentifier,
        policy: &FormatPolicy,
    ) -> Result<VideoMetadata, ProxyError> {
        self.command.resolve(id, policy, "CliExtractor").await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ProxyError> {
        self.command.search(query, limit, "CliExtractor").await
    }
}
