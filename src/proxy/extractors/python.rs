// Python InfoExtractor - uses `python3 -m yt_dlp`
//
// Useful where yt-dlp is installed through pip into a venv; the
// interpreter can be pinned with YTDLP_PYTHON.

use async_trait::async_trait;

use super::command::YtDlpCommand;
use super::traits::{ExtractorConfig, InfoExtractor};
use crate::proxy::errors::ProxyError;
use crate::proxy::format_selector::FormatPolicy;
use crate::proxy::models::{SearchResult, VideoIdentifier, VideoMetadata};
use crate::proxy::utils::probe_command;

/// Python-based info extractor using yt_dlp module
pub struct PythonInfoExtractor {
    command: YtDlpCommand,
}

impl PythonInfoExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        let python = config
            .python_cmd
            .clone()
            .unwrap_or_else(Self::find_python);

        Self {
            command: YtDlpCommand::new(python, vec!["-m".to_string(), "yt_dlp".to_string()], config),
        }
    }

    /// Find Python interpreter
    fn find_python() -> String {
        let candidates = ["python3", "/opt/homebrew/bin/python3", "/usr/local/bin/python3"];

        candidates
            .iter()
            .find(|cmd| probe_command(cmd, &["--version"]))
            .map(|cmd| cmd.to_string())
            .unwrap_or_else(|| "python3".to_string())
    }
}

#[async_trait]
impl InfoExtractor for PythonInfoExtractor {
    fn name(&self) -> &'static str {
        "python-yt-dlp"
    }

    /// Check if yt_dlp module is importable
    fn is_available(&self) -> bool {
        probe_command(self.command.program(), &["-c", "import yt_dlp"])
    }

    async fn resolve(
        &self,
        id: &VideoIdentifier,
        policy: &FormatPolicy,
    ) -> Result<VideoMetadata, ProxyError> {
        self.command.resolve(id, policy, "PythonExtractor").await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ProxyError> {
        self.command.search(query, limit, "PythonExtractor").await
    }
}
