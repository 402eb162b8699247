// Shared yt-dlp invocation used by both the CLI and Python extractors
//
// The two modes only differ in how yt-dlp is launched
// (`yt-dlp ...` vs. `python3 -m yt_dlp ...`); arguments, timeout handling
// and parsing are identical.

use super::parse::{parse_search_results, parse_video_metadata};
use super::traits::{ExtractorConfig, BROWSER_USER_AGENT, SEARCH_LIMIT};
use crate::proxy::errors::ProxyError;
use crate::proxy::format_selector::FormatPolicy;
use crate::proxy::models::{SearchResult, VideoIdentifier, VideoMetadata};
use crate::proxy::utils::run_output_with_timeout;

/// How to launch yt-dlp, plus the network settings every call shares
#[derive(Debug, Clone)]
pub struct YtDlpCommand {
    program: String,
    prefix_args: Vec<String>,
    proxy: Option<String>,
    timeout_seconds: u64,
}

impl YtDlpCommand {
    pub fn new(program: impl Into<String>, prefix_args: Vec<String>, config: &ExtractorConfig) -> Self {
        Self {
            program: program.into(),
            prefix_args,
            proxy: config.proxy.clone(),
            timeout_seconds: config.timeout_seconds,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        args.extend([
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.timeout_seconds.to_string(),
            "--user-agent".to_string(),
            BROWSER_USER_AGENT.to_string(),
        ]);

        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args
    }

    /// Arguments for a single-video lookup
    pub fn resolve_args(&self, id: &VideoIdentifier, policy: &FormatPolicy) -> Vec<String> {
        let mut args = self.common_args();
        args.extend([
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "-f".to_string(),
            policy.to_format_spec(),
            // everything after "--" is positional
            "--".to_string(),
            id.watch_url(),
        ]);
        args
    }

    /// Arguments for a bounded catalog search
    pub fn search_args(&self, query: &str, limit: usize) -> Vec<String> {
        let mut args = self.common_args();
        args.extend([
            "--dump-single-json".to_string(),
            "--flat-playlist".to_string(),
            "--".to_string(),
            format!("ytsearch{}:{}", clamp_limit(limit), query),
        ]);
        args
    }

    async fn run(&self, args: Vec<String>, tag: &str) -> Result<Vec<u8>, ProxyError> {
        tracing::debug!("[{}] Running: {} {}", tag, self.program, args.join(" "));

        let output = run_output_with_timeout(&self.program, &args, self.timeout_seconds).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let err = ProxyError::from(stderr);
            if let Some(reason) = err.blocking_reason() {
                tracing::warn!("[{}] Lookup failed ({}): {}", tag, reason.description(), err);
            } else {
                tracing::warn!("[{}] Lookup failed: {}", tag, err);
            }
            return Err(err);
        }

        Ok(output.stdout)
    }

    pub async fn resolve(
        &self,
        id: &VideoIdentifier,
        policy: &FormatPolicy,
        tag: &str,
    ) -> Result<VideoMetadata, ProxyError> {
        let stdout = self.run(self.resolve_args(id, policy), tag).await?;
        parse_video_metadata(&stdout)
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        tag: &str,
    ) -> Result<Vec<SearchResult>, ProxyError> {
        let limit = clamp_limit(limit);
        let stdout = self.run(self.search_args(query, limit), tag).await?;
        parse_search_results(&stdout, limit)
    }
}

fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, SEARCH_LIMIT)
}
