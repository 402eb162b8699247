// InfoExtractor module - yt-dlp backed metadata and search
//
// Provides two modes:
// - Python mode: Uses `python3 -m yt_dlp`
// - CLI mode: Uses native `yt-dlp` binary
//
// The Orchestrator picks one at start-up (explicit mode, or the first
// available one in Auto).

mod cli;
mod command;
mod diagnostics;
mod orchestrator;
mod parse;
mod python;
mod traits;

pub use cli::CliInfoExtractor;
pub use diagnostics::{diagnose_error, BlockingReason};
pub use orchestrator::InfoExtractorOrchestrator;
pub use parse::{parse_search_results, parse_video_metadata};
pub use python::PythonInfoExtractor;
pub use traits::{ExtractorConfig, ExtractorMode, InfoExtractor, BROWSER_USER_AGENT, SEARCH_LIMIT};
