// Runtime configuration - command line with environment fallbacks

use clap::Parser;

use crate::proxy::extractors::{ExtractorConfig, ExtractorMode};
use crate::proxy::format_selector::{FormatPolicy, DEFAULT_STREAM_FORMAT, DEFAULT_VIDEO_FORMAT};
use crate::proxy::relay::{FilterCommand, RelayConfig, RelayMode, DEFAULT_CHUNK_SIZE};
use crate::proxy::ProxyError;

#[derive(Parser, Debug)]
#[command(name = "oldtube-proxy")]
#[command(author, version, about = "Video resolution and streaming proxy for legacy clients")]
pub struct Cli {
    /// Host to bind to
    #[arg(long, env = "OLDTUBE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 10000)]
    pub port: u16,

    /// Extraction backend: python, cli or auto
    #[arg(long, default_value = "auto")]
    pub extractor_mode: ExtractorMode,

    /// Explicit yt-dlp binary
    #[arg(long, env = "YTDLP_PATH")]
    pub ytdlp_path: Option<String>,

    /// Python interpreter for python mode
    #[arg(long, env = "YTDLP_PYTHON")]
    pub python_cmd: Option<String>,

    /// HTTP or SOCKS5 proxy for extraction and relay
    #[arg(long, env = "OLDTUBE_PROXY")]
    pub proxy: Option<String>,

    /// Relay transport: direct, filtered or auto
    #[arg(long, default_value = "auto")]
    pub relay_mode: RelayMode,

    /// Remuxer used by the filtered relay
    #[arg(long, env = "OLDTUBE_FILTER", default_value = "ffmpeg")]
    pub filter_program: String,

    /// Format policy for /video and /play
    #[arg(long, default_value = DEFAULT_VIDEO_FORMAT)]
    pub video_format: String,

    /// Format policy for /stream
    #[arg(long, default_value = DEFAULT_STREAM_FORMAT)]
    pub stream_format: String,

    /// Seconds allowed for one metadata lookup
    #[arg(long, default_value_t = 30)]
    pub extract_timeout: u64,

    /// Seconds allowed for connecting and for each chunk read
    #[arg(long, default_value_t = 30)]
    pub read_timeout: u64,

    /// Relay chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Validated, immutable process configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub extractor_mode: ExtractorMode,
    pub ytdlp_path: Option<String>,
    pub python_cmd: Option<String>,
    pub proxy: Option<String>,
    pub relay_mode: RelayMode,
    pub filter_program: String,
    pub video_policy: FormatPolicy,
    pub stream_policy: FormatPolicy,
    pub extract_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub chunk_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10000,
            extractor_mode: ExtractorMode::Auto,
            ytdlp_path: None,
            python_cmd: None,
            proxy: None,
            relay_mode: RelayMode::Auto,
            filter_program: "ffmpeg".to_string(),
            video_policy: FormatPolicy::default_video(),
            stream_policy: FormatPolicy::default_stream(),
            extract_timeout_secs: 30,
            read_timeout_secs: 30,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TryFrom<Cli> for ProxyConfig {
    type Error = ProxyError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let proxy = cli.proxy.filter(|p| !p.trim().is_empty());

        Ok(Self {
            host: cli.host,
            port: cli.port,
            extractor_mode: cli.extractor_mode,
            ytdlp_path: cli.ytdlp_path.filter(|p| !p.trim().is_empty()),
            python_cmd: cli.python_cmd.filter(|p| !p.trim().is_empty()),
            proxy,
            relay_mode: cli.relay_mode,
            filter_program: cli.filter_program,
            video_policy: cli.video_format.parse()?,
            stream_policy: cli.stream_format.parse()?,
            extract_timeout_secs: cli.extract_timeout,
            read_timeout_secs: cli.read_timeout,
            chunk_size: cli.chunk_size,
        })
    }
}

impl ProxyConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_relay_mode(mut self, mode: RelayMode) -> Self {
        self.relay_mode = mode;
        self
    }

    pub fn with_filter_program(mut self, program: impl Into<String>) -> Self {
        self.filter_program = program.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_read_timeout(mut self, seconds: u64) -> Self {
        self.read_timeout_secs = seconds;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig::default()
            .with_mode(self.extractor_mode)
            .with_ytdlp_path(self.ytdlp_path.clone())
            .with_python_cmd(self.python_cmd.clone())
            .with_proxy(self.proxy.clone())
            .with_timeout(self.extract_timeout_secs)
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig::default()
            .with_mode(self.relay_mode)
            .with_filter(FilterCommand::ffmpeg(self.filter_program.clone()))
            .with_proxy(self.proxy.clone())
            .with_chunk_size(self.chunk_size)
            .with_read_timeout(self.read_timeout_secs)
    }
}
