// Stream relay - turns a selected format into a live byte stream
//
// Two transports, chosen by deployment policy rather than by sniffing
// payload bytes:
// - Direct:   HTTP GET against the CDN, body forwarded chunk by chunk
// - Filtered: external remuxer (ffmpeg) reads the URL and writes
//             fragmented MP4 to stdout, which becomes the body
//
// Nothing is retried: once bytes reach the client a failure can only
// truncate the stream. Dropping a ResolvedStream closes the upstream
// connection or kills the filter process.

use std::fmt;
use std::pin::Pin;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command as TokioCommand};
use tokio::time::timeout;
use tokio_util::io::ReaderStream;

use super::errors::ProxyError;
use super::extractors::BROWSER_USER_AGENT;
use super::format_selector::Selection;

pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const MIN_CHUNK_SIZE: usize = 8 * 1024;
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Placeholder in filter arguments replaced by the resolved URL
pub const INPUT_PLACEHOLDER: &str = "{input}";

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProxyError>> + Send>>;

/// Deployment policy for how bytes reach the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMode {
    Direct,
    Filtered,
    /// Filtered for segmented (HLS/DASH) selections, Direct otherwise
    #[default]
    Auto,
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Filtered => write!(f, "filtered"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for RelayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "filtered" => Ok(Self::Filtered),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown relay mode: {}", other)),
        }
    }
}

/// Transport actually used for one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Direct,
    Filtered,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Filtered => write!(f, "filtered"),
        }
    }
}

/// External remuxing filter invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl FilterCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// ffmpeg stream-copy into fragmented MP4 on stdout.
    /// A pipe cannot be seeked back to write `moov` at the front, so the
    /// output must be fragmented.
    pub fn ffmpeg(program: impl Into<String>) -> Self {
        let args = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-user_agent",
            BROWSER_USER_AGENT,
            "-i",
            INPUT_PLACEHOLDER,
            "-c",
            "copy",
            "-bsf:a",
            "aac_adtstoasc",
            "-movflags",
            "frag_keyframe+empty_moov+default_base_moof",
            "-f",
            "mp4",
            "pipe:1",
        ];
        Self::new(program, args.iter().map(|a| a.to_string()).collect())
    }

    /// Arguments with the input placeholder substituted
    pub fn args_for(&self, input: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace(INPUT_PLACEHOLDER, input))
            .collect()
    }
}

impl Default for FilterCommand {
    fn default() -> Self {
        Self::ffmpeg("ffmpeg")
    }
}

/// Relay settings
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub mode: RelayMode,
    pub filter: FilterCommand,
    pub proxy: Option<String>,
    pub chunk_size: usize,
    /// Budget for connecting and for every single chunk read
    pub read_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: RelayMode::Auto,
            filter: FilterCommand::default(),
            proxy: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout_secs: 30,
        }
    }
}

impl RelayConfig {
    pub fn with_mode(mut self, mode: RelayMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_filter(mut self, filter: FilterCommand) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
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
}

/// Live media stream for exactly one client response
pub struct ResolvedStream {
    pub content_type: String,
    pub content_length: Option<u64>,
    pub transport: Transport,
    body: ByteStream,
}

impl ResolvedStream {
    pub fn into_body(self) -> ByteStream {
        self.body
    }
}

impl fmt::Debug for ResolvedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedStream")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// Counts one live upstream transfer for as long as it exists
struct TransferGuard {
    active: Arc<AtomicUsize>,
}

impl TransferGuard {
    fn new(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self {
            active: Arc::clone(active),
        }
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Opens upstream byte sources
pub struct StreamRelay {
    client: reqwest::Client,
    config: RelayConfig,
    active: Arc<AtomicUsize>,
}

impl StreamRelay {
    pub fn new(mut config: RelayConfig) -> Result<Self, ProxyError> {
        config.chunk_size = config.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);

        let mut builder = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .connect_timeout(Duration::from_secs(config.read_timeout_secs));

        if let Some(proxy_url) = config.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| ProxyError::Config(format!("Invalid proxy {}: {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Upstream connections and filter processes currently alive
    pub fn active_transfers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.config.read_timeout_secs)
    }

    pub fn transport_for(&self, selection: &Selection) -> Transport {
        match self.config.mode {
            RelayMode::Direct => Transport::Direct,
            RelayMode::Filtered => Transport::Filtered,
            RelayMode::Auto if selection.segmented => Transport::Filtered,
            RelayMode::Auto => Transport::Direct,
        }
    }

    pub async fn open_stream(&self, selection: &Selection) -> Result<ResolvedStream, ProxyError> {
        let transport = self.transport_for(selection);
        tracing::debug!(
            "[Relay] Opening {} stream for format {} ({})",
            transport,
            selection.format_id,
            selection.ext
        );

        match transport {
            Transport::Direct => self.open_direct(&selection.url).await,
            Transport::Filtered => self.open_filtered(&selection.url),
        }
    }

    /// Open a plain HTTP(S) relay of `url`
    pub async fn open_direct(&self, url: &str) -> Result<ResolvedStream, ProxyError> {
        let guard = TransferGuard::new(&self.active);
        let read_timeout = self.read_timeout();

        let response = timeout(read_timeout, self.client.get(url).send())
            .await
            .map_err(|_| ProxyError::Timeout {
                what: "connecting to the media host",
                seconds: self.config.read_timeout_secs,
            })??;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::StreamTransportFailure(format!(
                "media host returned HTTP {}",
                status
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let content_length = response.content_length();

        let upstream = response.bytes_stream().map_err(ProxyError::from);
        let chunks = relay_chunks(
            upstream,
            self.config.chunk_size,
            read_timeout,
            self.config.read_timeout_secs,
        );

        let body: ByteStream = Box::pin(async_stream::stream! {
            let _guard = guard;
            futures::pin_mut!(chunks);
            while let Some(item) = chunks.next().await {
                yield item;
            }
        });

        Ok(ResolvedStream {
            content_type,
            content_length,
            transport: Transport::Direct,
            body,
        })
    }

    /// Spawn the filter on `input` and relay its stdout
    pub fn open_filtered(&self, input: &str) -> Result<ResolvedStream, ProxyError> {
        let guard = TransferGuard::new(&self.active);
        let filter = &self.config.filter;

        let mut child = TokioCommand::new(&filter.program)
            .args(filter.args_for(input))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProxyError::StreamTransportFailure(format!(
                    "Failed to start filter {}: {}",
                    filter.program, e
                ))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ProxyError::StreamTransportFailure("Failed to capture filter stdout".to_string())
        })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_filter_stderr(stderr, filter.program.clone()));
        }

        let read_timeout = self.read_timeout();
        let timeout_secs = self.config.read_timeout_secs;
        let upstream = ReaderStream::with_capacity(stdout, self.config.chunk_size).map_err(|e| {
            ProxyError::StreamTransportFailure(format!("Filter output read failed: {}", e))
        });
        let chunks = relay_chunks(upstream, self.config.chunk_size, read_timeout, timeout_secs);

        let body: ByteStream = Box::pin(async_stream::stream! {
            let _guard = guard;
            let mut child = child;
            let mut failed = false;

            futures::pin_mut!(chunks);
            while let Some(item) = chunks.next().await {
                failed = item.is_err();
                yield item;
                if failed {
                    break;
                }
            }

            // stdout hit EOF: a crashed filter must not look like a clean end
            if !failed {
                match timeout(read_timeout, child.wait()).await {
                    Ok(Ok(status)) if status.success() => {}
                    Ok(Ok(status)) => {
                        tracing::warn!("[Relay] Filter exited with {}", status);
                        yield Err(ProxyError::StreamTransportFailure(format!(
                            "filter exited with {}",
                            status
                        )));
                    }
                    Ok(Err(e)) => {
                        yield Err(ProxyError::StreamTransportFailure(format!(
                            "failed to reap filter: {}",
                            e
                        )));
                    }
                    Err(_) => {
                        yield Err(ProxyError::Timeout {
                            what: "waiting for the filter to exit",
                            seconds: timeout_secs,
                        });
                    }
                }
            }
        });

        Ok(ResolvedStream {
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            content_length: None,
            transport: Transport::Filtered,
            body,
        })
    }
}

/// Re-chunk `upstream` into `chunk_size` pieces, bounding every read by
/// `read_timeout`. The first error (or timeout) ends the stream after any
/// already-buffered bytes are flushed.
fn relay_chunks<S>(
    upstream: S,
    chunk_size: usize,
    read_timeout: Duration,
    timeout_secs: u64,
) -> impl Stream<Item = Result<Bytes, ProxyError>> + Send
where
    S: Stream<Item = Result<Bytes, ProxyError>> + Send + 'static,
{
    async_stream::stream! {
        futures::pin_mut!(upstream);
        let mut buf = BytesMut::with_capacity(chunk_size);

        loop {
            match timeout(read_timeout, upstream.next()).await {
                Ok(Some(Ok(bytes))) => {
                    buf.extend_from_slice(&bytes);
                    while buf.len() >= chunk_size {
                        yield Ok(buf.split_to(chunk_size).freeze());
                    }
                }
                Ok(Some(Err(e))) => {
                    if !buf.is_empty() {
                        yield Ok(buf.split().freeze());
                    }
                    tracing::warn!("[Relay] Upstream failed mid-stream: {}", e);
                    yield Err(e);
                    break;
                }
                Ok(None) => {
                    if !buf.is_empty() {
                        yield Ok(buf.split().freeze());
                    }
                    break;
                }
                Err(_) => {
                    if !buf.is_empty() {
                        yield Ok(buf.split().freeze());
                    }
                    tracing::warn!("[Relay] Upstream read stalled for {}s", timeout_secs);
                    yield Err(ProxyError::Timeout {
                        what: "reading from the media source",
                        seconds: timeout_secs,
                    });
                    break;
                }
            }
        }
    }
}

async fn log_filter_stderr(stderr: ChildStderr, program: String) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!("[Relay] {}: {}", program, line);
    }
}
