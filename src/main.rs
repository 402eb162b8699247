use anyhow::Result;
use clap::Parser;

use oldtube_proxy_lib::{start_server, Cli, ProxyConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "oldtube_proxy_lib=debug,oldtube_proxy=debug,tower_http=debug".to_string()
        } else {
            "oldtube_proxy_lib=info,oldtube_proxy=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    let config = ProxyConfig::try_from(cli)?;

    tracing::info!("Starting OldTube proxy v{}", env!("CARGO_PKG_VERSION"));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(start_server(config))
}
