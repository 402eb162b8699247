// OldTube proxy - resolves catalog videos to playable URLs and relays
// media bytes for clients that cannot talk to the catalog directly

pub mod config;
pub mod proxy;
pub mod server;

pub use config::{Cli, ProxyConfig};
pub use server::{create_router, start_server, AppContext};
