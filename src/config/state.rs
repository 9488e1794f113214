// Application state module
// Holds the loaded configuration and the outbound HTTP client

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use super::types::Config;

/// Application state, shared read-only between connections
pub struct AppState {
    pub config: Config,
    /// Outbound client used by the proxy route
    pub client: Client,
    /// Base directory for static files
    pub static_dir: PathBuf,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_client(config)?;
        Ok(Self {
            config: config.clone(),
            client,
            static_dir: config
                .server
                .static_dir
                .as_ref()
                .map_or_else(default_static_dir, PathBuf::from),
        })
    }
}

/// The frontend ships next to the server binary
fn default_static_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Build the outbound client.
///
/// The timeout covers the whole fetch, from connect until the body is read.
/// Redirects are followed; retries are never attempted.
fn build_client(config: &Config) -> Result<Client, reqwest::Error> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(config.proxy.timeout_secs))
        .user_agent(config.proxy.user_agent.as_str())
        .build()
}
