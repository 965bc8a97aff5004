use anyhow::Context;
use std::net::SocketAddr;

/// Runtime configuration, read once from the environment at startup.
///
/// - `ESTAFETTE_DATABASE_URL` — SQLite URL of the job store. Empty or unset
///   means no store, and the whole subsystem runs in its disconnected no-op
///   mode instead of failing.
/// - `ESTAFETTE_QUEUE_DISABLED` — set to anything to force the disconnected
///   mode even when a store URL is present.
/// - `ESTAFETTE_HTTP_ADDR` — bind address of the administration API,
///   `127.0.0.1:8170` by default.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: Option<String>,
    pub queue_disabled: bool,
    pub http_addr: SocketAddr,
}

pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8170";

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("ESTAFETTE_DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let queue_disabled = std::env::var("ESTAFETTE_QUEUE_DISABLED").is_ok();
        let http_addr = std::env::var("ESTAFETTE_HTTP_ADDR")
            .unwrap_or_else(|_| DEFAULT_HTTP_ADDR.to_string())
            .parse()
            .context("ESTAFETTE_HTTP_ADDR is not a valid socket address")?;
        Ok(Self {
            database_url,
            queue_disabled,
            http_addr,
        })
    }

    /// The job store to connect to, or `None` for disconnected mode.
    pub fn store_url(&self) -> Option<&str> {
        if self.queue_disabled {
            return None;
        }
        self.database_url.as_deref()
    }
}
