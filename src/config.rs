//! Server configuration.
//!
//! Follows 12-factor style: [`ServerConfig::from_env`] reads environment
//! variables (or a `.env` file via `dotenvy`). Embedding applications can
//! also build a config directly with [`ServerConfig::new`].

use std::net::SocketAddr;

use serde_json::Value;

/// Application options shared read-only with every handler through
/// [`crate::domain::Context::options`].
pub type Options = serde_json::Map<String, Value>;

/// Address used when `LISTEN_ADDR` is not set.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:15801";

/// Top-level server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the listener binds to. Port `0` picks a free port.
    pub listen_addr: SocketAddr,

    /// Log every inbound message, reply and registration at `info` level.
    pub verbose: bool,

    /// Options passed to handlers.
    pub options: Options,
}

impl ServerConfig {
    /// Creates a config listening on `listen_addr` with no options.
    #[must_use]
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            verbose: false,
            options: Options::new(),
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// | Variable      | Default            |
    /// |---------------|--------------------|
    /// | `LISTEN_ADDR` | `127.0.0.1:15801`  |
    /// | `VERBOSE`     | `false`            |
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string())
            .parse()?;

        let verbose = parse_env_bool("VERBOSE", false);

        Ok(Self {
            listen_addr,
            verbose,
            options: Options::new(),
        })
    }

    /// Enables or disables verbose message logging.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Adds a handler-visible option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 15801)))
    }
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|v| v.to_ascii_lowercase())
        .as_deref()
    {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
