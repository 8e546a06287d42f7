//! Monitor error types.

use thiserror::Error;

/// Errors that can occur while checking releases, servers, or certificates.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("connection to {host} failed: {message}")]
    Connect { host: String, message: String },

    #[error("TLS handshake with {host} failed: {message}")]
    Tls { host: String, message: String },

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("invalid response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("certificate from {host} unusable: {message}")]
    Certificate { host: String, message: String },

    #[error("release feed is empty")]
    EmptyFeed,

    #[error("server disappeared from the registry: {0}")]
    ServerVanished(String),

    #[error("worker for {domain} failed: {message}")]
    Worker { domain: String, message: String },

    #[error("state store error: {0}")]
    State(#[from] tootwatch_state::StateError),
}

impl MonitorError {
    /// Whether no further useful work is possible (the registry itself is
    /// failing). Everything else is scoped to one unit of work and retried
    /// on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MonitorError::State(_))
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;
