//! Connection to the taskboard server.
//!
//! [`ChannelClient`] carries both authoritative requests and live update
//! events over one WebSocket, implementing
//! [`PersistenceGateway`](crate::gateway::PersistenceGateway) and
//! [`LiveFeed`](crate::gateway::LiveFeed).

pub mod channel;

pub use channel::ChannelClient;

/// Errors that can occur while establishing a connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server URL is malformed or not a WebSocket URL.
    #[error("invalid server url {url}: {reason}")]
    InvalidUrl {
        /// The URL as given.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The connection was closed before the handshake completed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Connecting or identifying took too long.
    #[error("transport operation timed out")]
    Timeout,

    /// Nothing is listening at the server address.
    #[error("server {0} is unreachable")]
    Unreachable(String),

    /// The server answered the handshake with an error.
    #[error("server rejected connection: {0}")]
    Rejected(String),

    /// An underlying I/O or protocol error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}
