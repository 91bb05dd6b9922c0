//! Connection to the patch server.

use async_trait::async_trait;
use patchsync_proto::{ChangeRequest, ChangeResponse};

/// Sends change requests to the server.
///
/// Each call resolves to exactly one response or one delivery failure.
/// Reconnection and framing are the implementation's concern.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and wait for the server's response.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if the request could not be delivered.
    async fn send(&self, request: ChangeRequest) -> Result<ChangeResponse, SendError>;
}

/// Delivery failures reported by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// No connection to the server
    #[error("server unavailable: {0}")]
    Unavailable(String),
    /// The request was lost in transit
    #[error("delivery failed: {0}")]
    Delivery(String),
}
