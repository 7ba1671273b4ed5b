//! Error types for the pub/sub crate.

/// Errors that can occur on the pub/sub bus.
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    /// The gossip layer failed.
    #[error("gossip error: {0}")]
    Gossip(String),

    /// Publishing or receiving on a channel that is not subscribed.
    #[error("not subscribed to channel: {0}")]
    NotSubscribed(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<postcard::Error> for PubSubError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
