use thiserror::Error;

/// Errors that can occur when encoding, decoding or publishing events.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// The envelope's topic is not one this system understands.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// A payload could not be serialized or deserialized.
    #[error("Serialization error on topic {topic}: {source}")]
    Serialization {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    /// The transport rejected or dropped the event.
    #[error("Publish failed: {0}")]
    Publish(String),
}

impl EventBusError {
    /// Returns true if publishing again may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EventBusError::Publish(_))
    }
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, EventBusError>;
