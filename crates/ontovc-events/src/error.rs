/// Errors from event delivery.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The sink refused or failed to take the event.
    #[error("sink error: {0}")]
    Sink(String),

    /// The publish queue is full.
    #[error("event queue is full")]
    QueueFull,

    /// The publisher has been shut down.
    #[error("event publisher is closed")]
    Closed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type EventResult<T> = Result<T, EventError>;
