//! Error types for notification bus operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Envelope serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Topic string does not follow the notify:<class>:<type>[:<id>] layout
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// The bus was shut down while a caller was still using it
    #[error("Bus closed")]
    Closed,
}
