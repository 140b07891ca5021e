use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },

    #[error("Request rejected by backend: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Conversation {0} has not been confirmed by the server yet")]
    Unconfirmed(String),

    #[error("Message content is empty")]
    EmptyMessage,

    #[error("Realtime channel is closed")]
    ChannelClosed,

    #[error("Completion discarded after teardown")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
