pub mod http;

use crate::error::Result;
use crate::models::wire::{ ServerChat, WireMessage };
use async_trait::async_trait;

pub use self::http::HttpChatApi;

/// What the backend confirmed for a sent message.
#[derive(Debug, Clone, Default)]
pub struct SendReceipt {
    /// The stored message, when the backend echoes it back.
    pub message: Option<WireMessage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadReceipt {
    pub unread_count: Option<u32>,
}

/// The chat REST backend. All calls are authenticated with the session's bearer token.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `GET /api/chat`
    async fn list_chats(&self) -> Result<Vec<ServerChat>>;

    /// `GET /api/chat/{id}/messages`
    async fn chat_messages(&self, chat_id: &str) -> Result<ServerChat>;

    /// `POST /api/chat/messages`
    async fn send_message(&self, chat_id: &str, content: &str) -> Result<SendReceipt>;

    /// `POST /api/chat/{id}/read`
    async fn mark_read(&self, chat_id: &str) -> Result<ReadReceipt>;

    /// `POST /api/chat`, creating the chat or returning the existing one.
    async fn create_chat(&self, mechanic_id: &str) -> Result<ServerChat>;
}
