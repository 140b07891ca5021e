use chrono::{ SecondsFormat, Utc };
use serde::{ Serialize, Deserialize };
use uuid::Uuid;

const LOCAL_ID_PREFIX: &str = "msg-";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    /// Free text. May carry a payment-link marker that only the UI interprets.
    pub content: String,
    /// ISO-8601, client- or server-assigned depending on origin.
    pub timestamp: String,
    pub read: bool,
}

impl Message {
    /// Builds a locally-originated message with a client-generated id.
    pub fn local(sender_id: &str, receiver_id: &str, content: &str) -> Self {
        Self {
            id: format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4()),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            timestamp: now_iso8601(),
            read: false,
        }
    }

    pub fn is_client_generated(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

/// Identity snapshot of the other party in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
}

pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
