use crate::models::chat::{ now_iso8601, Message, Participant };
use crate::store::conversation::Conversation;
use chrono::DateTime;
use serde::{ Serialize, Deserialize };
use serde_json::Value as JsonValue;

const UNKNOWN_PARTICIPANT: &str = "Unknown";

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WireUser {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
}

impl WireUser {
    pub fn to_participant(&self) -> Participant {
        Participant {
            id: self.id.clone(),
            name: self.full_name
                .clone()
                .or_else(|| self.name.clone())
                .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string()),
            image: self.profile_image.clone(),
        }
    }
}

/// A user field the backend sends either as a bare id or populated.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum UserRef {
    Id(String),
    User(WireUser),
}

impl UserRef {
    pub fn id(&self) -> &str {
        match self {
            UserRef::Id(id) => id,
            UserRef::User(user) => &user.id,
        }
    }

    pub fn to_participant(&self) -> Participant {
        match self {
            UserRef::Id(id) =>
                Participant {
                    id: id.clone(),
                    name: UNKNOWN_PARTICIPANT.to_string(),
                    image: None,
                },
            UserRef::User(user) => user.to_participant(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub sender_id: Option<UserRef>,
    #[serde(default)]
    pub sender: Option<UserRef>,
    #[serde(default)]
    pub receiver_id: Option<UserRef>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub read: Option<bool>,
}

impl WireMessage {
    pub fn sender(&self) -> Option<&str> {
        self.sender_id
            .as_ref()
            .or(self.sender.as_ref())
            .map(UserRef::id)
    }

    /// Maps into the local schema. A missing receiver is inferred from the two
    /// known parties of the conversation.
    pub fn into_message(self, local_user_id: &str, participant_id: &str) -> Message {
        let sender_id = self.sender().unwrap_or_default().to_string();
        let receiver_id = match &self.receiver_id {
            Some(receiver) => receiver.id().to_string(),
            None if sender_id == local_user_id => participant_id.to_string(),
            None => local_user_id.to_string(),
        };
        Message {
            id: self.id,
            sender_id,
            receiver_id,
            content: self.content,
            timestamp: self.timestamp.or(self.created_at).unwrap_or_else(now_iso8601),
            read: self.read.unwrap_or(false),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct LastMessagePreview {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// `lastMessage` arrives as preview text, as a timestamp, or as a message object.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum LastMessage {
    Text(String),
    Preview(LastMessagePreview),
}

/// One chat as returned by `GET /api/chat` (list entry) or by the single-chat
/// endpoints (chat document).
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServerChat {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub other_participant: Option<UserRef>,
    #[serde(default)]
    pub participants: Vec<UserRef>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub unread_count: Option<u32>,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ServerChat {
    /// `otherParticipant` when given, else the first participant that is not the local user.
    pub fn counterpart(&self, local_user_id: &str) -> Participant {
        if let Some(other) = &self.other_participant {
            return other.to_participant();
        }
        self.participants
            .iter()
            .find(|p| p.id() != local_user_id)
            .or(self.participants.first())
            .map(UserRef::to_participant)
            .unwrap_or_else(|| Participant {
                id: String::new(),
                name: UNKNOWN_PARTICIPANT.to_string(),
                image: None,
            })
    }

    pub fn into_conversation(self, local_user_id: &str) -> Conversation {
        let participant = self.counterpart(local_user_id);
        let mut conversation = Conversation::new(&self.id, &participant);
        for message in self.messages {
            conversation.append(message.into_message(local_user_id, &participant.id));
        }

        match self.last_message {
            Some(LastMessage::Text(text)) if DateTime::parse_from_rfc3339(&text).is_ok() => {
                conversation.last_message_time = Some(text);
            }
            Some(LastMessage::Text(text)) => {
                conversation.last_message = Some(text);
            }
            Some(LastMessage::Preview(preview)) => {
                if let Some(content) = preview.content {
                    conversation.last_message = Some(content);
                }
                if let Some(time) = preview.timestamp.or(preview.created_at) {
                    conversation.last_message_time = Some(time);
                }
            }
            None => {}
        }
        if conversation.last_message_time.is_none() {
            conversation.last_message_time = self.created_at;
        }
        conversation.unread_count = self.unread_count.unwrap_or(0);
        conversation
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChatListResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<ChatListData>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ChatListData {
    #[serde(default)]
    pub chats: Vec<ServerChat>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ChatDocumentResponse {
    Wrapped {
        data: ServerChat,
    },
    Bare(ServerChat),
}

impl ChatDocumentResponse {
    pub fn into_chat(self) -> ServerChat {
        match self {
            ChatDocumentResponse::Wrapped { data } => data,
            ChatDocumentResponse::Bare(chat) => chat,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest<'a> {
    pub chat_id: &'a str,
    pub content: &'a str,
}

/// `message` is the stored message on success and an error text otherwise.
#[derive(Deserialize, Debug, Clone)]
pub struct SendMessageResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<JsonValue>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest<'a> {
    pub mechanic_id: &'a str,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReadResponse {
    #[serde(default)]
    pub unread_count: Option<u32>,
}
