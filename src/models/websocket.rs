use crate::models::chat::Message;
use crate::models::wire::WireMessage;
use serde::{ Serialize, Deserialize };
use serde_json::Value as JsonValue;

pub const MESSAGE_RECEIVED: &str = "message received";

/// Every frame on the channel is `{"event": <name>, "data": <payload>}`.
#[derive(Deserialize, Debug)]
struct Frame {
    event: String,
    #[serde(default)]
    data: JsonValue,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "setup")] Setup {
        #[serde(rename = "userId")]
        user_id: String,
    },
    #[serde(rename = "join chat")] JoinChat {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IncomingChatMessage {
    pub chat_id: String,
    pub message: WireMessage,
}

impl IncomingChatMessage {
    pub fn sender_id(&self) -> &str {
        self.message.sender().unwrap_or_default()
    }

    pub fn to_message(&self, local_user_id: &str, participant_id: &str) -> Message {
        self.message.clone().into_message(local_user_id, participant_id)
    }
}

#[derive(Debug, Clone)]
pub enum ServerEvent {
    MessageReceived(IncomingChatMessage),
    Other(String),
}

impl ServerEvent {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let frame: Frame = serde_json::from_str(text)?;
        if frame.event == MESSAGE_RECEIVED {
            let incoming = serde_json::from_value(frame.data)?;
            return Ok(ServerEvent::MessageReceived(incoming));
        }
        Ok(ServerEvent::Other(frame.event))
    }
}
