use crate::models::chat::{ Message, Participant };
use crate::store::messages::MessageLog;
use serde::{ Serialize, Deserialize };
use uuid::Uuid;

const PLACEHOLDER_PREFIX: &str = "new-";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participant_id: String,
    pub participant_name: String,
    pub participant_image: Option<String>,
    pub last_message: Option<String>,
    pub last_message_time: Option<String>,
    pub unread_count: u32,
    pub messages: MessageLog,
}

impl Conversation {
    pub fn new(id: &str, participant: &Participant) -> Self {
        Self {
            id: id.to_string(),
            participant_id: participant.id.clone(),
            participant_name: participant.name.clone(),
            participant_image: participant.image.clone(),
            last_message: None,
            last_message_time: None,
            unread_count: 0,
            messages: MessageLog::new(),
        }
    }

    /// Client-side conversation for a contact that has no server chat yet.
    pub fn placeholder(participant: &Participant) -> Self {
        Self::new(&format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4()), participant)
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with(PLACEHOLDER_PREFIX)
    }

    pub fn participant(&self) -> Participant {
        Participant {
            id: self.participant_id.clone(),
            name: self.participant_name.clone(),
            image: self.participant_image.clone(),
        }
    }

    /// Appends by id and refreshes the tail cache. Returns false on a duplicate.
    pub fn append(&mut self, message: Message) -> bool {
        let content = message.content.clone();
        let timestamp = message.timestamp.clone();
        if !self.messages.push(message) {
            return false;
        }
        self.last_message = Some(content);
        self.last_message_time = Some(timestamp);
        true
    }

    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }
}
