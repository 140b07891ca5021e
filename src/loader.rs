use crate::api::ChatApi;
use crate::error::{ ChatError, Result };
use crate::models::chat::Participant;
use crate::reconcile::{ self, Origin };
use crate::store::conversation::Conversation;
use crate::store::ChatStore;
use log::{ debug, error, info, warn };
use std::sync::Arc;

/// Pulls REST snapshots into the store.
///
/// Every completion is applied through `ChatStore::mutate_if_current`, so a
/// response that lands after logout is dropped instead of resurrecting state.
#[derive(Clone)]
pub struct SnapshotLoader {
    api: Arc<dyn ChatApi>,
    store: ChatStore,
    local_user_id: String,
}

impl SnapshotLoader {
    pub fn new(api: Arc<dyn ChatApi>, store: ChatStore, local_user_id: &str) -> Self {
        Self {
            api,
            store,
            local_user_id: local_user_id.to_string(),
        }
    }

    /// Replaces the conversation collection with the server's list.
    /// On failure the current collection is kept and the error flag is set.
    pub async fn load_conversation_list(&self) -> Result<usize> {
        let generation = self.store.generation();
        self.store.mutate(|s| s.set_loading(true));

        let chats = match self.api.list_chats().await {
            Ok(chats) => chats,
            Err(e) => {
                error!("Failed to load conversations: {}", e);
                self.store.mutate_if_current(generation, |s| {
                    s.set_loading(false);
                    s.set_error(Some(format!("Failed to load conversations: {}", e)));
                });
                return Err(e);
            }
        };

        let snapshot: Vec<Conversation> = chats
            .into_iter()
            .map(|chat| chat.into_conversation(&self.local_user_id))
            .collect();
        let fetched = snapshot.len();

        let kept = self.store
            .mutate_if_current(generation, |s| {
                let kept = reconcile::merge_snapshot(s, snapshot);
                s.set_loading(false);
                s.set_error(None);
                kept
            })
            .ok_or(ChatError::Cancelled)?;

        info!("Loaded {} conversations ({} fetched)", kept, fetched);
        Ok(kept)
    }

    /// Activates the conversation, fetching its history first when there is no local copy.
    pub async fn load_conversation(&self, id: &str) -> Result<Conversation> {
        if self.store.set_active(Some(id)) {
            debug!("Conversation {} already loaded", id);
            return self.store.conversation(id).ok_or_else(|| ChatError::ConversationNotFound(id.to_string()));
        }

        let generation = self.store.generation();
        let chat = match self.api.chat_messages(id).await {
            Ok(chat) => chat,
            Err(e) => {
                warn!("Failed to fetch conversation {}: {}", id, e);
                self.store.mutate_if_current(generation, |s| {
                    s.set_error(Some(format!("Conversation not found: {}", id)));
                });
                return Err(ChatError::ConversationNotFound(id.to_string()));
            }
        };

        let fetched = chat.into_conversation(&self.local_user_id);
        let conversation_id = fetched.id.clone();
        self.store
            .mutate_if_current(generation, |s| {
                if s.conversation(&conversation_id).is_some() {
                    // arrived meanwhile through another path: merge by id instead of replacing
                    for message in fetched.messages.iter() {
                        reconcile::admit(s, &conversation_id, message.clone(), Origin::Snapshot);
                    }
                    s.set_active(Some(&conversation_id));
                } else {
                    s.upsert_conversation(fetched);
                }
            })
            .ok_or(ChatError::Cancelled)?;

        info!("Loaded conversation {}", conversation_id);
        self.store
            .conversation(&conversation_id)
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.clone()))
    }

    /// Opens the conversation with `participant`, reusing an existing one.
    ///
    /// Otherwise a placeholder is shown immediately and rekeyed to the server id
    /// once `POST /api/chat` confirms it. A failed confirmation leaves the
    /// placeholder in place and sets the error flag.
    pub async fn open_with_participant(&self, participant: &Participant) -> Result<Conversation> {
        let existing = self.store.read(|s| {
            s.find_by_participant(&participant.id).map(|c| c.id.clone())
        });
        if let Some(id) = existing {
            self.store.set_active(Some(&id));
            return self.store.conversation(&id).ok_or(ChatError::ConversationNotFound(id));
        }

        let placeholder = Conversation::placeholder(participant);
        let placeholder_id = placeholder.id.clone();
        let generation = self.store.generation();
        self.store.upsert_conversation(placeholder);

        let chat = match self.api.create_chat(&participant.id).await {
            Ok(chat) => chat,
            Err(e) => {
                warn!("Failed to create chat with {}: {}", participant.id, e);
                self.store.mutate_if_current(generation, |s| {
                    s.set_error(Some(format!("Failed to start conversation: {}", e)));
                });
                return Err(e);
            }
        };

        let mut confirmed = chat.into_conversation(&self.local_user_id);
        if confirmed.participant_id.is_empty() || confirmed.participant_id == participant.id {
            confirmed.participant_id = participant.id.clone();
            confirmed.participant_name = participant.name.clone();
            confirmed.participant_image = participant.image.clone();
        }

        let rekeyed = self.store
            .mutate_if_current(generation, |s| s.rekey_conversation(&placeholder_id, confirmed.clone()))
            .ok_or(ChatError::Cancelled)?;
        if rekeyed {
            info!("Conversation {} confirmed as {}", placeholder_id, confirmed.id);
        } else {
            debug!("Placeholder {} was closed before confirmation", placeholder_id);
        }
        Ok(confirmed)
    }
}
