pub mod conversation;
pub mod messages;

use crate::models::chat::Message;
use conversation::Conversation;
use log::debug;
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Notification emitted after every mutation, in mutation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    ConversationsReplaced {
        count: usize,
    },
    ConversationUpserted {
        conversation_id: String,
    },
    ConversationRekeyed {
        from: String,
        to: String,
    },
    MessageAppended {
        conversation_id: String,
        message_id: String,
    },
    UnreadChanged {
        conversation_id: String,
        unread_count: u32,
    },
    ActiveChanged {
        conversation_id: Option<String>,
    },
    /// The focused conversation received a message and its view should follow the tail.
    TailRequested {
        conversation_id: String,
    },
    LoadingChanged {
        is_loading: bool,
    },
    ErrorChanged {
        error: Option<String>,
    },
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    Appended,
    Duplicate,
    UnknownConversation,
}

/// Conversation state. Pure and synchronous; every method is one atomic transition.
///
/// `conversations` is the inbox collection, most-recent-first. The active
/// conversation is normally an entry of that collection, referenced by id, so
/// the collection entry and the active projection can never diverge. The one
/// exception is `detached`: an empty active conversation that a snapshot did
/// not contain. It stays reachable as the active conversation and rejoins the
/// collection as soon as it holds a message.
#[derive(Debug, Default)]
pub struct ChatState {
    conversations: Vec<Conversation>,
    detached: Option<Conversation>,
    active: Option<String>,
    is_loading: bool,
    error: Option<String>,
    generation: u64,
    pending: Vec<StoreEvent>,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.id == id)
            .or_else(|| self.detached.as_ref().filter(|c| c.id == id))
    }

    fn conversation_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        if let Some(pos) = self.position(id) {
            return self.conversations.get_mut(pos);
        }
        self.detached.as_mut().filter(|c| c.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.conversations.iter().position(|c| c.id == id)
    }

    pub fn find_by_participant(&self, participant_id: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.participant_id == participant_id)
            .or_else(|| self.detached.as_ref().filter(|c| c.participant_id == participant_id))
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.as_deref() == Some(id)
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active.as_deref().and_then(|id| self.conversation(id))
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Bumped on every reset; async completions started under an older value are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Insert-or-replace by id. New conversations go to the front. Either way the
    /// conversation becomes active.
    pub fn upsert_conversation(&mut self, conversation: Conversation) {
        let id = conversation.id.clone();
        if self.detached.as_ref().is_some_and(|c| c.id == id) {
            self.detached = None;
        }
        match self.position(&id) {
            Some(pos) => {
                self.conversations[pos] = conversation;
            }
            None => {
                self.conversations.insert(0, conversation);
            }
        }
        self.emit(StoreEvent::ConversationUpserted { conversation_id: id.clone() });
        self.set_active(Some(&id));
    }

    /// Sets the active pointer. Activating resets the unread count to 0 locally.
    /// Returns false, leaving state untouched, when the id is unknown.
    pub fn set_active(&mut self, id: Option<&str>) -> bool {
        let Some(id) = id else {
            self.detached = None;
            if self.active.take().is_some() {
                self.emit(StoreEvent::ActiveChanged { conversation_id: None });
            }
            return true;
        };

        if self.conversation(id).is_none() {
            return false;
        }
        if self.detached.as_ref().is_some_and(|c| c.id != id) {
            self.detached = None;
        }
        if !self.is_active(id) {
            self.active = Some(id.to_string());
            self.emit(StoreEvent::ActiveChanged { conversation_id: Some(id.to_string()) });
        }
        self.set_unread_count(id, 0);
        true
    }

    pub fn append_message(&mut self, conversation_id: &str, message: Message) -> Append {
        let message_id = message.id.clone();
        let Some(conversation) = self.conversation_mut(conversation_id) else {
            return Append::UnknownConversation;
        };
        if !conversation.append(message) {
            return Append::Duplicate;
        }

        if self.detached.as_ref().is_some_and(|c| c.id == conversation_id) {
            if let Some(promoted) = self.detached.take() {
                self.conversations.insert(0, promoted);
            }
        }
        self.emit(StoreEvent::MessageAppended {
            conversation_id: conversation_id.to_string(),
            message_id,
        });
        Append::Appended
    }

    /// Absolute set, used when the backend reports a count.
    pub fn set_unread_count(&mut self, conversation_id: &str, count: u32) -> bool {
        let Some(conversation) = self.conversation_mut(conversation_id) else {
            return false;
        };
        if conversation.unread_count == count {
            return true;
        }
        conversation.unread_count = count;
        if count == 0 {
            conversation.messages.mark_all_read();
        }
        self.emit(StoreEvent::UnreadChanged {
            conversation_id: conversation_id.to_string(),
            unread_count: count,
        });
        true
    }

    pub(crate) fn increment_unread(&mut self, conversation_id: &str) -> Option<u32> {
        let conversation = self.conversation_mut(conversation_id)?;
        conversation.unread_count = conversation.unread_count.saturating_add(1);
        let unread_count = conversation.unread_count;
        self.emit(StoreEvent::UnreadChanged {
            conversation_id: conversation_id.to_string(),
            unread_count,
        });
        Some(unread_count)
    }

    /// Full replace of the collection. The active pointer survives only if its
    /// conversation is in `conversations` or is handed back as `detached_active`.
    pub fn install_snapshot(
        &mut self,
        conversations: Vec<Conversation>,
        detached_active: Option<Conversation>
    ) {
        self.conversations = conversations;
        self.detached = detached_active.filter(|c| self.is_active(&c.id));
        let count = self.conversations.len();
        self.emit(StoreEvent::ConversationsReplaced { count });

        let still_present = self.active
            .as_deref()
            .is_some_and(|id| self.conversation(id).is_some());
        if self.active.is_some() && !still_present {
            debug!("Active conversation dropped by snapshot");
            self.active = None;
            self.emit(StoreEvent::ActiveChanged { conversation_id: None });
        }
    }

    /// Replaces the conversation stored under `from` with `conversation`, in place.
    /// The active pointer follows the new id.
    pub fn rekey_conversation(&mut self, from: &str, conversation: Conversation) -> bool {
        let to = conversation.id.clone();
        if let Some(pos) = self.position(from) {
            // the confirmed id may already be present from a snapshot
            if let Some(dup) = self.position(&to).filter(|p| *p != pos) {
                self.conversations.remove(dup);
            }
            let pos = self.position(from).unwrap_or(0);
            self.conversations[pos] = conversation;
        } else if self.detached.as_ref().is_some_and(|c| c.id == from) {
            match self.position(&to) {
                // already listed under the confirmed id: that entry takes over
                Some(pos) => {
                    self.detached = None;
                    self.conversations[pos] = conversation;
                }
                None => {
                    self.detached = Some(conversation);
                }
            }
        } else {
            return false;
        }

        if self.is_active(from) {
            self.active = Some(to.clone());
        }
        self.emit(StoreEvent::ConversationRekeyed { from: from.to_string(), to });
        true
    }

    pub fn request_tail(&mut self, conversation_id: &str) {
        self.emit(StoreEvent::TailRequested { conversation_id: conversation_id.to_string() });
    }

    pub fn set_loading(&mut self, is_loading: bool) {
        if self.is_loading != is_loading {
            self.is_loading = is_loading;
            self.emit(StoreEvent::LoadingChanged { is_loading });
        }
    }

    pub fn set_error(&mut self, error: Option<String>) {
        if self.error != error {
            self.error = error.clone();
            self.emit(StoreEvent::ErrorChanged { error });
        }
    }

    /// Logout teardown.
    pub fn reset(&mut self) {
        self.conversations.clear();
        self.detached = None;
        self.active = None;
        self.is_loading = false;
        self.error = None;
        self.generation += 1;
        self.emit(StoreEvent::Reset);
    }

    pub fn take_events(&mut self) -> Vec<StoreEvent> {
        std::mem::take(&mut self.pending)
    }

    fn emit(&mut self, event: StoreEvent) {
        self.pending.push(event);
    }
}

/// Shared handle over one `ChatState`. Cheap to clone; every screen gets one.
#[derive(Clone)]
pub struct ChatStore {
    state: Arc<Mutex<ChatState>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(ChatState::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read<R>(&self, f: impl FnOnce(&ChatState) -> R) -> R {
        f(&self.lock())
    }

    /// Runs one transition under the lock, then publishes the events it produced.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state);
        for event in state.take_events() {
            // no subscribers is fine
            let _ = self.events.send(event);
        }
        result
    }

    /// Like `mutate`, but a no-op returning `None` once the store was reset
    /// after `generation` was captured.
    pub fn mutate_if_current<R>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut ChatState) -> R
    ) -> Option<R> {
        self.mutate(|state| {
            if state.generation() != generation {
                debug!(
                    "Discarding stale completion (generation {} != {})",
                    generation,
                    state.generation()
                );
                return None;
            }
            Some(f(state))
        })
    }

    pub fn generation(&self) -> u64 {
        self.read(|s| s.generation())
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.read(|s| s.conversations().to_vec())
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.read(|s| s.conversation(id).cloned())
    }

    pub fn active_conversation(&self) -> Option<Conversation> {
        self.read(|s| s.active_conversation().cloned())
    }

    pub fn active_id(&self) -> Option<String> {
        self.read(|s| s.active_id().map(str::to_string))
    }

    pub fn is_loading(&self) -> bool {
        self.read(|s| s.is_loading())
    }

    pub fn error(&self) -> Option<String> {
        self.read(|s| s.error().map(str::to_string))
    }

    pub fn upsert_conversation(&self, conversation: Conversation) {
        self.mutate(|s| s.upsert_conversation(conversation))
    }

    pub fn set_active(&self, id: Option<&str>) -> bool {
        self.mutate(|s| s.set_active(id))
    }

    pub fn append_message(&self, conversation_id: &str, message: Message) -> Append {
        self.mutate(|s| s.append_message(conversation_id, message))
    }

    pub fn set_unread_count(&self, conversation_id: &str, count: u32) -> bool {
        self.mutate(|s| s.set_unread_count(conversation_id, count))
    }

    pub fn reset(&self) {
        self.mutate(|s| s.reset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Participant;

    fn participant(id: &str) -> Participant {
        Participant {
            id: id.to_string(),
            name: format!("Mechanic {}", id),
            image: None,
        }
    }

    fn message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            sender_id: "p".to_string(),
            receiver_id: "me".to_string(),
            content: format!("content {}", id),
            timestamp: "2024-03-01T10:00:00.000Z".to_string(),
            read: false,
        }
    }

    fn conversation(id: &str, messages: &[&str], unread: u32) -> Conversation {
        let mut c = Conversation::new(id, &participant(&format!("p-{}", id)));
        for m in messages {
            c.append(message(m));
        }
        c.unread_count = unread;
        c
    }

    #[test]
    fn append_twice_with_same_id_keeps_one_copy() {
        let mut state = ChatState::new();
        state.install_snapshot(vec![conversation("a", &["1"], 0)], None);

        assert_eq!(state.append_message("a", message("2")), Append::Appended);
        assert_eq!(state.append_message("a", message("2")), Append::Duplicate);
        assert_eq!(state.conversation("a").unwrap().messages.len(), 2);
    }

    #[test]
    fn activation_resets_unread_regardless_of_prior_value() {
        let mut state = ChatState::new();
        state.install_snapshot(vec![conversation("a", &["1"], 7)], None);
        assert!(state.set_active(Some("a")));
        assert_eq!(state.conversation("a").unwrap().unread_count, 0);
        assert!(state.conversation("a").unwrap().messages.iter().all(|m| m.read));
    }

    #[test]
    fn activating_unknown_conversation_is_refused() {
        let mut state = ChatState::new();
        state.install_snapshot(vec![conversation("a", &["1"], 0)], None);
        assert!(state.set_active(Some("a")));
        assert!(!state.set_active(Some("missing")));
        assert_eq!(state.active_id(), Some("a"));
    }

    #[test]
    fn upsert_puts_new_conversation_first_and_activates_it() {
        let mut state = ChatState::new();
        state.install_snapshot(vec![conversation("a", &["1"], 0)], None);
        state.upsert_conversation(conversation("b", &[], 3));

        let ids: Vec<&str> = state.conversations().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(state.active_id(), Some("b"));
        assert_eq!(state.conversation("b").unwrap().unread_count, 0);
    }

    #[test]
    fn upsert_of_existing_id_replaces_in_place() {
        let mut state = ChatState::new();
        state.install_snapshot(
            vec![conversation("a", &["1"], 0), conversation("b", &["2"], 0)],
            None
        );
        let mut fresh = conversation("b", &["2", "3"], 0);
        fresh.participant_name = "Renamed".to_string();
        state.upsert_conversation(fresh);

        assert_eq!(state.conversations().len(), 2);
        assert_eq!(state.conversations()[1].participant_name, "Renamed");
    }

    #[test]
    fn active_projection_sees_every_append() {
        let mut state = ChatState::new();
        state.install_snapshot(vec![conversation("a", &["1"], 0)], None);
        state.set_active(Some("a"));
        state.append_message("a", message("2"));

        let active = state.active_conversation().unwrap();
        assert_eq!(active.messages.len(), 2);
        assert_eq!(active.last_message.as_deref(), Some("content 2"));
        assert_eq!(active, state.conversation("a").unwrap());
    }

    #[test]
    fn set_unread_count_is_absolute() {
        let mut state = ChatState::new();
        state.install_snapshot(vec![conversation("a", &["1"], 5)], None);
        state.increment_unread("a");
        assert!(state.set_unread_count("a", 2));
        assert_eq!(state.conversation("a").unwrap().unread_count, 2);
        assert!(!state.set_unread_count("missing", 1));
    }

    #[test]
    fn detached_active_rejoins_collection_on_first_message() {
        let mut state = ChatState::new();
        state.upsert_conversation(conversation("new", &[], 0));
        let detached = state.active_conversation().cloned();
        state.install_snapshot(vec![conversation("a", &["1"], 0)], detached);

        assert_eq!(state.conversations().len(), 1);
        assert_eq!(state.active_id(), Some("new"));

        assert_eq!(state.append_message("new", message("9")), Append::Appended);
        assert_eq!(state.conversations()[0].id, "new");
        assert_eq!(state.active_id(), Some("new"));
    }

    #[test]
    fn rekey_moves_active_pointer() {
        let mut state = ChatState::new();
        state.upsert_conversation(conversation("new-x", &[], 0));
        assert!(state.rekey_conversation("new-x", conversation("srv-1", &[], 0)));
        assert_eq!(state.active_id(), Some("srv-1"));
        assert!(state.conversation("new-x").is_none());
    }

    #[test]
    fn rekey_of_detached_placeholder_onto_listed_id_keeps_one_entry() {
        let mut state = ChatState::new();
        state.upsert_conversation(conversation("new-x", &[], 0));
        let detached = state.active_conversation().cloned();
        state.install_snapshot(vec![conversation("srv-1", &["1"], 0)], detached);

        assert!(state.rekey_conversation("new-x", conversation("srv-1", &["1"], 0)));

        let ids: Vec<&str> = state.conversations().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["srv-1"]);
        assert_eq!(state.active_id(), Some("srv-1"));
        assert!(state.conversation("new-x").is_none());
        assert_eq!(state.conversation("srv-1").unwrap().messages.len(), 1);
    }

    #[test]
    fn reset_clears_and_bumps_generation() {
        let mut state = ChatState::new();
        state.upsert_conversation(conversation("a", &["1"], 0));
        let before = state.generation();
        state.reset();
        assert!(state.conversations().is_empty());
        assert!(state.active_id().is_none());
        assert_eq!(state.generation(), before + 1);
    }

    #[test]
    fn store_publishes_events_in_mutation_order() {
        let store = ChatStore::new();
        let mut rx = store.subscribe();
        store.upsert_conversation(conversation("a", &[], 0));
        store.append_message("a", message("1"));

        assert_eq!(rx.try_recv().unwrap(), StoreEvent::ConversationUpserted {
            conversation_id: "a".to_string(),
        });
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::ActiveChanged {
            conversation_id: Some("a".to_string()),
        });
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::MessageAppended {
            conversation_id: "a".to_string(),
            message_id: "1".to_string(),
        });
    }

    #[test]
    fn stale_generation_mutation_is_a_no_op() {
        let store = ChatStore::new();
        let generation = store.generation();
        store.reset();
        let applied = store.mutate_if_current(generation, |s| {
            s.upsert_conversation(conversation("a", &["1"], 0))
        });
        assert!(applied.is_none());
        assert!(store.conversations().is_empty());
    }
}
