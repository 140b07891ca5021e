use crate::models::chat::Message;
use crate::store::conversation::Conversation;
use crate::store::{ Append, ChatState };
use log::debug;

/// Where an incoming message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Snapshot,
    LocalSend,
    Realtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Appended {
        unread_incremented: bool,
    },
    Duplicate,
    UnknownConversation,
}

impl Admission {
    pub fn is_appended(&self) -> bool {
        matches!(self, Admission::Appended { .. })
    }
}

/// The single gate every message passes through before it reaches a conversation log.
///
/// Appends only if the id is new to the target conversation. A realtime arrival
/// for a conversation that is not active bumps its unread count by one.
pub fn admit(
    state: &mut ChatState,
    conversation_id: &str,
    message: Message,
    origin: Origin
) -> Admission {
    let was_active = state.is_active(conversation_id);
    let message_id = message.id.clone();

    match state.append_message(conversation_id, message) {
        Append::Appended => {
            let bump = origin == Origin::Realtime && !was_active;
            if bump {
                state.increment_unread(conversation_id);
            }
            Admission::Appended { unread_incremented: bump }
        }
        Append::Duplicate => {
            debug!(
                "Suppressed duplicate message {} in {} ({:?})",
                message_id,
                conversation_id,
                origin
            );
            Admission::Duplicate
        }
        Append::UnknownConversation => {
            debug!(
                "Message {} targets unknown conversation {} ({:?})",
                message_id,
                conversation_id,
                origin
            );
            Admission::UnknownConversation
        }
    }
}

/// Installs a list snapshot with full-replace semantics.
///
/// Conversations without messages are dropped. The active conversation keeps
/// local messages the snapshot does not carry yet (appended after the
/// snapshot's own, by id) and keeps an unread count of 0. If the snapshot
/// omits the active conversation it is kept: at the front when it has
/// messages, detached from the collection when it is empty.
pub fn merge_snapshot(state: &mut ChatState, snapshot: Vec<Conversation>) -> usize {
    let local_active = state.active_conversation().cloned();
    let mut next: Vec<Conversation> = snapshot
        .into_iter()
        .filter(Conversation::has_messages)
        .collect();
    let mut detached = None;

    if let Some(local) = local_active {
        match next.iter_mut().find(|c| c.id == local.id) {
            Some(fresh) => {
                for message in local.messages.iter() {
                    if !fresh.messages.contains(&message.id) {
                        fresh.append(message.clone());
                    }
                }
                fresh.unread_count = 0;
                fresh.messages.mark_all_read();
            }
            None if local.has_messages() => next.insert(0, local),
            None => {
                detached = Some(local);
            }
        }
    }

    let count = next.len();
    state.install_snapshot(next, detached);
    count
}
