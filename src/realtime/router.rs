use crate::models::websocket::IncomingChatMessage;

/// What the owning screen is showing: decides the room join and whether the list refreshes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelScope {
    Inbox,
    Conversation(String),
}

impl ChannelScope {
    pub fn room(&self) -> Option<&str> {
        match self {
            ChannelScope::Inbox => None,
            ChannelScope::Conversation(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Routing {
    pub admit: bool,
    pub scroll_to_tail: bool,
    pub mark_read: bool,
    pub refresh_list: bool,
}

/// Applicability rules for a `message received` event.
///
/// Focus is the store's active conversation at delivery time, not the screen
/// that owns the channel, so every live channel routes the same event the same way.
///
/// - Active conversation, sent by the other party: append, follow the tail, confirm read.
/// - Active conversation, sent by the local user: dropped, the send path already stored it.
/// - Any other conversation: append (counted as unread).
///
/// The inbox channel additionally refreshes the list shortly after.
pub fn route(
    scope: &ChannelScope,
    local_user_id: &str,
    active_id: Option<&str>,
    incoming: &IncomingChatMessage
) -> Routing {
    let refresh_list = *scope == ChannelScope::Inbox;

    if active_id == Some(incoming.chat_id.as_str()) {
        if incoming.sender_id() == local_user_id {
            return Routing::default();
        }
        return Routing {
            admit: true,
            scroll_to_tail: true,
            mark_read: true,
            refresh_list,
        };
    }

    Routing {
        admit: true,
        refresh_list,
        ..Routing::default()
    }
}
