use crate::api::ChatApi;
use crate::error::{ ChatError, Result };
use crate::loader::SnapshotLoader;
use crate::models::chat::{ Message, Participant };
use crate::models::websocket::IncomingChatMessage;
use crate::read_state::ReadStateTracker;
use crate::realtime::backoff::BackoffConfig;
use crate::realtime::router::{ self, ChannelScope };
use crate::realtime::{ ChannelConfig, ChannelState, RealtimeChannel };
use crate::reconcile::{ self, Admission, Origin };
use crate::store::conversation::Conversation;
use crate::store::ChatStore;
use log::{ debug, error, info };
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{ AbortHandle, JoinHandle, JoinSet };

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user_id: String,
    /// Bearer token, also sent as the `token` query of the realtime channel
    pub token: String,
    pub realtime_url: String,
    /// Quiet period before the inbox refetches the list after realtime activity
    pub list_refresh_delay: Duration,
    pub backoff: BackoffConfig,
}

/// Everything one authenticated user needs: the shared store plus the loaders
/// and trackers that write into it. Cheap to clone; screens hold a clone.
#[derive(Clone)]
pub struct ChatSession {
    store: ChatStore,
    api: Arc<dyn ChatApi>,
    loader: SnapshotLoader,
    reads: ReadStateTracker,
    config: Arc<SessionConfig>,
}

impl ChatSession {
    pub fn new(api: Arc<dyn ChatApi>, config: SessionConfig) -> Self {
        let store = ChatStore::new();
        Self {
            loader: SnapshotLoader::new(api.clone(), store.clone(), &config.user_id),
            reads: ReadStateTracker::new(api.clone(), store.clone()),
            store,
            api,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn user_id(&self) -> &str {
        &self.config.user_id
    }

    pub async fn load_conversation_list(&self) -> Result<usize> {
        self.loader.load_conversation_list().await
    }

    pub async fn load_conversation(&self, id: &str) -> Result<Conversation> {
        self.loader.load_conversation(id).await
    }

    pub fn set_active(&self, id: Option<&str>) -> bool {
        self.store.set_active(id)
    }

    pub async fn mark_read(&self, conversation_id: &str) -> Option<u32> {
        self.reads.mark_read(conversation_id).await
    }

    /// Opens (or starts) the conversation with a participant picked elsewhere in the app.
    pub async fn contact(&self, participant: &Participant) -> Result<Conversation> {
        self.loader.open_with_participant(participant).await
    }

    /// Sends `content` and stores the message once the backend accepted it.
    ///
    /// Nothing is appended on failure; the error goes back to the caller.
    pub async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let conversation = self.store
            .conversation(conversation_id)
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))?;
        if conversation.is_placeholder() {
            return Err(ChatError::Unconfirmed(conversation_id.to_string()));
        }

        let generation = self.store.generation();
        let receipt = match self.api.send_message(conversation_id, content).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!("Error sending message to {}: {}", conversation_id, e);
                return Err(e);
            }
        };

        let user_id = self.user_id();
        let message = match receipt.message {
            Some(stored) => {
                let mut message = stored.into_message(user_id, &conversation.participant_id);
                if message.sender_id.is_empty() {
                    message.sender_id = user_id.to_string();
                    message.receiver_id = conversation.participant_id.clone();
                }
                if message.content.is_empty() {
                    message.content = content.to_string();
                }
                message
            }
            None => Message::local(user_id, &conversation.participant_id, content),
        };

        let admission = self.store
            .mutate_if_current(generation, |s| {
                reconcile::admit(s, conversation_id, message.clone(), Origin::LocalSend)
            })
            .ok_or(ChatError::Cancelled)?;
        debug!("Sent message {} to {} ({:?})", message.id, conversation_id, admission);
        Ok(message)
    }

    /// Mounts the conversation list: loads it, then listens for activity on any conversation.
    /// A failed load leaves the error flag set; the screen still mounts.
    pub async fn open_inbox(&self) -> Result<InboxScreen> {
        if let Err(e) = self.load_conversation_list().await {
            debug!("Inbox mounted without a fresh list: {}", e);
        }
        let mount = self.mount(ChannelScope::Inbox)?;
        Ok(InboxScreen { mount })
    }

    /// Mounts the detail screen for one conversation. The conversation is active
    /// with an unread count of 0 by the time this returns; the backend read
    /// confirmation runs in the background.
    pub async fn open_conversation(&self, id: &str) -> Result<ConversationScreen> {
        let conversation = self.load_conversation(id).await?;
        let conversation_id = conversation.id.clone();
        let mount = self.mount(ChannelScope::Conversation(conversation_id.clone()))?;

        let reads = self.reads.clone();
        let read_id = conversation_id.clone();
        let initial_read = tokio::spawn(async move {
            reads.mark_read(&read_id).await;
        });

        Ok(ConversationScreen {
            conversation_id,
            session: self.clone(),
            mount,
            initial_read,
        })
    }

    /// Clears every conversation. Completions still in flight are discarded.
    pub fn logout(&self) {
        self.store.reset();
        info!("Session for {} logged out", self.config.user_id);
    }

    fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.config.realtime_url.clone(),
            token: self.config.token.clone(),
            user_id: self.config.user_id.clone(),
            backoff: self.config.backoff.clone(),
        }
    }

    fn mount(&self, scope: ChannelScope) -> Result<Mount> {
        let (channel, inbound) = RealtimeChannel::connect(self.channel_config(), scope.clone())?;
        let pump = tokio::spawn(pump_realtime(self.clone(), scope, self.store.generation(), inbound));
        Ok(Mount { channel, pump })
    }

    /// Applies one inbound event. `None` once the store was reset after the
    /// screen mounted.
    fn apply_realtime(
        &self,
        scope: &ChannelScope,
        generation: u64,
        incoming: &IncomingChatMessage
    ) -> Option<RealtimeOutcome> {
        let chat_id = incoming.chat_id.as_str();
        // routing and admission in one transition: whichever channel lands the
        // message first does the follow-up, later copies are duplicates
        self.store.mutate_if_current(generation, |s| {
            let routing = router::route(scope, self.user_id(), s.active_id(), incoming);
            if !routing.admit {
                debug!("Dropping echo of own message in {}", chat_id);
                return RealtimeOutcome::default();
            }

            let participant_id = s
                .conversation(chat_id)
                .map(|c| c.participant_id.clone())
                .unwrap_or_else(|| incoming.sender_id().to_string());
            let message = incoming.to_message(self.user_id(), &participant_id);
            let admission = reconcile::admit(s, chat_id, message, Origin::Realtime);
            if admission.is_appended() && routing.scroll_to_tail {
                s.request_tail(chat_id);
            }

            RealtimeOutcome {
                mark_read: routing.mark_read && admission.is_appended(),
                refresh_list: routing.refresh_list || admission == Admission::UnknownConversation,
            }
        })
    }
}

#[derive(Debug, Default)]
struct RealtimeOutcome {
    mark_read: bool,
    refresh_list: bool,
}

/// Drains one channel into the store. Follow-up work (read confirmations, the
/// debounced list refresh) lives in a `JoinSet`, so it dies with the pump.
async fn pump_realtime(
    session: ChatSession,
    scope: ChannelScope,
    generation: u64,
    mut inbound: mpsc::Receiver<IncomingChatMessage>
) {
    let mut background = JoinSet::new();
    let mut pending_refresh: Option<AbortHandle> = None;

    loop {
        tokio::select! {
            incoming = inbound.recv() => {
                let Some(incoming) = incoming else {
                    break;
                };
                let Some(outcome) = session.apply_realtime(&scope, generation, &incoming) else {
                    debug!("Session ended, stopping realtime pump ({:?})", scope);
                    break;
                };

                if outcome.mark_read {
                    let reads = session.reads.clone();
                    let chat_id = incoming.chat_id.clone();
                    background.spawn(async move {
                        reads.mark_read(&chat_id).await;
                    });
                }
                if outcome.refresh_list {
                    if let Some(previous) = pending_refresh.take() {
                        previous.abort();
                    }
                    let session = session.clone();
                    pending_refresh = Some(background.spawn(async move {
                        tokio::time::sleep(session.config.list_refresh_delay).await;
                        if let Err(e) = session.load_conversation_list().await {
                            debug!("Debounced list refresh failed: {}", e);
                        }
                    }));
                }
            }
            Some(_) = background.join_next(), if !background.is_empty() => {}
        }
    }
}

struct Mount {
    channel: RealtimeChannel,
    pump: JoinHandle<()>,
}

impl Drop for Mount {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

pub struct InboxScreen {
    mount: Mount,
}

impl InboxScreen {
    pub fn channel_state(&self) -> ChannelState {
        self.mount.channel.state()
    }

    pub fn close(self) {
        debug!("Inbox screen closed");
    }
}

pub struct ConversationScreen {
    conversation_id: String,
    session: ChatSession,
    mount: Mount,
    initial_read: JoinHandle<()>,
}

impl ConversationScreen {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn conversation(&self) -> Option<Conversation> {
        self.session.store.conversation(&self.conversation_id)
    }

    pub fn channel_state(&self) -> ChannelState {
        self.mount.channel.state()
    }

    pub async fn send(&self, content: &str) -> Result<Message> {
        self.session.send_message(&self.conversation_id, content).await
    }

    pub fn close(self) {
        debug!("Conversation screen {} closed", self.conversation_id);
    }
}

impl Drop for ConversationScreen {
    fn drop(&mut self) {
        self.initial_read.abort();
        let id = self.conversation_id.as_str();
        self.session.store.mutate(|s| {
            if s.is_active(id) {
                s.set_active(None);
            }
        });
    }
}
