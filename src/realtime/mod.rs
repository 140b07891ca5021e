pub mod backoff;
pub mod router;

use crate::error::{ ChatError, Result };
use crate::models::websocket::{ ClientEvent, IncomingChatMessage, ServerEvent };
use backoff::{ Backoff, BackoffConfig };
use futures::{ SinkExt, StreamExt };
use futures::stream::SplitSink;
use log::{ debug, info, warn };
use router::ChannelScope;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{ mpsc, watch };
use tokio::task::JoinHandle;
use tokio_tungstenite::{ connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream };
use url::Url;

const INBOUND_BUFFER: usize = 64;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    pub token: String,
    pub user_id: String,
    pub backoff: BackoffConfig,
}

enum SessionEnd {
    /// The owner let go of the channel.
    Released,
    Lost(String),
}

/// One event-stream connection, owned by exactly one screen.
///
/// The connection runs on its own task. Dropping the channel aborts that task,
/// which closes the socket; nothing it received afterwards can reach the store.
pub struct RealtimeChannel {
    scope: ChannelScope,
    state: watch::Receiver<ChannelState>,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    task: JoinHandle<()>,
}

impl RealtimeChannel {
    /// Starts connecting in the background. Inbound chat messages arrive on the
    /// returned receiver in transport order.
    pub fn connect(
        config: ChannelConfig,
        scope: ChannelScope
    ) -> Result<(Self, mpsc::Receiver<IncomingChatMessage>)> {
        let url = connection_url(&config.url, &config.token, scope.room())?;
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);

        let task = tokio::spawn(
            run_channel(url, config, scope.clone(), state_tx, outbound_rx, inbound_tx)
        );

        Ok((
            Self {
                scope,
                state: state_rx,
                outbound: outbound_tx,
                task,
            },
            inbound_rx,
        ))
    }

    pub fn scope(&self) -> &ChannelScope {
        &self.scope
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Queues an outbound signal; it is written once the socket is connected.
    pub fn send(&self, event: ClientEvent) -> Result<()> {
        self.outbound.send(event).map_err(|_| ChatError::ChannelClosed)
    }

    /// True once the connection task stopped for good (released or gave up reconnecting).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn disconnect(self) {
        info!("Releasing realtime channel ({:?})", self.scope);
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn connection_url(base: &str, token: &str, room: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(base)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("token", token);
        if let Some(room) = room {
            query.append_pair("chatId", room);
        }
    }
    Ok(url)
}

async fn run_channel(
    url: Url,
    config: ChannelConfig,
    scope: ChannelScope,
    state: watch::Sender<ChannelState>,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    inbound: mpsc::Sender<IncomingChatMessage>
) {
    let mut backoff = Backoff::new(config.backoff.clone());

    loop {
        state.send_replace(ChannelState::Connecting);
        debug!("Connecting realtime channel to {} ({:?})", config.url, scope);

        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                backoff.reset();
                state.send_replace(ChannelState::Connected);
                info!("Realtime channel connected ({:?})", scope);

                let end = run_session(socket, &config, &scope, &mut outbound, &inbound).await;
                state.send_replace(ChannelState::Disconnected);
                match end {
                    SessionEnd::Released => {
                        info!("Realtime channel released ({:?})", scope);
                        return;
                    }
                    SessionEnd::Lost(reason) => {
                        warn!("Realtime channel lost ({:?}): {}", scope, reason);
                    }
                }
            }
            Err(e) => {
                state.send_replace(ChannelState::Disconnected);
                warn!("Realtime connect_error ({:?}): {}", scope, e);
            }
        }

        if inbound.is_closed() {
            return;
        }
        match backoff.next_delay() {
            Some(delay) => {
                info!("Reconnecting realtime channel in {:?} (attempt {})", delay, backoff.attempt());
                tokio::time::sleep(delay).await;
            }
            None => {
                warn!(
                    "Realtime channel giving up after {} attempts ({:?})",
                    backoff.attempt(),
                    scope
                );
                return;
            }
        }
    }
}

async fn run_session(
    socket: Socket,
    config: &ChannelConfig,
    scope: &ChannelScope,
    outbound: &mut mpsc::UnboundedReceiver<ClientEvent>,
    inbound: &mpsc::Sender<IncomingChatMessage>
) -> SessionEnd {
    let (mut tx, mut rx) = socket.split();

    // every (re)connect announces presence and rejoins the room
    let mut greeting = vec![ClientEvent::Setup { user_id: config.user_id.clone() }];
    if let Some(room) = scope.room() {
        greeting.push(ClientEvent::JoinChat { chat_id: room.to_string() });
    }
    for event in &greeting {
        if let Err(e) = send_event(&mut tx, event).await {
            return SessionEnd::Lost(format!("handshake failed: {}", e));
        }
    }

    loop {
        tokio::select! {
            frame = rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match ServerEvent::decode(&text) {
                            Ok(ServerEvent::MessageReceived(incoming)) => {
                                // a full buffer pauses reads, pings included, until the pump catches up
                                let delivered = match inbound.try_send(incoming) {
                                    Ok(()) => true,
                                    Err(TrySendError::Full(incoming)) => {
                                        warn!("Realtime inbound buffer full ({:?}), pausing reads", scope);
                                        inbound.send(incoming).await.is_ok()
                                    }
                                    Err(TrySendError::Closed(_)) => false,
                                };
                                if !delivered {
                                    let _ = tx.close().await;
                                    return SessionEnd::Released;
                                }
                            }
                            Ok(ServerEvent::Other(name)) => {
                                debug!("Ignoring realtime event '{}'", name);
                            }
                            Err(e) => {
                                warn!("Failed to parse realtime frame: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if tx.send(Message::Pong(data)).await.is_err() {
                            return SessionEnd::Lost("failed to send pong".to_string());
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        return SessionEnd::Lost("closed by server".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return SessionEnd::Lost(e.to_string());
                    }
                    None => {
                        return SessionEnd::Lost("stream ended".to_string());
                    }
                }
            }
            event = outbound.recv() => {
                match event {
                    Some(event) => {
                        if let Err(e) = send_event(&mut tx, &event).await {
                            return SessionEnd::Lost(e.to_string());
                        }
                    }
                    None => {
                        let _ = tx.close().await;
                        return SessionEnd::Released;
                    }
                }
            }
        }
    }
}

async fn send_event(tx: &mut SplitSink<Socket, Message>, event: &ClientEvent) -> Result<()> {
    let json = serde_json::to_string(event)?;
    tx.send(Message::Text(json)).await?;
    Ok(())
}
