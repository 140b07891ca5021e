pub mod api;
pub mod cli;
pub mod error;
pub mod loader;
pub mod models;
pub mod read_state;
pub mod realtime;
pub mod reconcile;
pub mod session;
pub mod store;

use api::HttpChatApi;
use cli::Args;
use error::Result;
use log::{ info, warn };
use session::ChatSession;
use std::sync::Arc;
use store::ChatStore;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub async fn run(args: Args) -> Result<()> {
    info!("--- Core Configuration ---");
    info!("API Base URL: {}", args.api_base_url);
    info!("Realtime URL: {}", args.realtime_url);
    info!("User Id: {}", args.user_id);
    info!("Request Timeout: {}s", args.request_timeout_secs);
    info!("List Refresh Delay: {}ms", args.list_refresh_delay_ms);
    info!(
        "Reconnect Backoff: {}ms..{}ms, max attempts {}",
        args.reconnect_initial_ms,
        args.reconnect_max_ms,
        args.reconnect_max_attempts
    );
    match &args.conversation_id {
        Some(id) => info!("Screen: conversation {}", id),
        None => info!("Screen: inbox"),
    }
    info!("-------------------------");

    let api = HttpChatApi::new(&args.api_base_url, &args.auth_token, args.request_timeout())?;
    let session = ChatSession::new(Arc::new(api), args.session_config());
    let logger = log_store_events(session.store());

    match &args.conversation_id {
        Some(id) => {
            if let Err(e) = session.load_conversation_list().await {
                warn!("Starting without a conversation list: {}", e);
            }
            let screen = session.open_conversation(id).await?;
            wait_for_shutdown().await;
            screen.close();
        }
        None => {
            let screen = session.open_inbox().await?;
            wait_for_shutdown().await;
            screen.close();
        }
    }

    session.logout();
    logger.abort();
    Ok(())
}

fn log_store_events(store: &ChatStore) -> JoinHandle<()> {
    let mut events = store.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!("Store event: {:?}", event),
                Err(RecvError::Lagged(skipped)) => warn!("Store event log lagged, {} events skipped", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        return;
    }
    info!("Shutting down");
}
