use crate::realtime::backoff::BackoffConfig;
use crate::session::SessionConfig;
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Backend Args ---
    /// Base URL of the chat REST backend (e.g., http://localhost:5000)
    #[arg(long, env = "CHAT_API_BASE_URL", default_value = "http://localhost:5000")]
    pub api_base_url: String,

    /// Event-stream endpoint (e.g., ws://localhost:5000/socket)
    #[arg(long, env = "CHAT_REALTIME_URL", default_value = "ws://localhost:5000")]
    pub realtime_url: String,

    /// Bearer token of the authenticated user
    #[arg(long, env = "CHAT_AUTH_TOKEN")]
    pub auth_token: String,

    /// Id of the authenticated user, announced on the realtime channel
    #[arg(long, env = "CHAT_USER_ID")]
    pub user_id: String,

    /// Timeout in seconds for every REST call.
    #[arg(long, env = "CHAT_REQUEST_TIMEOUT_SECS", default_value = "15")]
    pub request_timeout_secs: u64,

    // --- Screen Args ---
    /// Open this conversation's detail screen instead of the inbox.
    #[arg(long, env = "CHAT_CONVERSATION_ID")]
    pub conversation_id: Option<String>,

    /// Debounce in milliseconds before the inbox refetches the list after realtime activity.
    #[arg(long, env = "CHAT_LIST_REFRESH_DELAY_MS", default_value = "500")]
    pub list_refresh_delay_ms: u64,

    // --- Reconnect Args ---
    /// Delay in milliseconds before the first reconnect attempt.
    #[arg(long, env = "CHAT_RECONNECT_INITIAL_MS", default_value = "500")]
    pub reconnect_initial_ms: u64,

    /// Upper bound in milliseconds for a single reconnect delay.
    #[arg(long, env = "CHAT_RECONNECT_MAX_MS", default_value = "30000")]
    pub reconnect_max_ms: u64,

    /// Consecutive failed reconnects before giving up. 0 retries forever.
    #[arg(long, env = "CHAT_RECONNECT_MAX_ATTEMPTS", default_value = "10")]
    pub reconnect_max_attempts: u32,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

impl Args {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial: Duration::from_millis(self.reconnect_initial_ms),
            max: Duration::from_millis(self.reconnect_max_ms),
            max_attempts: (self.reconnect_max_attempts > 0).then_some(self.reconnect_max_attempts),
            ..BackoffConfig::default()
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            user_id: self.user_id.clone(),
            token: self.auth_token.clone(),
            realtime_url: self.realtime_url.clone(),
            list_refresh_delay: Duration::from_millis(self.list_refresh_delay_ms),
            backoff: self.backoff(),
        }
    }
}
