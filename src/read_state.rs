use crate::api::ChatApi;
use crate::store::ChatStore;
use log::{ debug, warn };
use std::sync::Arc;

#[derive(Clone)]
pub struct ReadStateTracker {
    api: Arc<dyn ChatApi>,
    store: ChatStore,
}

impl ReadStateTracker {
    pub fn new(api: Arc<dyn ChatApi>, store: ChatStore) -> Self {
        Self { api, store }
    }

    /// Best-effort read confirmation. Applies the server's count (0 when absent)
    /// and returns it; failures are logged and leave the count as it is.
    pub async fn mark_read(&self, conversation_id: &str) -> Option<u32> {
        let generation = self.store.generation();
        match self.api.mark_read(conversation_id).await {
            Ok(receipt) => {
                let count = receipt.unread_count.unwrap_or(0);
                self.store.mutate_if_current(generation, |s| s.set_unread_count(conversation_id, count))?;
                debug!("Marked {} read (unread {})", conversation_id, count);
                Some(count)
            }
            Err(e) => {
                warn!("Error marking chat {} as read: {}", conversation_id, e);
                None
            }
        }
    }
}
