use crate::store::ObjectStore;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Finds session folders under a status prefix
pub struct SessionLocator {
    store: Arc<dyn ObjectStore>,
}

impl SessionLocator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Child folders of `status_prefix`, one per session, in store order.
    /// A listing failure only empties this prefix; the rest of a scan goes on.
    #[instrument(skip(self))]
    pub async fn list_sessions(&self, status_prefix: &str) -> Vec<String> {
        match self.store.list_prefixes(status_prefix).await {
            Ok(prefixes) => {
                debug!(prefix = %status_prefix, sessions = prefixes.len(), "Located sessions");
                prefixes
            }
            Err(e) => {
                warn!(prefix = %status_prefix, error = %e, "Failed to list session folders");
                Vec::new()
            }
        }
    }
}
