use std::sync::Arc;

use crate::db::JobStore;
use crate::services::{queue::NotificationQueue, workflow::Workflow};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<Workflow>,
    pub store: Arc<dyn JobStore>,
    pub queue: Option<Arc<NotificationQueue>>,
    pub internal_api_key: Arc<str>,
}

impl AppState {
    pub fn new(
        workflow: Workflow,
        store: Arc<dyn JobStore>,
        queue: Option<Arc<NotificationQueue>>,
        internal_api_key: &str,
    ) -> Self {
        Self {
            workflow: Arc::new(workflow),
            store,
            queue,
            internal_api_key: Arc::from(internal_api_key),
        }
    }
}
