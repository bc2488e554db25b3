use std::sync::Arc;

use gemini_bridge::Bridge;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<Bridge>,
}

impl AppState {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }
}
