use crate::use_cases::SessionHub;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    // Registry of live sessions and their relay tasks.
    pub hub: Arc<SessionHub>,
}
