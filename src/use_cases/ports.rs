// Port for reaching a session runtime, in-process or over the network.

use crate::domain::SessionError;
use crate::use_cases::types::PeerLink;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Joins (or creates) the named session. Rejections are reported synchronously.
    async fn join(&self, session_name: &str) -> Result<PeerLink, SessionError>;
}

#[async_trait]
impl<T> SessionConnector for Arc<T>
where
    T: SessionConnector + ?Sized,
{
    async fn join(&self, session_name: &str) -> Result<PeerLink, SessionError> {
        self.as_ref().join(session_name).await
    }
}
