use std::sync::Arc;
use tracing::{debug, info};

use crate::{DriverError, DriverResult, ObjectOptions, ObjectStore, Part, UploadSession};

/// Finds the one authoritative multipart session for a path.
///
/// Nothing is cached: each call asks the store again, so two calls for the
/// same path agree as long as no other writer opened a newer session in
/// between. Writers to the same path must be serialised by the caller.
#[derive(Clone)]
pub struct UploadSessionManager {
    store: Arc<dyn ObjectStore>,
    options: ObjectOptions,
}

impl UploadSessionManager {
    pub fn new(store: Arc<dyn ObjectStore>, options: ObjectOptions) -> Self {
        Self { store, options }
    }

    /// Highest-id open session whose key is exactly `path`, if any
    pub async fn find_session(&self, path: &str) -> DriverResult<Option<UploadSession>> {
        let sessions = match self.store.list_sessions(path).await {
            Ok(sessions) => sessions,
            Err(DriverError::UploadNotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        Ok(sessions
            .into_iter()
            .filter(|s| s.path == path)
            .max_by(|a, b| a.id.cmp(&b.id)))
    }

    /// Existing session for `path`, or a freshly initiated one
    pub async fn resolve_session(&self, path: &str) -> DriverResult<UploadSession> {
        if let Some(session) = self.find_session(path).await? {
            debug!("Reusing upload session {} for {}", session.id, path);
            return Ok(session);
        }

        let session = self.store.init_session(path, &self.options).await?;
        info!("Started upload session {} for {}", session.id, path);
        Ok(session)
    }

    /// Committed parts of `session`, ordered by part number
    pub async fn list_parts(&self, session: &UploadSession) -> DriverResult<Vec<Part>> {
        let mut parts = self.store.list_parts(session).await?;
        parts.sort_by_key(|p| p.number);
        Ok(parts)
    }

    /// Resolve the session for `path` along with its parts
    pub async fn session_with_parts(&self, path: &str) -> DriverResult<(UploadSession, Vec<Part>)> {
        let session = self.resolve_session(path).await?;
        let parts = self.list_parts(&session).await?;
        Ok((session, parts))
    }
}
