//! In-memory session state shared between the refresh scheduler and the
//! application.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

use super::store::CredentialStore;
use super::token::{Credential, Session};

/// Holds the current session. Whole-value replace or clear only.
///
/// Readers get a snapshot (`get`) or a change feed (`subscribe`). When a
/// [`CredentialStore`] is attached, every replace is persisted and every
/// clear is propagated; a failing store is logged and otherwise ignored so
/// the in-memory session never diverges from what the scheduler decided.
pub struct SessionStore {
    tx: watch::Sender<Option<Session>>,
    persistence: Option<Arc<dyn CredentialStore>>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx,
            persistence: None,
        }
    }

    /// Write every change through to `store`.
    pub fn with_persistence(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.persistence = Some(store);
        self
    }

    pub fn persistence(&self) -> Option<&Arc<dyn CredentialStore>> {
        self.persistence.as_ref()
    }

    /// Replace the session with one built from `credential`.
    pub fn set(&self, credential: Credential) -> Session {
        let session = Session::from_credential(credential);
        if let Some(store) = &self.persistence {
            if let Err(e) = store.persist(&session.credential) {
                warn!(error = %e, "Failed to persist credential");
            }
        }
        self.tx.send_replace(Some(session.clone()));
        session
    }

    pub fn get(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.tx.borrow().as_ref().map(|s| s.credential.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.tx
            .borrow()
            .as_ref()
            .map(|s| s.credential.access_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Drop the session. Returns whether one was present.
    pub fn clear(&self) -> bool {
        if let Some(store) = &self.persistence {
            if let Err(e) = store.clear() {
                warn!(error = %e, "Failed to clear persisted credential");
            }
        }
        self.tx.send_replace(None).is_some()
    }

    /// Subscribe to replace/clear changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.is_authenticated())
            .field("persistence", &self.persistence.as_ref().map(|_| ".."))
            .finish()
    }
}
