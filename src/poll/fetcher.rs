//! Collaborator trait the poller fetches through.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::error::FetchError;
use super::status::StatusValue;

/// One observation of a resource: its status plus whatever else the server
/// returned alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport<S> {
    pub status: S,
    pub fields: Map<String, Value>,
}

impl<S> StatusReport<S> {
    pub fn new(status: S) -> Self {
        Self {
            status,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// Fetches the current status of a watched resource.
#[async_trait]
pub trait StatusFetcher<S: StatusValue>: Send + Sync {
    async fn fetch_status(&self, resource_id: &str) -> Result<StatusReport<S>, FetchError>;
}
