//! Collaborator traits the refresh scheduler calls out to.

use async_trait::async_trait;

use super::error::AuthError;
use super::token::Credential;

/// Exchanges a refresh token for a new credential pair.
///
/// Return [`AuthError::CredentialRejected`] when the server refuses the
/// refresh token itself; that is the one error that ends the session. Any
/// other error is retried.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, AuthError>;
}

/// Answers whether the network is worth trying right now.
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Reachability probe for hosts without a connectivity signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReachable;

#[async_trait]
impl Reachability for AlwaysReachable {
    async fn is_reachable(&self) -> bool {
        true
    }
}
