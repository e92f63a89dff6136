//! Credential pair and session payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::claims;

/// Bearer credential pair issued by the auth server.
///
/// Always replaced as a whole; nothing mutates one in place.
///
/// # Example
/// ```
/// use lapse::auth::Credential;
///
/// let credential = Credential::new("header.payload.signature", "refresh-1");
/// assert_eq!(credential.refresh_token, "refresh-1");
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"..")
            .field("refresh_token", &"..")
            .finish()
    }
}

/// An authenticated session: the credential plus who it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub credential: Credential,
    pub user_id: Option<String>,
}

impl Session {
    /// Build a session, taking the identity from the token's `sub` claim.
    pub fn from_credential(credential: Credential) -> Self {
        let user_id = claims::decode(&credential.access_token)
            .ok()
            .and_then(|claims| claims.subject);
        Self {
            credential,
            user_id,
        }
    }
}
