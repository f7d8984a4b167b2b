//! Opaque bearer tokens. Only the SHA-256 digest of a token is ever stored.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::profile::ActorId;

#[derive(Clone, Debug)]
pub struct SessionToken(SecretString);

impl SessionToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string().into())
    }

    /// Extracts the token from an `Authorization` header value.
    pub fn from_bearer_header(header: &str) -> Option<Self> {
        let token = header.strip_prefix("Bearer ")?.trim();
        if token.is_empty() {
            return None;
        }
        Some(Self(token.to_owned().into()))
    }

    pub fn digest(&self) -> String {
        digest_token(self.0.expose_secret())
    }

    /// The raw value, for handing to the client exactly once.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

pub fn digest_token(raw: &str) -> String {
    Sha256::digest(raw.as_bytes()).iter().map(|byte| format!("{byte:02x}")).collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token_hash: String,
    pub profile_id: ActorId,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn issue(
        profile_id: ActorId,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> (SessionToken, Self) {
        let token = SessionToken::generate();
        let session =
            Self { token_hash: token.digest(), profile_id, expires_at: now + ttl, created_at: now };
        (token, session)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
