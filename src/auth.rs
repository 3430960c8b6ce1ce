// ABOUTME: Shared-secret check against a bcrypt hash
// ABOUTME: Also carries the server connection summary shown to authenticated clients

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

use crate::config::DatabaseConfig;

/// Default bcrypt cost for `hash-secret`
pub const DEFAULT_HASH_COST: u32 = bcrypt::DEFAULT_COST;

/// The configured bcrypt hash of the panel secret
#[derive(Clone)]
pub struct Credential {
    hash: Arc<str>,
}

impl Credential {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: Arc::from(hash.into()),
        }
    }

    /// Check a presented secret
    ///
    /// bcrypt is deliberately slow, so the check runs on the blocking pool.
    /// An empty secret, a malformed configured hash or a failed task all
    /// count as a mismatch.
    pub async fn verify(&self, secret: &str) -> bool {
        if secret.is_empty() {
            return false;
        }

        let hash = self.hash.clone();
        let secret = secret.to_string();
        match tokio::task::spawn_blocking(move || bcrypt::verify(secret, &hash)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                tracing::error!("Configured secret hash is unusable: {}", e);
                false
            }
            Err(e) => {
                tracing::error!("Secret verification task failed: {}", e);
                false
            }
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Hash a secret for the `secret_hash` setting
pub fn hash_secret(secret: &str, cost: u32) -> Result<String> {
    bcrypt::hash(secret, cost).context("Failed to hash secret")
}

/// Connection summary returned alongside authentication and database listings
///
/// The dashboard displays these values so an operator can copy them into a
/// client; they are only sent to authenticated callers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServerInfo {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl From<&DatabaseConfig> for ServerInfo {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            host: config.host.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}
