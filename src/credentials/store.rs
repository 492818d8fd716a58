//! Credential store collaborator and bundle types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::{Error, Result};

/// The fields needed to authenticate and address the source-control push.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBundle {
    pub user_email: String,
    pub user_name: String,
    pub token: String,
    pub repository_url: String,
}

// Manual Debug so the token never lands in logs.
impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("user_email", &self.user_email)
            .field("user_name", &self.user_name)
            .field("token", &"<redacted>")
            .field("repository_url", &self.repository_url)
            .finish()
    }
}

/// External secrets-store collaborator.
///
/// Returns the raw secret payload; field validation happens in the
/// credential cache so every store implementation gets the same checks.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<serde_json::Value>;
    fn name(&self) -> &'static str;
}

/// Store backed by an environment variable holding the secret JSON payload.
///
/// Stand-in for a managed secrets service in deployments where the platform
/// injects secrets through the environment.
pub struct EnvCredentialStore {
    env_var: String,
}

impl EnvCredentialStore {
    pub fn new(env_var: impl Into<String>) -> Self {
        Self {
            env_var: env_var.into(),
        }
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn fetch(&self, key: &str) -> Result<serde_json::Value> {
        let raw = std::env::var(&self.env_var).map_err(|_| {
            Error::transient(format!(
                "secret payload not present in env var '{}' (key '{key}')",
                self.env_var
            ))
        })?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        Ok(value)
    }

    fn name(&self) -> &'static str {
        "env"
    }
}

/// In-memory store for tests: scriptable payloads per key plus a fetch
/// counter, so cache tests can assert exactly how many store calls happened.
pub struct InMemoryCredentialStore {
    payloads: RwLock<HashMap<String, serde_json::Value>>,
    fail_next: RwLock<Option<String>>,
    fetches: AtomicU64,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            payloads: RwLock::new(HashMap::new()),
            fail_next: RwLock::new(None),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn insert(&self, key: impl Into<String>, payload: serde_json::Value) {
        self.payloads.write().unwrap().insert(key.into(), payload);
    }

    /// Make the next fetch fail with a transient error carrying `message`.
    pub fn fail_next_fetch(&self, message: impl Into<String>) {
        *self.fail_next.write().unwrap() = Some(message.into());
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn fetch(&self, key: &str) -> Result<serde_json::Value> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if let Some(msg) = self.fail_next.write().unwrap().take() {
            return Err(Error::transient(msg));
        }
        self.payloads
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::invalid_request(format!("unknown credential key '{key}'")))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// A complete payload for tests.
pub fn sample_payload() -> serde_json::Value {
    serde_json::json!({
        "userEmail": "bot@example.com",
        "userName": "automation-bot",
        "token": "gh_testtoken",
        "repositoryUrl": "https://example.com/org/repo.git",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_fetch_and_count() {
        let store = InMemoryCredentialStore::new();
        store.insert("deploy", sample_payload());

        let payload = store.fetch("deploy").await.unwrap();
        assert_eq!(payload["userName"], "automation-bot");
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_store_unknown_key() {
        let store = InMemoryCredentialStore::new();
        let err = store.fetch("missing").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_in_memory_store_scripted_failure() {
        let store = InMemoryCredentialStore::new();
        store.insert("deploy", sample_payload());
        store.fail_next_fetch("throttled");

        assert!(store.fetch("deploy").await.is_err());
        // Failure script is one-shot.
        assert!(store.fetch("deploy").await.is_ok());
        assert_eq!(store.fetch_count(), 2);
    }

    #[test]
    fn test_bundle_debug_redacts_token() {
        let bundle = CredentialBundle {
            user_email: "bot@example.com".into(),
            user_name: "bot".into(),
            token: "supersecret".into(),
            repository_url: "https://example.com/r.git".into(),
        };
        let rendered = format!("{bundle:?}");
        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_bundle_deserializes_camel_case() {
        let bundle: CredentialBundle = serde_json::from_value(sample_payload()).unwrap();
        assert_eq!(bundle.user_email, "bot@example.com");
        assert_eq!(bundle.repository_url, "https://example.com/org/repo.git");
    }
}
