//! 凭证模块：密钥仓库访问与 TTL 凭证缓存。
//!
//! # Credentials Module
//!
//! Secrets-store access and the TTL credential cache that keeps billed store
//! lookups off the hot path of every invocation.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CredentialBundle`] | Identity + token + target repository |
//! | [`CredentialStore`] | Trait for secrets-store backends |
//! | [`EnvCredentialStore`] | Payload injected via environment variable |
//! | [`InMemoryCredentialStore`] | Scriptable store for tests |
//! | [`CredentialCache`] | Per-key TTL cache over a store |
//!
//! Entries are valid iff `now - stored_at < ttl`; an invalid entry is
//! replaced on the next get, never read.

mod cache;
mod store;

pub use cache::{CredentialCache, CredentialCacheStats};
pub use store::{
    sample_payload, CredentialBundle, CredentialStore, EnvCredentialStore, InMemoryCredentialStore,
};
