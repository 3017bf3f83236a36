//! `hstore`: a content-addressable, schema-validated JSON store built over a
//! caller-supplied hash function and block adapter.
//!
//! This crate composes the object store (C4, structural DAG projection of
//! JSON values) and the version store (C5, a schema-validated commit chain
//! with a movable head) behind a single [`Store`] facade, the way the
//! teacher's `nearcore::NodeStorage`/`Store` split construction concerns
//! from the type client code actually calls `get`/`set` on.

pub mod frozen;
pub mod object_store;
pub mod schema;
pub mod version_store;

pub use frozen::FrozenJson;
pub use object_store::{ObjectStore, ObjectStoreError};
pub use schema::{Schema, ValidationError};
pub use version_store::{StateVersion, VersionStore, VersionStoreError};

use hstore_store::{BlockAdapter, CanonicalHasher, Hash, HashFn, RESERVED_HEAD_KEY};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// The handful of knobs this system actually has (spec.md §6.3/§6.4).
/// Deliberately small: the tuning that would matter for a real backend
/// (cache sizing, compaction, column families) belongs to the adapter the
/// caller plugs in, not to this crate — there is no RocksDB-style `StoreConfig`
/// to carry here because backends are explicitly out of scope (spec.md §1).
#[derive(Clone, Debug, Default)]
pub struct StoreConfig {
    /// Overrides the reserved key the head record is stored under. Only
    /// useful for keeping multiple independent chains on one adapter;
    /// defaults to [`RESERVED_HEAD_KEY`].
    pub head_key: Option<String>,
    /// Bounds each of the object store's dedup hint caches
    /// (`hash_to_value`/`primitive_hints`/`object_hints`, spec.md §4.4) to
    /// this many entries, evicting least-recently-used past that. `None`
    /// (the default) leaves the caches unbounded, matching spec.md's
    /// "live for the lifetime of a store instance" description — this knob
    /// exists only to bound memory for long-lived stores over large,
    /// slowly-churning state trees.
    pub hint_cache_capacity: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    VersionStore(#[from] VersionStoreError),
}

/// Builds a store over `adapter`, hashing blocks with `hash_fn` and
/// validating commits with `schema`. Async because construction performs
/// the head-record probe (spec.md §4.5 Initialization).
pub async fn create_store<S: Schema>(
    adapter: Arc<dyn BlockAdapter>,
    hash_fn: HashFn,
    schema: S,
    config: StoreConfig,
) -> Result<Store<S>, StoreError> {
    let hasher = CanonicalHasher::new(hash_fn);
    let head_key = Hash::from(config.head_key.unwrap_or_else(|| RESERVED_HEAD_KEY.to_string()));
    let now_ms: Arc<dyn Fn() -> i64 + Send + Sync> = Arc::new(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_millis() as i64
    });

    let versions =
        VersionStore::open(adapter, hasher, schema, now_ms, head_key, config.hint_cache_capacity)
            .await?;
    Ok(Store { versions })
}

/// The public handle client code actually calls `commit`/`head`/`get` on
/// (spec.md §6.3). `ObjectStore` and `VersionStore` stay private
/// implementation detail behind it.
pub struct Store<S: Schema> {
    versions: VersionStore<S>,
}

impl<S: Schema> Store<S> {
    /// Validates, persists, and links `value` onto the chain, advancing the
    /// head (spec.md §4.5 `commit`).
    pub async fn commit(&self, value: serde_json::Value) -> Result<StateVersion<S::Output>, StoreError> {
        Ok(self.versions.commit(value).await?)
    }

    /// The current head version, or `None` for an empty store.
    pub async fn head(&self) -> Result<Option<StateVersion<S::Output>>, StoreError> {
        Ok(self.versions.head().await?)
    }

    /// Loads the version identified by `hash`, or `None` if it cannot be
    /// resolved (absent, malformed, or a dangling value reference).
    pub async fn get(&self, hash: &Hash) -> Result<Option<StateVersion<S::Output>>, StoreError> {
        Ok(self.versions.get(hash).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hstore_testkit::{sha256_hash_fn, MemoryAdapter, PassthroughSchema};

    #[tokio::test]
    async fn create_store_then_commit_and_read_back() {
        let adapter = Arc::new(MemoryAdapter::new());
        let store = create_store(adapter, sha256_hash_fn(), PassthroughSchema, StoreConfig::default())
            .await
            .unwrap();

        assert!(store.head().await.unwrap().is_none());

        let committed = store.commit(serde_json::json!({"hello": "world"})).await.unwrap();
        let head = store.head().await.unwrap().unwrap();
        assert_eq!(head.hash, committed.hash);
        assert_eq!(head.output, serde_json::json!({"hello": "world"}));

        let fetched = store.get(&committed.hash).await.unwrap().unwrap();
        assert_eq!(fetched.output, committed.output);
    }

    #[tokio::test]
    async fn custom_head_key_is_respected() {
        let adapter = Arc::new(MemoryAdapter::new());
        let config =
            StoreConfig { head_key: Some("my-chain-head".to_string()), ..Default::default() };
        let store = create_store(adapter.clone(), sha256_hash_fn(), PassthroughSchema, config)
            .await
            .unwrap();
        store.commit(serde_json::json!(1)).await.unwrap();
        assert!(adapter.contains(&Hash::from("my-chain-head")));
        assert!(!adapter.contains(&Hash::from(RESERVED_HEAD_KEY)));
    }

    #[tokio::test]
    async fn bounded_hint_cache_capacity_does_not_break_commits() {
        let adapter = Arc::new(MemoryAdapter::new());
        let config = StoreConfig { hint_cache_capacity: Some(1), ..Default::default() };
        let store = create_store(adapter, sha256_hash_fn(), PassthroughSchema, config)
            .await
            .unwrap();

        let v1 = store.commit(serde_json::json!({"n": 1})).await.unwrap();
        let v2 = store.commit(serde_json::json!({"n": 2})).await.unwrap();
        let v3 = store.commit(serde_json::json!({"n": 1})).await.unwrap();

        assert_ne!(v1.hash, v2.hash);
        assert_eq!(
            store.get(&v1.hash).await.unwrap().unwrap().output,
            store.get(&v3.hash).await.unwrap().unwrap().output
        );
    }
}
