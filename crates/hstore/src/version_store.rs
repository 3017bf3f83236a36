//! Version Store (C5): a schema-validated commit chain over the object
//! store, with a movable head pointer persisted as an ordinary block under a
//! reserved key (spec.md §4.5).

use crate::frozen::FrozenJson;
use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::schema::{Schema, ValidationError};
use hstore_store::{is_reserved_key, AdapterError, BlockAdapter, CanonicalHasher, Hash};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum VersionStoreError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A link in the commit chain (spec.md §3 `VersionBlock`). Field order here
/// is load-bearing: `serde_json` serializes a derived struct in declaration
/// order (unlike `serde_json::Value::Object`, which has no ordering
/// guarantee of its own), so this type's layout *is* the canonical encoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct VersionBlockWire {
    value: String,
    previous: Option<String>,
    timestamp: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VersionBlock {
    pub value: Hash,
    pub previous: Option<Hash>,
    pub timestamp: i64,
}

impl VersionBlock {
    fn encode(&self) -> Vec<u8> {
        let wire = VersionBlockWire {
            value: self.value.as_str().to_owned(),
            previous: self.previous.as_ref().map(|h| h.as_str().to_owned()),
            timestamp: self.timestamp,
        };
        serde_json::to_vec(&wire).expect("VersionBlockWire is always serializable")
    }

    /// Returns `None` for anything that doesn't decode into a well-formed
    /// block — missing fields, wrong-typed fields, or non-JSON bytes all
    /// collapse to the same "malformed" outcome (spec.md concrete scenario
    /// 6), which `get`/`head` turn into `Ok(None)` rather than an error.
    fn decode(bytes: &[u8]) -> Option<VersionBlock> {
        let wire: VersionBlockWire = serde_json::from_slice(bytes).ok()?;
        Some(VersionBlock {
            value: Hash::from(wire.value),
            previous: wire.previous.map(Hash::from),
            timestamp: wire.timestamp,
        })
    }
}

/// The caller-visible snapshot of a single committed version (spec.md §3
/// `StateVersion<T>`).
#[derive(Clone, Debug, PartialEq)]
pub struct StateVersion<T> {
    pub hash: Hash,
    pub value: FrozenJson,
    pub output: T,
    pub previous: Option<Hash>,
    pub timestamp: i64,
}

fn decode_head(bytes: &[u8]) -> Option<Option<Hash>> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    match value.get("head")? {
        serde_json::Value::Null => Some(None),
        serde_json::Value::String(s) => Some(Some(Hash::from(s.clone()))),
        _ => None,
    }
}

fn encode_head(head: Option<&Hash>) -> Vec<u8> {
    let value = serde_json::json!({ "head": head.map(Hash::as_str) });
    serde_json::to_vec(&value).expect("head record is always serializable")
}

struct VersionState {
    head_memo: Option<Hash>,
    /// Dedup cache for step 6 of commit: "if not already present in the
    /// version cache, write." Keyed on the version hash, not the full
    /// decoded block, since membership is all a write needs to check.
    version_cache: HashMap<Hash, ()>,
}

/// `S::Output` is recovered on every `get`/`head` by re-running the schema
/// over the stored JSON view rather than being cached alongside the version
/// block. A validator is expected to be a pure, cheap narrowing function
/// (the same contract spec.md's schema boundary already assumes for
/// `commit`), and persisting only JSON keeps the on-disk format free of any
/// dependency on `S`.
pub struct VersionStore<S: Schema> {
    object_store: ObjectStore,
    adapter: Arc<dyn BlockAdapter>,
    hasher: CanonicalHasher,
    schema: S,
    now_ms: Arc<dyn Fn() -> i64 + Send + Sync>,
    head_key: Hash,
    state: RwLock<VersionState>,
}

impl<S: Schema> VersionStore<S> {
    pub async fn open(
        adapter: Arc<dyn BlockAdapter>,
        hasher: CanonicalHasher,
        schema: S,
        now_ms: Arc<dyn Fn() -> i64 + Send + Sync>,
        head_key: Hash,
        hint_cache_capacity: Option<usize>,
    ) -> Result<Self, VersionStoreError> {
        let head_memo = match adapter.read(&head_key).await? {
            None => {
                tracing::debug!(target: "version_store", "no head record found, initializing to null");
                adapter.write(hstore_store::StoredBlock::new(head_key.clone(), encode_head(None))).await?;
                None
            }
            Some(block) => match decode_head(&block.bytes) {
                Some(head) => head,
                None => {
                    tracing::warn!(target: "version_store", "head record is corrupted, repairing to null");
                    adapter
                        .write(hstore_store::StoredBlock::new(head_key.clone(), encode_head(None)))
                        .await?;
                    None
                }
            },
        };

        let object_store = ObjectStore::new(adapter.clone(), hasher.clone(), hint_cache_capacity);
        Ok(VersionStore {
            object_store,
            adapter,
            hasher,
            schema,
            now_ms,
            head_key,
            state: RwLock::new(VersionState { head_memo, version_cache: HashMap::new() }),
        })
    }

    /// Validates, persists, and links a new value onto the chain (spec.md
    /// §4.5 `commit`'s eight steps).
    pub async fn commit(
        &self,
        value: serde_json::Value,
    ) -> Result<StateVersion<S::Output>, VersionStoreError> {
        let output = self.schema.validate(&value).await?;
        let validated = self.schema.to_json(&output);
        let frozen = FrozenJson::freeze(validated);

        let value_hash = self.object_store.write_frozen(frozen.clone()).await?;

        let previous = self.state.read().head_memo.clone();
        let timestamp = (self.now_ms)();
        let block = VersionBlock { value: value_hash, previous: previous.clone(), timestamp };
        let version_bytes = block.encode();
        let version_hash = self.hasher.hash_bytes(&version_bytes);
        debug_assert!(!is_reserved_key(&version_hash), "a version hashed to the reserved head key");

        let already_cached = self.state.read().version_cache.contains_key(&version_hash);
        if !already_cached {
            self.adapter
                .write(hstore_store::StoredBlock::new(version_hash.clone(), version_bytes))
                .await?;
        }

        self.adapter
            .write(hstore_store::StoredBlock::new(self.head_key.clone(), encode_head(Some(&version_hash))))
            .await?;

        {
            let mut state = self.state.write();
            state.version_cache.insert(version_hash.clone(), ());
            state.head_memo = Some(version_hash.clone());
        }

        tracing::debug!(target: "version_store", %version_hash, ?previous, "commit advanced head");

        Ok(StateVersion { hash: version_hash, value: frozen, output, previous, timestamp })
    }

    /// The currently committed version, or `None` for an empty store.
    pub async fn head(&self) -> Result<Option<StateVersion<S::Output>>, VersionStoreError> {
        let head_memo = self.state.read().head_memo.clone();
        match head_memo {
            None => Ok(None),
            Some(hash) => self.get(&hash).await,
        }
    }

    /// Loads the version at `hash`, or `None` if the block is absent, the
    /// version block is malformed, or the value it references is dangling
    /// (spec.md §4.5 `get`).
    pub async fn get(&self, hash: &Hash) -> Result<Option<StateVersion<S::Output>>, VersionStoreError> {
        let Some(stored) = self.adapter.read(hash).await? else {
            return Ok(None);
        };
        let Some(block) = VersionBlock::decode(&stored.bytes) else {
            tracing::warn!(target: "version_store", %hash, "malformed version block");
            return Ok(None);
        };
        let Some(frozen) = self.object_store.read(&block.value).await? else {
            tracing::warn!(target: "version_store", %hash, value_hash = %block.value, "dangling value reference");
            return Ok(None);
        };
        let output = self.schema.validate(&frozen.to_json()).await?;

        Ok(Some(StateVersion {
            hash: hash.clone(),
            value: frozen,
            output,
            previous: block.previous,
            timestamp: block.timestamp,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hstore_testkit::{sha256_hash_fn, MemoryAdapter, PassthroughSchema};
    use hstore_store::RESERVED_HEAD_KEY;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn clock(start: i64) -> (Arc<dyn Fn() -> i64 + Send + Sync>, Arc<AtomicI64>) {
        let counter = Arc::new(AtomicI64::new(start));
        let handle = counter.clone();
        (Arc::new(move || handle.fetch_add(1, Ordering::SeqCst)), counter)
    }

    async fn open_store(
        adapter: Arc<MemoryAdapter>,
        now_ms: Arc<dyn Fn() -> i64 + Send + Sync>,
    ) -> VersionStore<PassthroughSchema> {
        let hasher = CanonicalHasher::new(sha256_hash_fn());
        VersionStore::open(
            adapter,
            hasher,
            PassthroughSchema,
            now_ms,
            Hash::from(RESERVED_HEAD_KEY),
            None,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn fresh_store_initializes_null_head() {
        let adapter = Arc::new(MemoryAdapter::new());
        let (now_ms, _) = clock(1);
        let store = open_store(adapter.clone(), now_ms).await;
        assert!(store.head().await.unwrap().is_none());
        assert!(adapter.contains(&Hash::from(RESERVED_HEAD_KEY)));
    }

    #[tokio::test]
    async fn commit_advances_head_and_links_previous() {
        let adapter = Arc::new(MemoryAdapter::new());
        let (now_ms, _) = clock(1);
        let store = open_store(adapter, now_ms).await;

        let v1 = store.commit(serde_json::json!({"n": 1})).await.unwrap();
        assert_eq!(v1.previous, None);

        let v2 = store.commit(serde_json::json!({"n": 2})).await.unwrap();
        assert_eq!(v2.previous, Some(v1.hash.clone()));

        let head = store.head().await.unwrap().unwrap();
        assert_eq!(head.hash, v2.hash);
        assert_eq!(head.output, serde_json::json!({"n": 2}));
    }

    #[tokio::test]
    async fn dedup_across_commits_writes_no_new_object_blocks() {
        let adapter = Arc::new(MemoryAdapter::new());
        let (now_ms, _) = clock(1);
        let store = open_store(adapter.clone(), now_ms).await;

        let value = serde_json::json!({"foo": "bar", "nested": {"value": 42}});
        let v1 = store.commit(value.clone()).await.unwrap();
        let count_after_first = adapter.len();
        let v2 = store.commit(value).await.unwrap();

        assert_eq!(v1.hash, v1.hash); // sanity
        assert_ne!(v1.hash, v2.hash, "distinct timestamps produce distinct version blocks");
        assert_eq!(
            store.get(&v1.hash).await.unwrap().unwrap().output,
            store.get(&v2.hash).await.unwrap().unwrap().output
        );
        // Only the new version block + head update should have been added,
        // no new object-store blocks for the (identical) committed value.
        assert_eq!(adapter.len(), count_after_first + 1);
    }

    #[tokio::test]
    async fn head_repair_on_malformed_record() {
        let adapter = Arc::new(MemoryAdapter::new());
        let head_key = Hash::from(RESERVED_HEAD_KEY);
        adapter.seed(head_key.clone(), &br#"{"head":42}"#[..]);

        let (now_ms, _) = clock(1);
        let store = open_store(adapter.clone(), now_ms).await;
        assert!(store.head().await.unwrap().is_none());

        let committed = store.commit(serde_json::json!({"ok": true})).await.unwrap();
        assert_eq!(committed.previous, None);
    }

    #[tokio::test]
    async fn malformed_version_block_returns_none() {
        let adapter = Arc::new(MemoryAdapter::new());
        let (now_ms, _) = clock(1);
        let store = open_store(adapter.clone(), now_ms).await;

        let bad_hash = Hash::from("bad-version");
        adapter.seed(bad_hash.clone(), &br#"{"value":"1"}"#[..]); // missing previous, timestamp

        assert_eq!(store.get(&bad_hash).await.unwrap(), None);
    }

    #[tokio::test]
    async fn dangling_value_reference_returns_none() {
        let adapter = Arc::new(MemoryAdapter::new());
        let (now_ms, _) = clock(1);
        let store = open_store(adapter.clone(), now_ms).await;

        let missing_value = Hash::from("nowhere");
        let block = VersionBlock { value: missing_value, previous: None, timestamp: 1 };
        let version_hash = Hash::from("dangling-version");
        adapter.seed(version_hash.clone(), block.encode());

        assert_eq!(store.get(&version_hash).await.unwrap(), None);
    }

    #[tokio::test]
    async fn colliding_timestamp_and_previous_collapses_version_hash() {
        // Two independent stores committing the same value as their first
        // commit (previous = None) at the same millisecond produce the
        // identical version hash. Resolved as intentional per the open
        // question on timestamp collisions: versions collapse when value,
        // previous, and timestamp all agree.
        let fixed: Arc<dyn Fn() -> i64 + Send + Sync> = Arc::new(|| 1_700_000_000_000i64);

        let store_a = open_store(Arc::new(MemoryAdapter::new()), fixed.clone()).await;
        let store_b = open_store(Arc::new(MemoryAdapter::new()), fixed).await;

        let v1 = store_a.commit(serde_json::json!({"same": true})).await.unwrap();
        let v2 = store_b.commit(serde_json::json!({"same": true})).await.unwrap();
        assert_eq!(v1.hash, v2.hash);
    }
}
