//! Object Store (C4): projects JSON values onto a DAG of content-addressed
//! blocks and back (spec.md §4.4).

use crate::frozen::FrozenJson;
use futures::future::{try_join_all, BoxFuture};
use hstore_store::{
    decode_node, encode_node, is_reserved_key, BlockAdapter, CanonicalHasher, CodecError, Hash,
    JsonScalar, Node, StoredBlock,
};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error(transparent)]
    Adapter(#[from] hstore_store::AdapterError),
    #[error("corrupt block: {0}")]
    CorruptBlock(#[from] CodecError),
    #[error("JSON numbers must be finite (no NaN/Infinity)")]
    NonFiniteNumber,
}

/// `None` renders as an effectively unbounded cache (`NonZeroUsize::MAX`
/// entries) — matches `StoreConfig::hint_cache_capacity`'s "unbounded by
/// default" semantics without needing a separate bounded/unbounded code path.
fn cache_capacity(capacity: Option<usize>) -> NonZeroUsize {
    match capacity.and_then(NonZeroUsize::new) {
        Some(cap) => cap,
        None => NonZeroUsize::MAX,
    }
}

/// Per-store-instance dedup state (spec.md §4.4), bounded by
/// `StoreConfig::hint_cache_capacity` (SPEC_FULL.md §7). Guarded by
/// `parking_lot` locks rather than relying on a single-threaded cooperative
/// scheduler, since Rust async tasks may in principle be polled from
/// different worker threads even under the logical single-writer contract
/// (spec.md §5).
struct DedupState {
    hash_to_value: LruCache<Hash, FrozenJson>,
    /// Keyed by the canonical encoding of `Node::Primitive(scalar)` — this
    /// both sidesteps `f64`'s lack of `Eq`/`Hash` and guarantees a hint
    /// lookup can never disagree with what the codec would actually hash.
    primitive_hints: LruCache<Vec<u8>, Hash>,
    /// Keyed by the backing-allocation address of a frozen array/object —
    /// the pointer-keyed stand-in for a weak identity map described in
    /// spec.md §9's design notes (option (b): omit if it's awkward, since
    /// it is a pure optimization and correctness does not depend on it).
    object_hints: LruCache<usize, Hash>,
}

impl DedupState {
    fn new(capacity: Option<usize>) -> Self {
        let cap = cache_capacity(capacity);
        DedupState {
            hash_to_value: LruCache::new(cap),
            primitive_hints: LruCache::new(cap),
            object_hints: LruCache::new(cap),
        }
    }
}

/// Per-`write()`-call cache (spec.md §4.4): collapses repeated writes of the
/// same shared subtree within one call into a single lookup once the first
/// occurrence has finished. Cross-sibling concurrent duplicates (two copies
/// of the same subtree resolving in the same `join_all` batch before either
/// has recorded a hash) are not deduplicated against each other — both
/// recurse fully — but this never produces a correctness issue: writing the
/// same hash with the same bytes twice is specified as an idempotent no-op
/// (spec.md §6.1). It only costs a redundant hash computation and adapter
/// write-through, not a wrong answer.
#[derive(Default)]
struct CallCache {
    primitive: parking_lot::Mutex<HashMap<Vec<u8>, Hash>>,
    composite: parking_lot::Mutex<HashMap<usize, Hash>>,
}

pub struct ObjectStore {
    adapter: Arc<dyn BlockAdapter>,
    hasher: CanonicalHasher,
    state: Mutex<DedupState>,
}

impl ObjectStore {
    /// `hint_cache_capacity: None` gives an unbounded hint cache (spec.md §4.4
    /// default); `Some(n)` bounds each dedup cache to `n` entries with LRU
    /// eviction (SPEC_FULL.md §7's `StoreConfig::hint_cache_capacity`).
    pub fn new(
        adapter: Arc<dyn BlockAdapter>,
        hasher: CanonicalHasher,
        hint_cache_capacity: Option<usize>,
    ) -> Self {
        ObjectStore { adapter, hasher, state: Mutex::new(DedupState::new(hint_cache_capacity)) }
    }

    /// Writes a JSON value, returning its root hash (spec.md §4.4 steps 1-6).
    pub async fn write(&self, value: serde_json::Value) -> Result<Hash, ObjectStoreError> {
        self.write_frozen(FrozenJson::freeze(value)).await
    }

    /// Writes an already-frozen value. `FrozenJson::freeze` is idempotent
    /// (an `Arc` clone), so this and [`Self::write`] agree on semantics;
    /// exposed separately so `VersionStore` can recover the frozen snapshot
    /// it already produced without re-freezing.
    pub async fn write_frozen(&self, value: FrozenJson) -> Result<Hash, ObjectStoreError> {
        let call_cache = CallCache::default();
        self.write_inner(value, &call_cache).await
    }

    fn write_inner<'a>(
        &'a self,
        value: FrozenJson,
        call_cache: &'a CallCache,
    ) -> BoxFuture<'a, Result<Hash, ObjectStoreError>> {
        Box::pin(async move {
            if let Some(hash) = self.lookup_hint(&value, call_cache) {
                return Ok(hash);
            }

            let node = match &value {
                FrozenJson::Null => Node::Primitive(JsonScalar::Null),
                FrozenJson::Bool(b) => Node::Primitive(JsonScalar::Bool(*b)),
                FrozenJson::Number(n) => {
                    // serde_json::Number cannot represent NaN/Infinity by
                    // construction, so this is unreachable in practice; kept
                    // as an explicit boundary check per spec.md §9's open
                    // question rather than relying silently on that upstream
                    // invariant.
                    if n.as_f64().is_some_and(|f| !f.is_finite()) {
                        return Err(ObjectStoreError::NonFiniteNumber);
                    }
                    Node::Primitive(JsonScalar::Number(n.clone()))
                }
                FrozenJson::String(s) => Node::Primitive(JsonScalar::String(s.to_string())),
                FrozenJson::Array(items) => {
                    let hashes = try_join_all(
                        items.iter().cloned().map(|child| self.write_inner(child, call_cache)),
                    )
                    .await?;
                    Node::Array(hashes)
                }
                FrozenJson::Object(entries) => {
                    let mut sorted: Vec<(Arc<str>, FrozenJson)> = entries.iter().cloned().collect();
                    sorted.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));
                    let hashes = try_join_all(
                        sorted.iter().map(|(_, v)| self.write_inner(v.clone(), call_cache)),
                    )
                    .await?;
                    let entries = sorted
                        .into_iter()
                        .zip(hashes)
                        .map(|((key, _), hash)| (key.to_string(), hash))
                        .collect();
                    Node::Object(entries)
                }
            };

            let bytes = encode_node(&node);
            let hash = self.hasher.hash_bytes(&bytes);
            debug_assert!(
                !is_reserved_key(&hash),
                "a user value hashed to the reserved head key"
            );

            let already_known = self.state.lock().hash_to_value.contains(&hash);
            if !already_known {
                self.adapter.write(StoredBlock::new(hash.clone(), bytes)).await?;
            }

            self.record(&value, hash.clone(), call_cache);
            Ok(hash)
        })
    }

    fn lookup_hint(&self, value: &FrozenJson, call_cache: &CallCache) -> Option<Hash> {
        if let Some(identity) = value.identity_key() {
            if let Some(hash) = self.state.lock().object_hints.get(&identity) {
                return Some(hash.clone());
            }
            return call_cache.composite.lock().get(&identity).cloned();
        }

        let key = scalar_hint_key(value)?;
        if let Some(hash) = self.state.lock().primitive_hints.get(&key) {
            return Some(hash.clone());
        }
        call_cache.primitive.lock().get(&key).cloned()
    }

    fn record(&self, value: &FrozenJson, hash: Hash, call_cache: &CallCache) {
        let mut state = self.state.lock();
        state.hash_to_value.put(hash.clone(), value.clone());
        if let Some(identity) = value.identity_key() {
            state.object_hints.put(identity, hash.clone());
            call_cache.composite.lock().insert(identity, hash);
        } else if let Some(key) = scalar_hint_key(value) {
            state.primitive_hints.put(key.clone(), hash.clone());
            call_cache.primitive.lock().insert(key, hash);
        }
    }

    /// Reads a value back from its root hash (spec.md §4.4 steps 1-5).
    /// Returns `Ok(None)` for a dangling reference (a missing child hash),
    /// `Err` only for adapter failures or undecodable bytes.
    pub async fn read(&self, hash: &Hash) -> Result<Option<FrozenJson>, ObjectStoreError> {
        self.read_inner(hash.clone()).await
    }

    fn read_inner(&self, hash: Hash) -> BoxFuture<'_, Result<Option<FrozenJson>, ObjectStoreError>> {
        Box::pin(async move {
            if let Some(value) = self.state.lock().hash_to_value.get(&hash).cloned() {
                return Ok(Some(value));
            }

            let Some(block) = self.adapter.read(&hash).await? else {
                return Ok(None);
            };
            let node = decode_node(&block.bytes)?;

            let value = match node {
                Node::Primitive(scalar) => FrozenJson::freeze(scalar_to_json(scalar)),
                Node::Array(children) => {
                    let results = try_join_all(
                        children.into_iter().map(|child| self.read_inner(child)),
                    )
                    .await?;
                    let mut items = Vec::with_capacity(results.len());
                    for result in results {
                        match result {
                            Some(v) => items.push(v),
                            None => return Ok(None), // dangling reference
                        }
                    }
                    FrozenJson::Array(items.into())
                }
                Node::Object(entries) => {
                    let results = try_join_all(
                        entries.iter().map(|(_, h)| self.read_inner(h.clone())),
                    )
                    .await?;
                    let mut out = Vec::with_capacity(results.len());
                    for ((key, _), result) in entries.into_iter().zip(results) {
                        match result {
                            Some(v) => out.push((Arc::<str>::from(key), v)),
                            None => return Ok(None), // dangling reference
                        }
                    }
                    FrozenJson::Object(out.into())
                }
            };

            self.state.lock().hash_to_value.put(hash, value.clone());
            Ok(Some(value))
        })
    }
}

fn scalar_hint_key(value: &FrozenJson) -> Option<Vec<u8>> {
    let scalar = match value {
        FrozenJson::Null => JsonScalar::Null,
        FrozenJson::Bool(b) => JsonScalar::Bool(*b),
        FrozenJson::Number(n) => JsonScalar::Number(n.clone()),
        FrozenJson::String(s) => JsonScalar::String(s.to_string()),
        FrozenJson::Array(_) | FrozenJson::Object(_) => return None,
    };
    Some(encode_node(&Node::Primitive(scalar)))
}

fn scalar_to_json(scalar: JsonScalar) -> serde_json::Value {
    match scalar {
        JsonScalar::Null => serde_json::Value::Null,
        JsonScalar::Bool(b) => serde_json::Value::Bool(b),
        JsonScalar::Number(n) => serde_json::Value::Number(n),
        JsonScalar::String(s) => serde_json::Value::String(s),
    }
}
