//! Test-only support for `hstore`: an in-memory [`BlockAdapter`] and a
//! `serde_json::Value`-backed [`Schema`] validator.
//!
//! Not a production backend (spec.md §1 keeps those out of scope) — this is
//! the fake needed to exercise the block adapter contract and the version
//! store's schema boundary in unit and integration tests, the way
//! `test-utils/testlib` serves nearcore's `core/store` without shipping in
//! the production RocksDB path.

use async_trait::async_trait;
use hstore::Schema;
use hstore_store::{AdapterError, BlockAdapter, Hash, StoredBlock};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

/// An in-memory, process-local block adapter. Unbounded; intended for tests.
#[derive(Default)]
pub struct MemoryAdapter {
    blocks: Mutex<HashMap<Hash, StoredBlock>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Directly seed a block, bypassing the adapter's own `write` — used to
    /// set up corrupt-block / dangling-reference / malformed-head test
    /// fixtures that a well-behaved caller could never produce honestly.
    pub fn seed(&self, hash: Hash, bytes: impl Into<bytes::Bytes>) {
        let block = StoredBlock::new(hash.clone(), bytes);
        self.blocks.lock().unwrap().insert(hash, block);
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.blocks.lock().unwrap().contains_key(hash)
    }
}

#[async_trait]
impl BlockAdapter for MemoryAdapter {
    async fn read(&self, hash: &Hash) -> Result<Option<StoredBlock>, AdapterError> {
        Ok(self.blocks.lock().unwrap().get(hash).cloned())
    }

    async fn write(&self, block: StoredBlock) -> Result<(), AdapterError> {
        self.blocks.lock().unwrap().insert(block.hash.clone(), block);
        Ok(())
    }

    async fn clear(&self) -> Result<(), AdapterError> {
        self.blocks.lock().unwrap().clear();
        Ok(())
    }
}

/// `bytes -> Hash` using SHA-256 hex, a reasonable stand-in for whatever
/// collision-resistant hash a real deployment would plug in.
pub fn sha256_hash_fn() -> hstore_store::HashFn {
    std::sync::Arc::new(|bytes: &[u8]| {
        let digest = Sha256::digest(bytes);
        Hash::from(hex_encode(&digest))
    })
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").expect("writing to a String never fails");
    }
    out
}

/// A schema that accepts any JSON object and rejects everything else —
/// enough shape-checking to exercise `ValidationError` without pulling in a
/// real JSON Schema engine (spec.md §4.5 only requires *some* validator with
/// `parse`/`parseAsync`).
pub struct ObjectSchema;

#[derive(Debug, thiserror::Error)]
#[error("value must be a JSON object")]
pub struct NotAnObject;

#[async_trait]
impl Schema for ObjectSchema {
    type Output = serde_json::Map<String, serde_json::Value>;

    async fn validate(
        &self,
        value: &serde_json::Value,
    ) -> Result<Self::Output, hstore::ValidationError> {
        match value {
            serde_json::Value::Object(map) => Ok(map.clone()),
            _ => Err(hstore::ValidationError::new(NotAnObject.to_string())),
        }
    }

    fn to_json(&self, output: &Self::Output) -> serde_json::Value {
        serde_json::Value::Object(output.clone())
    }
}

/// A schema that accepts any JSON value unchanged — for tests that only
/// care about the object-store/version-chain machinery, not validation.
pub struct PassthroughSchema;

#[async_trait]
impl Schema for PassthroughSchema {
    type Output = serde_json::Value;

    async fn validate(
        &self,
        value: &serde_json::Value,
    ) -> Result<Self::Output, hstore::ValidationError> {
        Ok(value.clone())
    }

    fn to_json(&self, output: &Self::Output) -> serde_json::Value {
        output.clone()
    }
}
