//! Block Adapter Contract (C1): what any block-storage backend must honor.
//! Backends themselves are out of scope (spec.md §1) — only the contract is
//! specified here, plus the shared [`StoredBlock`] record.

use crate::hash::Hash;
use async_trait::async_trait;
use bytes::Bytes;

/// The adapter-level record: a hash plus its opaque canonical bytes
/// (spec.md §3). Cloning is O(1) — `Bytes` is refcounted and never aliases
/// a caller-mutable buffer, which is how the "defensive copy" invariant of
/// §4.2/§4.6 is upheld without an actual per-clone memcpy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBlock {
    pub hash: Hash,
    pub bytes: Bytes,
}

impl StoredBlock {
    pub fn new(hash: Hash, bytes: impl Into<Bytes>) -> Self {
        StoredBlock { hash, bytes: bytes.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("adapter I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("adapter error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Every backend — in-memory map, on-disk LSM, remote key-value, or a
/// cascade of other adapters — satisfies this contract (spec.md §6.1).
///
/// `read`/`write` must treat `bytes` as opaque: no UTF-8 or JSON assumption
/// is allowed at this layer (that belongs to the codec, one layer up).
#[async_trait]
pub trait BlockAdapter: Send + Sync {
    /// Returns exactly the bytes previously written under `hash`, or
    /// `None` if nothing is stored there. Never transforms the bytes.
    async fn read(&self, hash: &Hash) -> Result<Option<StoredBlock>, AdapterError>;

    /// Stores `block.bytes` under `block.hash`. Idempotent: writing the
    /// same hash with the same bytes twice is a no-op semantically. Writing
    /// the same hash with different bytes is undefined behavior from the
    /// adapter's point of view — callers must never produce that (the hash
    /// function is assumed collision-free in practice).
    async fn write(&self, block: StoredBlock) -> Result<(), AdapterError>;

    /// Optional lifecycle hook. The core never calls this.
    async fn close(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Optional lifecycle hook. The core never calls this.
    async fn clear(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}
