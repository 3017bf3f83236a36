//! Foundational block-storage primitives for `hstore`: the canonical codec
//! (C3), the block adapter contract (C1), and the cascading write-through
//! adapter (C2). See `SPEC_FULL.md` §§1-3.

pub mod adapter;
pub mod cascade;
pub mod codec;
pub mod hash;

pub use adapter::{AdapterError, BlockAdapter, StoredBlock};
pub use cascade::{CascadeAdapter, ConfigError};
pub use codec::{decode_node, encode_node, CanonicalHasher, CodecError, JsonScalar, Node};
pub use hash::{is_reserved_key, Hash, HashFn, RESERVED_HEAD_KEY};
