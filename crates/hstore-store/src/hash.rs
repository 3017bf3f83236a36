use std::fmt;
use std::sync::Arc;

/// An opaque content hash produced by a caller-supplied [`HashFn`].
///
/// `hstore` is hash-function agnostic: uniqueness and collision-resistance
/// are the caller's responsibility. The string representation
/// is kept rather than a fixed-width byte array so callers can plug in any
/// hash function whose output they choose to render as text (hex, base58,
/// ...) without this crate caring about width.
#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Hash(Arc<str>);

impl Hash {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Hash(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Hash {
    fn from(value: String) -> Self {
        Hash(value.into())
    }
}

impl From<&str> for Hash {
    fn from(value: &str) -> Self {
        Hash(Arc::from(value))
    }
}

/// A pure function `bytes -> Hash`, the only thing this crate requires of a
/// hash function (spec.md §3). May wrap a cryptographic hash, a test stub,
/// anything; `hstore` never inspects the output beyond using it as a map key.
pub type HashFn = Arc<dyn Fn(&[u8]) -> Hash + Send + Sync>;

/// The reserved key under which the head record is stored (spec.md §6.4).
///
/// Not content-derived, so by convention it sits outside any reasonable
/// hash function's image; callers must never persist a user block under it.
pub const RESERVED_HEAD_KEY: &str = "__hstore_head__";

/// Whether `hash` collides with the reserved head key.
///
/// Debug-time defense only (spec.md §3 invariant) — a real hash function is
/// assumed never to produce this value for real content, so this is an
/// assertion aid rather than a runtime-checked invariant.
pub fn is_reserved_key(hash: &Hash) -> bool {
    hash.as_str() == RESERVED_HEAD_KEY
}
