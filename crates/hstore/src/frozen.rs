//! Immutability Layer (C6): deeply-frozen JSON values returned to callers,
//! with shared value identity across repeated reads (spec.md §4.6).

use std::sync::Arc;

/// An immutable JSON tree. Cloning is an `Arc` clone — O(1), no re-walk —
/// which is what makes `freeze` idempotent on an already-frozen value
/// (spec.md §4.6) and what gives every returned [`crate::StateVersion`] its
/// "deeply frozen through the returned reference" guarantee: there is no
/// method on this type that hands out mutable access to anything nested
/// inside it, so the property is enforced by the type system rather than by
/// a runtime freeze flag.
#[derive(Clone, Debug, PartialEq)]
pub enum FrozenJson {
    Null,
    Bool(bool),
    /// Stored as the canonical `serde_json::Number` so hashing/encoding
    /// agrees bit-for-bit with what the codec produces; equality here is
    /// therefore exactly equality of the canonical JSON literal.
    Number(serde_json::Number),
    String(Arc<str>),
    Array(Arc<[FrozenJson]>),
    /// Entries are stored in their original (post-sort, see
    /// `hstore_store::codec`) order only insofar as the caller provided
    /// them; `FrozenJson` does not itself require any particular ordering —
    /// key-sort canonicalization is the codec's concern, not this type's.
    Object(Arc<[(Arc<str>, FrozenJson)]>),
}

impl FrozenJson {
    /// Freezes a `serde_json::Value` into an immutable tree. Total.
    pub fn freeze(value: serde_json::Value) -> FrozenJson {
        match value {
            serde_json::Value::Null => FrozenJson::Null,
            serde_json::Value::Bool(b) => FrozenJson::Bool(b),
            serde_json::Value::Number(n) => FrozenJson::Number(n),
            serde_json::Value::String(s) => FrozenJson::String(Arc::from(s)),
            serde_json::Value::Array(items) => {
                FrozenJson::Array(items.into_iter().map(FrozenJson::freeze).collect())
            }
            serde_json::Value::Object(map) => FrozenJson::Object(
                map.into_iter().map(|(k, v)| (Arc::from(k), FrozenJson::freeze(v))).collect(),
            ),
        }
    }

    /// Reconstructs a plain, mutable `serde_json::Value` by walking and
    /// cloning the frozen tree.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FrozenJson::Null => serde_json::Value::Null,
            FrozenJson::Bool(b) => serde_json::Value::Bool(*b),
            FrozenJson::Number(n) => serde_json::Value::Number(n.clone()),
            FrozenJson::String(s) => serde_json::Value::String(s.to_string()),
            FrozenJson::Array(items) => {
                serde_json::Value::Array(items.iter().map(FrozenJson::to_json).collect())
            }
            FrozenJson::Object(entries) => serde_json::Value::Object(
                entries.iter().map(|(k, v)| (k.to_string(), v.to_json())).collect(),
            ),
        }
    }

    /// Identity key for the per-call / per-instance composite hint caches
    /// (spec.md §4.4, §9's "weak identity map" note): the address of the
    /// backing allocation. Only meaningful for `Array`/`Object` — scalars
    /// have no shared allocation to key on and use value-based hints
    /// instead (see `ObjectStore`).
    pub fn identity_key(&self) -> Option<usize> {
        match self {
            FrozenJson::Array(items) => Some(Arc::as_ptr(items) as *const () as usize),
            FrozenJson::Object(entries) => Some(Arc::as_ptr(entries) as *const () as usize),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FrozenJson::Null)
    }
}
