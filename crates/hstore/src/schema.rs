//! The schema boundary referenced by the Version Store (spec.md §4.5): an
//! external validator that narrows arbitrary JSON to a typed `Output` before
//! it is ever persisted.

use async_trait::async_trait;

/// Error surfaced when a schema rejects a value on commit (spec.md §7
/// `ValidationError` row). Carries whatever detail the validator chooses to
/// stringify; the core never inspects the contents, only propagates them.
#[derive(Debug, Clone, thiserror::Error)]
#[error("validation failed: {0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        ValidationError(message.into())
    }
}

/// The schema contract a caller plugs into [`crate::create_store`].
///
/// Rust has no ambient sync-or-async duck typing the way spec.md's
/// `parse`/`parseAsync` does, so this trait is simply always async — a
/// synchronous validator just returns an already-resolved future, which
/// `async fn` makes free to write.
#[async_trait]
pub trait Schema: Send + Sync {
    /// The validated, typed view of a committed value.
    type Output: Clone + Send + Sync;

    /// Validates `value`, producing a typed `Output` or a `ValidationError`.
    async fn validate(&self, value: &serde_json::Value) -> Result<Self::Output, ValidationError>;

    /// Recovers the JSON-shaped view of a validated output — what actually
    /// gets persisted via the object store, since `ObjectStore` only ever
    /// speaks JSON, not arbitrary Rust types.
    fn to_json(&self, output: &Self::Output) -> serde_json::Value;
}
