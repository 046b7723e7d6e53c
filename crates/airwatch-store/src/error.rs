//! Error types for the event store.

/// Errors raised when constructing an [`EventStore`](crate::EventStore).
///
/// Admission and queries are infallible once the store exists; duplicates
/// are reported through the `insert` return value, not as errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The admission broadcast needs room for at least one message.
    #[error("admission broadcast capacity must be at least 1")]
    ZeroCapacity,
}
