//! ItemTransform trait - per-item filter applied before posting a batch

use bytes::Bytes;

/// Pure, stateless item transform.
///
/// Returning `None` drops the item from the batch. A dropped item is a
/// filtering outcome, never a batch failure.
pub trait ItemTransform: Send + Sync {
    /// Transform name (used for logging)
    fn name(&self) -> &str;

    fn transform(&self, item: &[u8]) -> Option<Bytes>;
}
