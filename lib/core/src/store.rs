use crate::case::{StoreHit, StoredCase};
use crate::vector::Vector;
use crate::Result;

/// Append-only store of screened applications with nearest-neighbour lookup.
///
/// Implementations are called from the blocking pool, so they may block on
/// I/O. Failures to reach the backing store must surface as
/// [`Error::StoreUnavailable`](crate::Error::StoreUnavailable).
pub trait EmbeddingStore: Send + Sync {
    /// Append a case. A second case with the same merchant_id is rejected.
    fn put(&self, case: StoredCase) -> Result<()>;

    /// Cases with cosine similarity `>= similarity_floor`, ordered by
    /// similarity descending then merchant_id ascending, at most `limit`.
    fn query_nearest(
        &self,
        embedding: &Vector,
        similarity_floor: f32,
        limit: usize,
    ) -> Result<Vec<StoreHit>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
