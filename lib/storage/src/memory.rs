use fraudx_core::{rank_hits, EmbeddingStore, Error, Result, StoreHit, StoredCase, Vector};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::HashMap;

/// Below this many cases a sequential scan beats spinning up the pool
const PARALLEL_SCAN_THRESHOLD: usize = 1_000;

/// In-memory case store with exact cosine search
pub struct MemoryStore {
    dim: usize,
    cases: RwLock<HashMap<String, StoredCase>>,
}

impl MemoryStore {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            cases: RwLock::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn contains(&self, merchant_id: &str) -> bool {
        self.cases.read().contains_key(merchant_id)
    }

    pub fn get(&self, merchant_id: &str) -> Option<StoredCase> {
        self.cases.read().get(merchant_id).cloned()
    }

    /// Check a case without inserting it.
    pub fn validate(&self, case: &StoredCase) -> Result<()> {
        if case.embedding.dim() != self.dim {
            return Err(Error::InvalidDimension {
                expected: self.dim,
                actual: case.embedding.dim(),
            });
        }
        if self.contains(&case.merchant_id) {
            return Err(Error::DuplicateCase(case.merchant_id.clone()));
        }
        Ok(())
    }

    pub fn insert(&self, case: StoredCase) -> Result<()> {
        if case.embedding.dim() != self.dim {
            return Err(Error::InvalidDimension {
                expected: self.dim,
                actual: case.embedding.dim(),
            });
        }

        let mut cases = self.cases.write();
        if cases.contains_key(&case.merchant_id) {
            return Err(Error::DuplicateCase(case.merchant_id));
        }
        cases.insert(case.merchant_id.clone(), case);
        Ok(())
    }

    /// Swap in a whole new set of cases at once.
    ///
    /// Queries see either the old set or the new one, never a mix.
    pub fn replace_all(&self, cases: Vec<StoredCase>) -> Result<()> {
        let mut next = HashMap::with_capacity(cases.len());
        for case in cases {
            if case.embedding.dim() != self.dim {
                return Err(Error::InvalidDimension {
                    expected: self.dim,
                    actual: case.embedding.dim(),
                });
            }
            if next.contains_key(&case.merchant_id) {
                return Err(Error::DuplicateCase(case.merchant_id));
            }
            next.insert(case.merchant_id.clone(), case);
        }
        *self.cases.write() = next;
        Ok(())
    }

    /// All cases ordered by merchant_id
    pub fn cases(&self) -> Vec<StoredCase> {
        let mut cases: Vec<_> = self.cases.read().values().cloned().collect();
        cases.sort_by(|a, b| a.merchant_id.cmp(&b.merchant_id));
        cases
    }
}

impl EmbeddingStore for MemoryStore {
    fn put(&self, case: StoredCase) -> Result<()> {
        self.insert(case)
    }

    fn query_nearest(
        &self,
        embedding: &Vector,
        similarity_floor: f32,
        limit: usize,
    ) -> Result<Vec<StoreHit>> {
        if embedding.dim() != self.dim {
            return Err(Error::InvalidDimension {
                expected: self.dim,
                actual: embedding.dim(),
            });
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let cases = self.cases.read();
        let score = |case: &StoredCase| {
            let similarity = embedding.cosine_similarity(&case.embedding);
            (similarity >= similarity_floor).then(|| StoreHit::from_case(case, similarity))
        };

        let mut hits: Vec<StoreHit> = if cases.len() >= PARALLEL_SCAN_THRESHOLD {
            cases.par_iter().filter_map(|(_, case)| score(case)).collect()
        } else {
            cases.values().filter_map(score).collect()
        };

        rank_hits(&mut hits, limit);
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.cases.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fraudx_core::ApplicationRecord;

    fn case(id: &str, embedding: Vec<f32>) -> StoredCase {
        StoredCase::new(id, Vector::new(embedding), ApplicationRecord::new().with("email", id))
    }

    #[test]
    fn test_query_orders_and_filters() {
        let store = MemoryStore::new(2);
        store.put(case("far", vec![0.0, 1.0])).unwrap();
        store.put(case("b", vec![1.0, 0.0])).unwrap();
        store.put(case("a", vec![2.0, 0.0])).unwrap();
        store.put(case("near", vec![1.0, 0.2])).unwrap();

        let hits = store.query_nearest(&Vector::new(vec![1.0, 0.0]), 0.6, 10).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.merchant_id.as_str()).collect();
        // Equal similarity breaks ties by merchant_id
        assert_eq!(ids, vec!["a", "b", "near"]);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_query_limit() {
        let store = MemoryStore::new(2);
        for i in 0..10 {
            store.put(case(&format!("m{}", i), vec![1.0, i as f32 * 0.01])).unwrap();
        }
        let hits = store.query_nearest(&Vector::new(vec![1.0, 0.0]), 0.0, 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].merchant_id, "m0");
        assert!(store.query_nearest(&Vector::new(vec![1.0, 0.0]), 0.0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_parallel_scan_matches_sequential_order() {
        let store = MemoryStore::new(2);
        for i in 0..(PARALLEL_SCAN_THRESHOLD + 10) {
            store.put(case(&format!("m{:05}", i), vec![1.0, (i % 7) as f32])).unwrap();
        }
        let hits = store.query_nearest(&Vector::new(vec![1.0, 0.0]), 0.99, 5).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.merchant_id.as_str()).collect();
        assert_eq!(ids, vec!["m00000", "m00007", "m00014", "m00021", "m00028"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let store = MemoryStore::new(2);
        store.put(case("m1", vec![1.0, 0.0])).unwrap();
        let err = store.put(case("m1", vec![0.0, 1.0])).unwrap_err();
        assert!(matches!(err, Error::DuplicateCase(ref id) if id == "m1"));
        assert_eq!(store.get("m1").unwrap().embedding.as_slice(), &[1.0, 0.0]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replace_all_is_all_or_nothing() {
        let store = MemoryStore::new(2);
        store.put(case("m1", vec![1.0, 0.0])).unwrap();

        assert!(store
            .replace_all(vec![case("m2", vec![0.0, 1.0]), case("m3", vec![1.0])])
            .is_err());
        assert!(store.contains("m1"));

        store.replace_all(vec![case("m2", vec![0.0, 1.0])]).unwrap();
        assert!(!store.contains("m1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_dimension_checks() {
        let store = MemoryStore::new(2);
        assert!(matches!(
            store.put(case("m1", vec![1.0])),
            Err(Error::InvalidDimension { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            store.query_nearest(&Vector::new(vec![1.0, 0.0, 0.0]), 0.0, 5),
            Err(Error::InvalidDimension { .. })
        ));
        assert!(store.is_empty());
    }
}
