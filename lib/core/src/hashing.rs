//! Stable hashing for feature encoding.
//!
//! Every stored embedding depends on these functions producing the same
//! output forever. They are part of the pipeline version: changing them
//! requires bumping it and re-fitting.

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// FNV-1a, 64-bit
#[inline]
pub fn fnv1a_hash(data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Bucket of `text` in `[0, buckets)`.
#[inline]
pub fn bucket(text: &str, buckets: u64) -> u64 {
    debug_assert!(buckets > 0);
    fnv1a_hash(text.as_bytes()) % buckets
}
