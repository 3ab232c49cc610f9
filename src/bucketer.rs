//! Deterministic mapping of bucketing keys into traffic allocation slots.
use std::io::Cursor;

use crate::{entities::Range, Str};

/// Total number of buckets. Traffic allocations partition `[0, MAX_TRAFFIC_VALUE)`.
pub const MAX_TRAFFIC_VALUE: u32 = 10_000;

const HASH_SEED: u32 = 1;

/// MurmurHash3 (x86, 32-bit) of `input` with the bucketing seed.
pub fn hash(input: impl AsRef<[u8]>) -> u32 {
    murmur3::murmur3_32(&mut Cursor::new(input.as_ref()), HASH_SEED)
        .expect("reading from an in-memory buffer should never fail")
}

/// Scale a 32-bit hash into `[0, MAX_TRAFFIC_VALUE)`.
///
/// The ratio is computed in `f64` which represents every `u32` exactly, so the result never
/// rounds up to `MAX_TRAFFIC_VALUE`.
pub fn scale_hash(hash: u32) -> u32 {
    let ratio = f64::from(hash) / (f64::from(u32::MAX) + 1.0);
    (ratio * f64::from(MAX_TRAFFIC_VALUE)).floor() as u32
}

/// Compute bucket value for the bucketing key.
pub fn bucket_value(key: &str) -> u32 {
    scale_hash(hash(key))
}

/// Find the slot containing `bucket`. Returns `None` for unallocated traffic.
pub fn entity_for_bucket(bucket: u32, ranges: &[Range]) -> Option<&Str> {
    ranges
        .iter()
        .find(|range| bucket < range.end_of_range)
        .map(|range| &range.entity_id)
        .filter(|entity_id| !entity_id.is_empty())
}

/// Bucket `key` into `ranges`.
pub fn bucket_to_entity<'a>(key: &str, ranges: &'a [Range]) -> Option<&'a Str> {
    let bucket = bucket_value(key);
    log::trace!(target: "optimizely", key, bucket; "assigned bucket");
    entity_for_bucket(bucket, ranges)
}
