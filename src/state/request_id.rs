use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out per-request UUIDs without touching the OS RNG on the hot path.
///
/// A random 128-bit seed is drawn once; each id is the seed mixed with a
/// monotonically increasing sequence number, so ids are unique for the
/// lifetime of the process.
pub(crate) struct RequestIds {
    seed: u128,
    sequence: AtomicU64,
}

impl RequestIds {
    #[must_use]
    pub(crate) fn new() -> Self {
        let high = u128::from(fastrand::u64(..));
        let low = u128::from(fastrand::u64(..));
        Self {
            seed: (high << 64) | low,
            sequence: AtomicU64::new(1),
        }
    }

    pub(crate) fn next(&self) -> uuid::Uuid {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        uuid::Uuid::from_u128(self.seed ^ u128::from(sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::RequestIds;

    #[test]
    fn test_ids_are_distinct() {
        let ids = RequestIds::new();
        let first = ids.next();
        let second = ids.next();
        assert_ne!(first, second);
    }
}
