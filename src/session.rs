use std::sync::atomic::{AtomicU64, Ordering};

/// Per-role exchange bookkeeping.
///
/// The counter is the only state that survives from one exchange to the
/// next and is used for display only.
pub struct Session {
    exchanges: AtomicU64,
}

impl Session {
    pub fn new() -> Session {
        Session {
            exchanges: AtomicU64::new(0),
        }
    }

    /// Counts a completed exchange and returns its 1-based number.
    pub fn next_exchange(&self) -> u64 {
        self.exchanges.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of exchanges completed so far.
    pub fn exchanges(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_counter_starts_at_one() {
        let sess = Session::new();
        assert_eq!(sess.exchanges(), 0);
        assert_eq!(sess.next_exchange(), 1);
        assert_eq!(sess.next_exchange(), 2);
        assert_eq!(sess.exchanges(), 2);
    }
}
