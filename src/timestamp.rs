//! Kernel timestamp records and their nanosecond representation.
//!
//! Linux reports `SO_TIMESTAMPING` data as three `timespec` values:
//!
//! | slot | meaning                                   |
//! |------|-------------------------------------------|
//! | 0    | software timestamp                        |
//! | 1    | legacy transformed hardware (always zero) |
//! | 2    | raw hardware timestamp                    |
//!
//! An entry of all zeroes means the kernel did not provide that timestamp.

use crate::modes::TimestampDomain;

/// Number of nanoseconds in one second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Number of entries in a timestamp triple.
pub const TRIPLE_LEN: usize = 3;

/// Slot holding the software timestamp.
pub const SOFTWARE_SLOT: usize = 0;
/// Slot reserved by the kernel; never populated here.
pub const RESERVED_SLOT: usize = 1;
/// Slot holding the raw hardware timestamp.
pub const HARDWARE_SLOT: usize = 2;

/// A single (seconds, nanoseconds) timestamp as reported by the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawTimestamp {
    /// Whole seconds.
    pub seconds: i64,
    /// Nanoseconds within the second (0..1_000_000_000).
    pub nanoseconds: i64,
}

impl RawTimestamp {
    /// Creates a timestamp from its components.
    pub const fn new(seconds: i64, nanoseconds: i64) -> Self {
        Self {
            seconds,
            nanoseconds,
        }
    }

    /// Returns true when the kernel did not fill this entry.
    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.nanoseconds == 0
    }

    /// Converts the timestamp to a single nanosecond count.
    ///
    /// Computes `seconds * 1_000_000_000 + nanoseconds` in unsigned 64-bit
    /// arithmetic, which covers roughly 584 years from the epoch.
    ///
    /// ```
    /// use kstamp::timestamp::RawTimestamp;
    /// let ts = RawTimestamp::new(1_700_000_000, 123_456_789);
    /// assert_eq!(ts.as_nanos(), 1_700_000_000_123_456_789);
    /// ```
    pub fn as_nanos(&self) -> u64 {
        (self.seconds as u64)
            .wrapping_mul(NANOS_PER_SEC)
            .wrapping_add(self.nanoseconds as u64)
    }
}

/// The three timestamps carried by one `SCM_TIMESTAMPING` record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimestampTriple {
    pub entries: [RawTimestamp; TRIPLE_LEN],
}

impl TimestampTriple {
    /// Builds a triple from the software and hardware entries; the reserved
    /// middle slot is left zero.
    pub fn new(software: RawTimestamp, hardware: RawTimestamp) -> Self {
        let mut entries = [RawTimestamp::default(); TRIPLE_LEN];
        entries[SOFTWARE_SLOT] = software;
        entries[HARDWARE_SLOT] = hardware;
        Self { entries }
    }

    /// Software timestamp entry (slot 0).
    pub fn software(&self) -> RawTimestamp {
        self.entries[SOFTWARE_SLOT]
    }

    /// Hardware timestamp entry (slot 2).
    pub fn hardware(&self) -> RawTimestamp {
        self.entries[HARDWARE_SLOT]
    }

    /// Returns the entry belonging to the given clock domain.
    pub fn get(&self, domain: TimestampDomain) -> RawTimestamp {
        match domain {
            TimestampDomain::Software => self.software(),
            TimestampDomain::Hardware => self.hardware(),
        }
    }

    /// Nanosecond value of the entry belonging to the given clock domain.
    pub fn nanos(&self, domain: TimestampDomain) -> u64 {
        self.get(domain).as_nanos()
    }

    /// Returns true when no entry is populated.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(RawTimestamp::is_zero)
    }

    /// Fills the entries still zero in `self` from `other`.
    ///
    /// Populated entries are never overwritten, so a notification carrying
    /// only one domain cannot clear the other.
    pub fn merge(&mut self, other: &TimestampTriple) {
        for (mine, theirs) in self.entries.iter_mut().zip(other.entries.iter()) {
            if mine.is_zero() {
                *mine = *theirs;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_nanos_epoch_range() {
        let ts = RawTimestamp::new(1_700_000_000, 123_456_789);
        assert_eq!(ts.as_nanos(), 1_700_000_000_123_456_789);
    }

    #[test]
    fn test_as_nanos_small_values() {
        assert_eq!(RawTimestamp::new(0, 0).as_nanos(), 0);
        assert_eq!(RawTimestamp::new(0, 999_999_999).as_nanos(), 999_999_999);
        assert_eq!(RawTimestamp::new(1, 0).as_nanos(), NANOS_PER_SEC);
    }

    #[test]
    fn test_as_nanos_far_future_does_not_overflow() {
        // Year ~2500
        let ts = RawTimestamp::new(16_725_225_600, 999_999_999);
        assert_eq!(ts.as_nanos(), 16_725_225_600_999_999_999);
    }

    #[test]
    fn test_default_triple_is_zero() {
        let triple = TimestampTriple::default();
        assert!(triple.is_empty());
        assert_eq!(triple.nanos(TimestampDomain::Software), 0);
        assert_eq!(triple.nanos(TimestampDomain::Hardware), 0);
    }

    #[test]
    fn test_new_leaves_reserved_slot_zero() {
        let triple = TimestampTriple::new(RawTimestamp::new(1, 2), RawTimestamp::new(3, 4));
        assert!(triple.entries[RESERVED_SLOT].is_zero());
        assert_eq!(triple.software(), RawTimestamp::new(1, 2));
        assert_eq!(triple.hardware(), RawTimestamp::new(3, 4));
        assert!(!triple.is_empty());
    }

    #[test]
    fn test_merge_keeps_both_domains() {
        let mut triple = TimestampTriple::new(RawTimestamp::new(10, 1), RawTimestamp::default());
        triple.merge(&TimestampTriple::new(
            RawTimestamp::default(),
            RawTimestamp::new(10, 2),
        ));
        assert_eq!(triple.software(), RawTimestamp::new(10, 1));
        assert_eq!(triple.hardware(), RawTimestamp::new(10, 2));

        // A later software-only entry does not replace the first one.
        triple.merge(&TimestampTriple::new(RawTimestamp::new(99, 9), RawTimestamp::default()));
        assert_eq!(triple.software(), RawTimestamp::new(10, 1));
    }

    #[test]
    fn test_domain_selection() {
        let triple = TimestampTriple::new(RawTimestamp::new(0, 1000), RawTimestamp::new(0, 2000));
        assert_eq!(triple.nanos(TimestampDomain::Software), 1000);
        assert_eq!(triple.nanos(TimestampDomain::Hardware), 2000);
    }
}
