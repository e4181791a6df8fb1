use std::fmt;

use serde::{Deserialize, Serialize};

/// Creation timestamp of a consumption record (`createdAt`).
///
/// A wall-clock millisecond component plus a logical counter, so two records
/// created within the same millisecond still have a strict order. Used only
/// to order records and resolve the "latest" record of a period; it is never
/// a substitute for the record's calendar date.
///
/// Ordering: `physical_ms` → `logical`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CreationStamp {
    /// Wall-clock milliseconds since UNIX epoch.
    pub physical_ms: u64,
    /// Logical counter for records created at the same physical time.
    pub logical: u32,
}

impl CreationStamp {
    pub fn new(physical_ms: u64, logical: u32) -> Self {
        Self {
            physical_ms,
            logical,
        }
    }

    /// The smallest stamp strictly greater than `self` at the same
    /// physical time.
    pub fn successor(&self) -> Self {
        match self.logical.checked_add(1) {
            Some(logical) => Self::new(self.physical_ms, logical),
            None => Self::new(self.physical_ms + 1, 0),
        }
    }
}

impl PartialOrd for CreationStamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CreationStamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.physical_ms
            .cmp(&other.physical_ms)
            .then(self.logical.cmp(&other.logical))
    }
}

impl fmt::Debug for CreationStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CreationStamp({}ms.{})", self.physical_ms, self.logical)
    }
}

impl fmt::Display for CreationStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.physical_ms, self.logical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_physical_first() {
        assert!(CreationStamp::new(100, 5) < CreationStamp::new(200, 0));
    }

    #[test]
    fn ordering_logical_second() {
        assert!(CreationStamp::new(100, 1) < CreationStamp::new(100, 2));
    }

    #[test]
    fn successor_is_strictly_after() {
        let s = CreationStamp::new(100, 3);
        assert!(s.successor() > s);
        let saturated = CreationStamp::new(100, u32::MAX);
        assert_eq!(saturated.successor(), CreationStamp::new(101, 0));
    }
}
