//! Key ordering for engine namespaces

use std::cmp::Ordering;

/// Total order over the raw keys of one namespace.
///
/// A namespace is bound to its comparator for its whole lifetime. The
/// comparator may become usable later than the namespace is opened: until
/// [`KeyComparator::is_ready`] reports true, every operation on the
/// namespace fails with `ComparatorNotReady` instead of ordering keys.
pub trait KeyComparator: Send + Sync {
    /// Stable name, for logs
    fn name(&self) -> &str;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    fn is_ready(&self) -> bool {
        true
    }
}

/// Unsigned lexicographic byte order
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    fn name(&self) -> &str {
        "bytewise"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}
