//! Bounded, snapshot-consistent cursors over one namespace
//!
//! An iterator sees the namespace as of its transaction's snapshot, merged
//! with the transaction's own uncommitted writes as they stood when the
//! iterator was created. It starts unpositioned; call one of the seek
//! methods first.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::namespace::{is_empty_range, OrderedKey};
use super::Namespace;
use crate::error::{EngineError, EngineResult};

/// Cursor over a key range of one namespace.
///
/// All methods take `&self`; [`EngineIterator::close`] may be called from
/// another thread while a scan is in progress and is a no-op when repeated.
pub struct EngineIterator {
    state: Mutex<Option<Cursor>>,
}

struct Cursor {
    namespace: Arc<Namespace>,
    snapshot: u64,
    /// Uncommitted writes of the owning transaction (`None` = delete)
    overlay: BTreeMap<OrderedKey, Option<Bytes>>,
    lower: Bound<OrderedKey>,
    upper: Bound<OrderedKey>,
    current: Option<(Bytes, Bytes)>,
}

/// Tighter of two lower bounds
fn max_lower(a: Bound<OrderedKey>, b: Bound<OrderedKey>) -> Bound<OrderedKey> {
    let keep_a = match (&a, &b) {
        (Bound::Unbounded, _) => false,
        (_, Bound::Unbounded) => true,
        (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => match x.cmp(y) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => matches!(a, Bound::Excluded(_)),
        },
    };
    if keep_a {
        a
    } else {
        b
    }
}

/// Tighter of two upper bounds
fn min_upper(a: Bound<OrderedKey>, b: Bound<OrderedKey>) -> Bound<OrderedKey> {
    let keep_a = match (&a, &b) {
        (Bound::Unbounded, _) => false,
        (_, Bound::Unbounded) => true,
        (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => match x.cmp(y) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => matches!(a, Bound::Excluded(_)),
        },
    };
    if keep_a {
        a
    } else {
        b
    }
}

impl Cursor {
    fn bound(&self, bound: Bound<&[u8]>) -> Bound<OrderedKey> {
        match bound {
            Bound::Included(key) => Bound::Included(self.namespace.ordered(Bytes::copy_from_slice(key))),
            Bound::Excluded(key) => Bound::Excluded(self.namespace.ordered(Bytes::copy_from_slice(key))),
            Bound::Unbounded => Bound::Unbounded,
        }
    }

    /// Nearest visible record in the range, from the front or the back
    fn find(
        &self,
        lower: Bound<OrderedKey>,
        upper: Bound<OrderedKey>,
        forward: bool,
    ) -> EngineResult<Option<(Bytes, Bytes)>> {
        self.namespace.ensure_ready()?;
        if is_empty_range(&lower, &upper) {
            return Ok(None);
        }

        let overlay = &self.overlay;
        let committed =
            self.namespace
                .find_visible(&lower, &upper, self.snapshot, forward, |key| overlay.contains_key(key));

        let mut own = overlay
            .range((lower, upper))
            .filter_map(|(key, value)| value.as_ref().map(|value| (key.bytes().clone(), value.clone())));
        let own = if forward { own.next() } else { own.next_back() };

        Ok(match (committed, own) {
            (Some(committed), Some(own)) => {
                let order = self.namespace.comparator().compare(&committed.0, &own.0);
                let committed_first = if forward {
                    order == Ordering::Less
                } else {
                    order == Ordering::Greater
                };
                Some(if committed_first { committed } else { own })
            }
            (committed, own) => committed.or(own),
        })
    }
}

impl EngineIterator {
    pub(crate) fn new(
        namespace: Arc<Namespace>,
        snapshot: u64,
        overlay: BTreeMap<OrderedKey, Option<Bytes>>,
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
    ) -> Self {
        let to_key = |bound: Bound<Vec<u8>>| match bound {
            Bound::Included(key) => Bound::Included(namespace.ordered(Bytes::from(key))),
            Bound::Excluded(key) => Bound::Excluded(namespace.ordered(Bytes::from(key))),
            Bound::Unbounded => Bound::Unbounded,
        };
        let lower = to_key(lower);
        let upper = to_key(upper);

        Self {
            state: Mutex::new(Some(Cursor {
                namespace,
                snapshot,
                overlay,
                lower,
                upper,
                current: None,
            })),
        }
    }

    fn with_cursor<R>(&self, f: impl FnOnce(&mut Cursor) -> EngineResult<R>) -> EngineResult<R> {
        let mut state = self.state.lock();
        let cursor = state.as_mut().ok_or(EngineError::IteratorClosed)?;
        f(cursor)
    }

    /// Position at the first record in range
    pub fn seek_to_first(&self) -> EngineResult<()> {
        self.with_cursor(|c| {
            c.current = c.find(c.lower.clone(), c.upper.clone(), true)?;
            Ok(())
        })
    }

    /// Position at the last record in range
    pub fn seek_to_last(&self) -> EngineResult<()> {
        self.with_cursor(|c| {
            c.current = c.find(c.lower.clone(), c.upper.clone(), false)?;
            Ok(())
        })
    }

    /// Position at the first record at or after (`Included`) or strictly
    /// after (`Excluded`) `target`
    pub fn seek(&self, target: Bound<&[u8]>) -> EngineResult<()> {
        self.with_cursor(|c| {
            let lower = max_lower(c.lower.clone(), c.bound(target));
            c.current = c.find(lower, c.upper.clone(), true)?;
            Ok(())
        })
    }

    /// Position at the last record at or before (`Included`) or strictly
    /// before (`Excluded`) `target`
    pub fn seek_for_prev(&self, target: Bound<&[u8]>) -> EngineResult<()> {
        self.with_cursor(|c| {
            let upper = min_upper(c.upper.clone(), c.bound(target));
            c.current = c.find(c.lower.clone(), upper, false)?;
            Ok(())
        })
    }

    /// Advance; a no-op when not positioned
    pub fn next(&self) -> EngineResult<()> {
        self.with_cursor(|c| {
            let Some(key) = c.current.as_ref().map(|(key, _)| key.clone()) else {
                return Ok(());
            };
            let from = Bound::Excluded(c.namespace.ordered(key));
            c.current = c.find(from, c.upper.clone(), true)?;
            Ok(())
        })
    }

    /// Step back; a no-op when not positioned
    pub fn prev(&self) -> EngineResult<()> {
        self.with_cursor(|c| {
            let Some(key) = c.current.as_ref().map(|(key, _)| key.clone()) else {
                return Ok(());
            };
            let to = Bound::Excluded(c.namespace.ordered(key));
            c.current = c.find(c.lower.clone(), to, false)?;
            Ok(())
        })
    }

    /// Positioned on a record (false once closed)
    pub fn valid(&self) -> bool {
        self.state
            .lock()
            .as_ref()
            .map_or(false, |c| c.current.is_some())
    }

    pub fn key(&self) -> Option<Bytes> {
        self.entry().map(|(key, _)| key)
    }

    pub fn value(&self) -> Option<Bytes> {
        self.entry().map(|(_, value)| value)
    }

    /// Current key and value
    pub fn entry(&self) -> Option<(Bytes, Bytes)> {
        self.state.lock().as_ref().and_then(|c| c.current.clone())
    }

    /// Release the snapshot copy and bounds. Idempotent.
    pub fn close(&self) {
        self.state.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().is_none()
    }
}
