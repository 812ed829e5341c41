//! Lazy iteration over logical records

use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;

use crate::engine::EngineIterator;
use crate::error::{HgError, Result};

/// Turns an engine record (key, value) into an item
pub(crate) type Extract<T> = Arc<dyn Fn(&[u8], &[u8]) -> Result<T> + Send + Sync>;

/// Maps an engine key to the bound used to step over all records sharing
/// its logical key
pub(crate) type EdgeFn = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync>;

/// Skips to the next/previous distinct logical key instead of the next
/// record
#[derive(Clone)]
pub(crate) struct DistinctKeys {
    /// Engine key -> last edge of its logical key
    pub(crate) past: EdgeFn,
    /// Engine key -> first edge of its logical key
    pub(crate) before: EdgeFn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unstarted,
    Active,
    Exhausted,
}

/// Lazy, finite sequence of items read from one engine iterator.
///
/// Items are produced on demand; once exhausted (or closed) the sequence
/// stays empty. The engine iterator is released by [`ValueIterator::close`]
/// or when the sequence is dropped.
pub struct ValueIterator<T> {
    cursor: EngineIterator,
    namespace: String,
    extract: Extract<T>,
    distinct: Option<DistinctKeys>,
    /// Logical bytes of an item -> engine key to seek to
    locate: Option<EdgeFn>,
    state: State,
}

impl<T: 'static> ValueIterator<T> {
    pub(crate) fn new(cursor: EngineIterator, namespace: impl Into<String>, extract: Extract<T>) -> Self {
        Self {
            cursor,
            namespace: namespace.into(),
            extract,
            distinct: None,
            locate: None,
            state: State::Unstarted,
        }
    }

    pub(crate) fn distinct(mut self, distinct: DistinctKeys) -> Self {
        self.distinct = Some(distinct);
        self
    }

    pub(crate) fn locate(mut self, locate: EdgeFn) -> Self {
        self.locate = Some(locate);
        self
    }

    /// Convert every item with `f`
    pub fn map_with<U: 'static>(self, f: impl Fn(T) -> Result<U> + Send + Sync + 'static) -> ValueIterator<U> {
        let extract = self.extract;
        ValueIterator {
            cursor: self.cursor,
            namespace: self.namespace,
            extract: Arc::new(move |key: &[u8], value: &[u8]| extract(key, value).and_then(&f)),
            distinct: self.distinct,
            locate: self.locate,
            state: self.state,
        }
    }

    /// Release the engine iterator. Safe to call repeatedly, and while
    /// another thread is consuming.
    pub fn close(&self) {
        self.cursor.close();
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }

    fn engine_err(&self) -> impl FnOnce(crate::error::EngineError) -> HgError + '_ {
        move |source| HgError::engine(format!("iterating {}", self.namespace), source)
    }

    // -------------------------------------------------------------------------
    // Positioning (shared with ResultSet)
    // -------------------------------------------------------------------------

    pub(crate) fn to_first(&mut self) -> Result<()> {
        self.cursor.seek_to_first().map_err(self.engine_err())?;
        self.state = State::Active;
        Ok(())
    }

    pub(crate) fn to_last(&mut self) -> Result<()> {
        self.cursor.seek_to_last().map_err(self.engine_err())?;
        self.state = State::Active;
        Ok(())
    }

    pub(crate) fn advance(&mut self) -> Result<()> {
        match (&self.distinct, self.cursor.key()) {
            (Some(distinct), Some(key)) => {
                let edge = (distinct.past)(&key[..])?;
                self.cursor.seek(Bound::Excluded(edge.as_slice())).map_err(self.engine_err())
            }
            _ => self.cursor.next().map_err(self.engine_err()),
        }
    }

    pub(crate) fn retreat(&mut self) -> Result<()> {
        match (&self.distinct, self.cursor.key()) {
            (Some(distinct), Some(key)) => {
                let edge = (distinct.before)(&key[..])?;
                self.cursor
                    .seek_for_prev(Bound::Excluded(edge.as_slice()))
                    .map_err(self.engine_err())
            }
            _ => self.cursor.prev().map_err(self.engine_err()),
        }
    }

    /// Position at the first record at or after the one holding `item`
    /// (its logical bytes). Returns whether positioned.
    pub(crate) fn seek_item(&mut self, item: &[u8]) -> Result<bool> {
        let Some(locate) = &self.locate else {
            return Err(HgError::Unsupported {
                operation: "positioning by value",
                database: "this result set",
            });
        };
        let target = locate(item)?;
        self.cursor.seek(Bound::Included(target.as_slice())).map_err(self.engine_err())?;
        self.state = State::Active;
        Ok(self.cursor.valid())
    }

    /// Engine key under the cursor
    pub(crate) fn position(&self) -> Option<Bytes> {
        self.cursor.key()
    }

    /// Return to a position saved with [`ValueIterator::position`]
    pub(crate) fn restore(&mut self, position: Option<Bytes>) -> Result<()> {
        match position {
            Some(key) => {
                self.cursor.seek(Bound::Included(&key[..])).map_err(self.engine_err())?;
                self.state = State::Active;
            }
            None => self.state = State::Unstarted,
        }
        Ok(())
    }

    /// Item under the cursor
    pub(crate) fn current(&self) -> Option<Result<T>> {
        self.cursor
            .entry()
            .map(|(key, value)| (self.extract)(&key[..], &value[..]))
    }
}

impl<T: 'static> Iterator for ValueIterator<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_closed() {
            self.state = State::Exhausted;
            return None;
        }
        let step = match self.state {
            State::Unstarted => self.to_first(),
            State::Active => self.advance(),
            State::Exhausted => return None,
        };
        if let Err(e) = step {
            self.state = State::Exhausted;
            return Some(Err(e));
        }
        match self.current() {
            Some(item) => Some(item),
            None => {
                self.state = State::Exhausted;
                None
            }
        }
    }
}

impl<T: 'static> std::iter::FusedIterator for ValueIterator<T> {}
