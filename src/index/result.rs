//! Random-access result sets over index scans

use std::sync::Arc;

use crate::error::Result;
use crate::logical::ValueIterator;

/// Outcome of [`ResultSet::go_to`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GotoResult {
    /// Positioned on the requested item
    Found,
    /// Positioned on the nearest following item
    Close,
    /// Nothing suitable; position unchanged
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    On,
    AfterLast,
}

pub(crate) type ToBytes<T> = Arc<dyn Fn(&T) -> Result<Vec<u8>> + Send + Sync>;

/// Ordered results of an index lookup, navigable in both directions.
///
/// Starts before the first item. Also an [`Iterator`] moving forward.
pub struct ResultSet<T> {
    items: ValueIterator<T>,
    to_bytes: ToBytes<T>,
    position: Position,
}

impl<T: 'static> ResultSet<T> {
    pub(crate) fn new(items: ValueIterator<T>, to_bytes: ToBytes<T>) -> Self {
        Self {
            items,
            to_bytes,
            position: Position::BeforeFirst,
        }
    }

    fn settle(&mut self, missing: Position) -> Option<Result<T>> {
        match self.items.current() {
            Some(item) => {
                self.position = Position::On;
                Some(item)
            }
            None => {
                self.position = missing;
                None
            }
        }
    }

    /// Step back one item
    pub fn prev(&mut self) -> Option<Result<T>> {
        if self.items.is_closed() {
            return None;
        }
        let step = match self.position {
            Position::AfterLast => self.items.to_last(),
            Position::On => self.items.retreat(),
            Position::BeforeFirst => return None,
        };
        if let Err(e) = step {
            return Some(Err(e));
        }
        self.settle(Position::BeforeFirst)
    }

    /// Item at the current position
    pub fn current(&self) -> Option<Result<T>> {
        match self.position {
            Position::On => self.items.current(),
            _ => None,
        }
    }

    /// Move to `item`, or with `exact == false` to the first item after it
    pub fn go_to(&mut self, item: &T, exact: bool) -> Result<GotoResult> {
        let wanted = (self.to_bytes)(item)?;
        let saved = (self.items.position(), self.position);

        let landed = if self.items.seek_item(&wanted)? {
            self.items.current().transpose()?
        } else {
            None
        };
        let outcome = match landed {
            Some(found) if (self.to_bytes)(&found)? == wanted => GotoResult::Found,
            Some(_) if !exact => GotoResult::Close,
            _ => GotoResult::Nothing,
        };

        if outcome == GotoResult::Nothing {
            self.items.restore(saved.0)?;
            self.position = saved.1;
        } else {
            self.position = Position::On;
        }
        Ok(outcome)
    }

    pub fn go_before_first(&mut self) {
        self.position = Position::BeforeFirst;
    }

    pub fn go_after_last(&mut self) {
        self.position = Position::AfterLast;
    }

    /// Number of items, by a full pass. The position is kept.
    pub fn count_all(&mut self) -> Result<u64> {
        let saved = (self.items.position(), self.position);

        let mut count = 0;
        self.items.to_first()?;
        while self.items.position().is_some() {
            count += 1;
            self.items.advance()?;
        }

        self.items.restore(saved.0)?;
        self.position = saved.1;
        Ok(count)
    }

    /// Release the underlying iterator
    pub fn close(&self) {
        self.items.close();
    }

    pub fn is_closed(&self) -> bool {
        self.items.is_closed()
    }
}

impl<T: 'static> Iterator for ResultSet<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.items.is_closed() {
            return None;
        }
        let step = match self.position {
            Position::BeforeFirst => self.items.to_first(),
            Position::On => self.items.advance(),
            Position::AfterLast => return None,
        };
        if let Err(e) = step {
            return Some(Err(e));
        }
        self.settle(Position::AfterLast)
    }
}
