//! Cursor types for paging through a language's translations in key order.
//!
//! Export reads never hold the store for the whole result set. Each fetch
//! returns at most `limit` rows plus a cursor positioned after the last
//! returned key, so a reader can resume where it stopped and memory use is
//! bounded by the page size.

/// Resumable position in a language's key-ordered translation set.
///
/// The position is the last key already handed out (keyset pagination), so
/// it stays valid across concurrent inserts and deletes: a resumed fetch
/// simply continues with the next key greater than `after`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationCursor {
    /// Last key returned by the previous fetch; `None` before the first one.
    pub after: Option<String>,
    /// Whether iteration has completed (no more entries).
    pub finished: bool,
}

impl IterationCursor {
    /// Creates a cursor positioned before the first key.
    #[must_use]
    pub fn start() -> Self {
        Self::default()
    }

    /// Builds the cursor that follows a page of `fetched` rows whose last
    /// key is `last_key`. Fewer rows than `limit` means the set is exhausted.
    #[must_use]
    pub fn after_page(last_key: Option<String>, fetched: usize, limit: usize) -> Self {
        Self {
            after: last_key,
            finished: fetched < limit,
        }
    }
}

/// Result of a cursor-based fetch operation.
#[derive(Debug)]
pub struct FetchResult<T> {
    /// The fetched items, in ascending key order.
    pub items: Vec<T>,
    /// Cursor for the next call.
    pub next_cursor: IterationCursor,
}
