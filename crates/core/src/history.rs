//! Bounded, insertion-ordered history of completed results.

use crate::types::ResultItem;

/// Maximum number of results kept; pushing past it evicts the oldest.
pub const MAX_HISTORY: usize = 5;

/// Ordered results plus a "current" pointer.
///
/// The pointer is stored as the id of an entry, so it can never dangle:
/// every mutation that removes entries re-points it.
#[derive(Debug, Clone, Default)]
pub struct ResultHistory {
    items: Vec<ResultItem>,
    current: Option<String>,
}

impl ResultHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `item` as the newest entry and make it current.
    ///
    /// An existing entry with the same id is removed first, so the history
    /// never holds duplicates.
    pub fn push(&mut self, item: ResultItem) {
        self.items.retain(|existing| existing.id != item.id);
        self.current = Some(item.id.clone());
        self.items.push(item);
        if self.items.len() > MAX_HISTORY {
            let overflow = self.items.len() - MAX_HISTORY;
            self.items.drain(..overflow);
        }
    }

    /// Remove the newest entry; the new newest (if any) becomes current.
    pub fn drop_newest(&mut self) -> Option<ResultItem> {
        let dropped = self.items.pop();
        self.current = self.items.last().map(|item| item.id.clone());
        dropped
    }

    /// Point `current` at the entry with `id`. Unknown ids are ignored.
    pub fn select(&mut self, id: &str) -> bool {
        if self.items.iter().any(|item| item.id == id) {
            self.current = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Option<&ResultItem> {
        let id = self.current.as_deref()?;
        self.items.iter().find(|item| item.id == id)
    }

    pub fn items(&self) -> &[ResultItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
