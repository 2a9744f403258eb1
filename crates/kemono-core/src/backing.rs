//! Backing lists handed to the pager by a fetch collaborator.
//!
//! A [`BackingList`] is owned by whoever fetches items. It only grows through
//! [`BackingList::extend`]; wholesale changes go through
//! [`BackingList::replace`], which mints a new generation. The pager never
//! mutates a list: it reads immutable [`BackingSnapshot`]s and compares their
//! generation to detect replacement.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::catalog::CatalogItem;

/// Process-wide generation counter, so two independently built lists never
/// share a generation.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn mint_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Append-only item list with an explicit content generation.
#[derive(Debug, Clone)]
pub struct BackingList<T> {
    items: Arc<Vec<T>>,
    generation: u64,
}

impl<T> Default for BackingList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BackingList<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::from_items(Vec::new())
    }

    #[must_use]
    pub fn from_items(items: Vec<T>) -> Self {
        Self {
            items: Arc::new(items),
            generation: mint_generation(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Swap in entirely new contents under a fresh generation.
    pub fn replace(&mut self, items: Vec<T>) {
        self.items = Arc::new(items);
        self.generation = mint_generation();
    }

    /// Drop all items; equivalent to replacing with an empty list.
    pub fn clear(&mut self) {
        self.replace(Vec::new());
    }

    /// Immutable view of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> BackingSnapshot<T> {
        BackingSnapshot {
            items: Arc::clone(&self.items),
            generation: self.generation,
        }
    }
}

impl<T: Clone> BackingList<T> {
    /// Append a newly fetched batch; the generation is kept.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, batch: I) {
        Arc::make_mut(&mut self.items).extend(batch);
    }
}

/// Immutable, cheaply clonable view of a backing list.
#[derive(Debug)]
pub struct BackingSnapshot<T> {
    items: Arc<Vec<T>>,
    generation: u64,
}

impl<T> Clone for BackingSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            generation: self.generation,
        }
    }
}

impl<T> Default for BackingSnapshot<T> {
    fn default() -> Self {
        BackingList::new().snapshot()
    }
}

impl<T> BackingSnapshot<T> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Items in `range`, clamped to the snapshot length.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> &[T] {
        let end = range.end.min(self.items.len());
        let start = range.start.min(end);
        &self.items[start..end]
    }
}

impl<T: CatalogItem> BackingSnapshot<T> {
    /// Id of the first item, kept for diagnostics only; replacement is
    /// detected by generation.
    #[must_use]
    pub fn first_id(&self) -> Option<&str> {
        self.items.first().map(|item| item.id())
    }
}

/// How a new snapshot relates to the one a pager last saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingChange {
    /// Same generation and length
    Unchanged,
    /// Same generation, more items appended
    Grew,
    /// New generation, or the list shrank
    Replaced,
}

impl BackingChange {
    #[must_use]
    pub fn classify(prev_generation: u64, prev_len: usize, generation: u64, len: usize) -> Self {
        if generation != prev_generation || len < prev_len {
            Self::Replaced
        } else if len > prev_len {
            Self::Grew
        } else {
            Self::Unchanged
        }
    }
}
