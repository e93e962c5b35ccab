use core::borrow::Borrow;
use core::fmt;
use core::iter::FusedIterator;

use crate::error::{Error, Result};
use crate::raw::{Handle, RawBoughMap};

mod cursor;

pub use cursor::Cursor;

/// An ordered multimap based on a [B+Tree].
///
/// All entries live in leaf nodes chained into one sorted sequence;
/// internal nodes only route lookups by separator keys. Keys must
/// implement [`Ord`]. Unlike `std::collections::BTreeMap`, inserting an
/// already-present key does not overwrite: entries with equal keys
/// accumulate and stay in the order they arrived.
///
/// Positions are exposed as [`Cursor`] values. [`insert`](Self::insert)
/// returns a cursor to the new entry, [`search`](Self::search) returns a
/// cursor to the first entry at or above a key, and
/// [`begin`](Self::begin)/[`end`](Self::end) bound a forward traversal.
/// Cursors are invalidated by any mutation of the leaf they point into and
/// fail with [`Error::InvalidCursor`] when used afterwards.
///
/// The maximum number of entries per node (the branching factor) is fixed
/// at construction. Small factors make split behavior observable in
/// tests; larger ones amortize routing work over cache-friendly nodes.
///
/// # Examples
///
/// ```
/// use bough_tree::BoughMap;
///
/// let mut ratings = BoughMap::new();
/// ratings.insert("tonkotsu", 9)?;
/// ratings.insert("shoyu", 7)?;
/// ratings.insert("tonkotsu", 8)?; // second opinion, kept alongside
///
/// let entries: Vec<_> = ratings.iter().collect();
/// assert_eq!(
///     entries,
///     [(&"shoyu", &7), (&"tonkotsu", &9), (&"tonkotsu", &8)],
/// );
/// # Ok::<(), bough_tree::Error>(())
/// ```
///
/// [B+Tree]: https://en.wikipedia.org/wiki/B%2B_tree
pub struct BoughMap<K, V> {
    raw: RawBoughMap<K, V>,
}

impl<K, V> BoughMap<K, V> {
    /// Branching factor used by [`new`](Self::new), sized so a node of
    /// small keys spans a few cache lines.
    pub const DEFAULT_BRANCHING_FACTOR: usize = 64;

    /// Creates an empty map with the default branching factor.
    #[must_use]
    pub fn new() -> Self {
        Self::with_branching_factor(Self::DEFAULT_BRANCHING_FACTOR)
    }

    /// Creates an empty map whose nodes hold at most `branching` entries.
    ///
    /// # Panics
    ///
    /// Panics if `branching < 2`; a node must be able to hold two entries
    /// for a split to produce two non-empty halves.
    ///
    /// # Examples
    ///
    /// ```
    /// use bough_tree::BoughMap;
    ///
    /// let mut map = BoughMap::with_branching_factor(4);
    /// for k in 0..16 {
    ///     map.insert(k, ())?;
    /// }
    /// assert!(map.height() > 1);
    /// # Ok::<(), bough_tree::Error>(())
    /// ```
    #[must_use]
    pub fn with_branching_factor(branching: usize) -> Self {
        Self {
            raw: RawBoughMap::new(branching),
        }
    }

    /// Number of entries in the map, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the map contains no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// The maximum node occupancy fixed at construction.
    #[must_use]
    pub fn branching_factor(&self) -> usize {
        self.raw.branching_factor()
    }

    /// Number of node levels, root to leaves inclusive. Grows by one on
    /// each root promotion and never shrinks. Diagnostic.
    #[must_use]
    pub fn height(&self) -> usize {
        self.raw.height()
    }

    /// Cursor at the first entry in key order.
    ///
    /// On an empty map the returned cursor addresses the front of the
    /// empty root leaf: it is not equal to [`end`](Self::end), but it
    /// cannot be dereferenced either. Prefer [`iter`](Self::iter) unless
    /// cursor arithmetic is the point.
    #[must_use]
    pub fn begin(&self) -> Cursor {
        Cursor { raw: self.raw.begin() }
    }

    /// The end-of-sequence sentinel cursor.
    #[must_use]
    pub fn end(&self) -> Cursor {
        Cursor {
            raw: crate::raw::RawCursor::END,
        }
    }

    /// Key and value at the cursor's position.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCursor`] if the cursor is the end sentinel, its
    /// leaf has been mutated since the cursor was captured, or its index
    /// no longer names a live entry.
    pub fn entry(&self, cursor: Cursor) -> Result<(&K, &V)> {
        self.raw.entry(cursor.raw)
    }

    /// Key and mutable value at the cursor's position. Mutating the value
    /// in place does not invalidate any cursor; only entry movement does.
    ///
    /// # Errors
    ///
    /// As for [`entry`](Self::entry).
    pub fn entry_mut(&mut self, cursor: Cursor) -> Result<(&K, &mut V)> {
        self.raw.entry_mut(cursor.raw)
    }

    /// The position one entry forward, crossing into the next leaf (and
    /// eventually to [`end`](Self::end)) via the sibling chain.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCursor`] if `cursor` itself fails the same validity
    /// check as a dereference — advancing the end cursor is an error, not
    /// a no-op.
    ///
    /// # Examples
    ///
    /// ```
    /// use bough_tree::BoughMap;
    ///
    /// let mut map = BoughMap::with_branching_factor(4);
    /// for k in 0..10 {
    ///     map.insert(k, k * k)?;
    /// }
    ///
    /// let mut collected = Vec::new();
    /// let mut cursor = map.begin();
    /// while cursor != map.end() {
    ///     let (key, value) = map.entry(cursor)?;
    ///     collected.push((*key, *value));
    ///     cursor = map.advance(cursor)?;
    /// }
    /// assert_eq!(collected.len(), 10);
    /// assert_eq!(collected[3], (3, 9));
    /// # Ok::<(), bough_tree::Error>(())
    /// ```
    pub fn advance(&self, cursor: Cursor) -> Result<Cursor> {
        Ok(Cursor {
            raw: self.raw.advance(cursor.raw)?,
        })
    }

    /// The position one entry backward.
    ///
    /// # Errors
    ///
    /// Always [`Error::Unsupported`]: backward traversal is declared by
    /// the cursor interface but intentionally not implemented.
    pub fn retreat(&self, _cursor: Cursor) -> Result<Cursor> {
        Err(Error::Unsupported("backward iteration"))
    }

    /// Iterates over all entries in ascending key order, entries with
    /// equal keys in arrival order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            raw: &self.raw,
            leaf: Some(self.raw.first_leaf()),
            index: 0,
            remaining: self.raw.len(),
        }
    }
}

impl<K: Clone + Ord, V> BoughMap<K, V> {
    /// Inserts an entry and returns a cursor to it.
    ///
    /// Existing entries are never overwritten: a key equal to stored ones
    /// is placed directly after them, so equal-key entries iterate in
    /// arrival order. The separator keys kept by internal nodes are cloned
    /// from entry keys, hence the `Clone` bound.
    ///
    /// # Errors
    ///
    /// [`Error::RoutingUnderflow`] if the key orders strictly below every
    /// key ever stored and the root has already split — such a key has no
    /// target child to descend into. The map is left unchanged. Feeding
    /// keys in ascending order, or seeding the map with the smallest key
    /// first, avoids the condition entirely.
    ///
    /// # Examples
    ///
    /// ```
    /// use bough_tree::{BoughMap, Error};
    ///
    /// let mut map = BoughMap::with_branching_factor(4);
    /// for k in [10, 20, 30, 40, 50] {
    ///     map.insert(k, ())?;
    /// }
    ///
    /// // 5 is below the smallest key ever inserted and the root has
    /// // split by now, so there is no subtree that may receive it.
    /// assert_eq!(map.insert(5, ()), Err(Error::RoutingUnderflow));
    /// assert_eq!(map.len(), 5);
    /// # Ok::<(), bough_tree::Error>(())
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Result<Cursor> {
        Ok(Cursor {
            raw: self.raw.insert(key, value)?,
        })
    }

    /// Cursor at an entry holding the smallest stored key that is greater
    /// than or equal to `key`, or [`end`](Self::end) when every stored key
    /// is smaller.
    ///
    /// The entry found is *not* checked for equality — this is a lower
    /// bound, and telling "found exactly" from "found the next larger key"
    /// is the caller's comparison to make. When `key` has duplicates, the
    /// cursor lands on the first of them as long as the run sits in one
    /// leaf; a run long enough to have been split across leaves may be
    /// entered partway through. Entries before the cursor are never
    /// greater than `key` either way.
    ///
    /// # Examples
    ///
    /// ```
    /// use bough_tree::BoughMap;
    ///
    /// let mut map = BoughMap::new();
    /// map.insert(1, "one")?;
    /// map.insert(3, "three")?;
    ///
    /// let cursor = map.search(&2);
    /// let (key, _) = map.entry(cursor)?;
    /// assert_eq!(*key, 3); // nearest at-or-above, not an exact match
    ///
    /// assert_eq!(map.search(&9), map.end());
    /// # Ok::<(), bough_tree::Error>(())
    /// ```
    #[must_use]
    pub fn search<Q>(&self, key: &Q) -> Cursor
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        Cursor {
            raw: self.raw.lower_bound_cursor(key),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> BoughMap<K, V> {
    /// Renders the node structure recursively, one line per node or entry.
    /// Diagnostic only; the format is not stable.
    #[must_use]
    pub fn dump(&self) -> String {
        self.raw.dump()
    }
}

impl<K, V> Default for BoughMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BoughMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// An iterator over the entries of a `BoughMap`.
///
/// Created by [`BoughMap::iter`]. Walks the leaf chain directly, so it is
/// forward-only — the map does not support backward traversal.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, K, V> {
    raw: &'a RawBoughMap<K, V>,
    leaf: Option<Handle>,
    index: usize,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        loop {
            let handle = self.leaf?;
            let leaf = self.raw.node(handle).as_leaf();
            if self.index < leaf.len() {
                let item = (leaf.key(self.index), leaf.value(self.index));
                self.index += 1;
                self.remaining -= 1;
                return Some(item);
            }
            self.leaf = leaf.next();
            self.index = 0;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw,
            leaf: self.leaf,
            index: self.index,
            remaining: self.remaining,
        }
    }
}

impl<'a, K, V> IntoIterator for &'a BoughMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
