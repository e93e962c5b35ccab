use crate::raw::RawCursor;

/// A position within the sorted entry sequence of a
/// [`BoughMap`](super::BoughMap).
///
/// A cursor is a small copyable token, not a borrow: reading through one
/// goes back to the map ([`entry`](super::BoughMap::entry),
/// [`advance`](super::BoughMap::advance)), which re-checks that the
/// position is still live. A cursor stops being live as soon as the leaf
/// it points into is mutated — an insert landing in that leaf, or a split
/// moving its entries — and every later use reports
/// [`Error::InvalidCursor`](crate::Error::InvalidCursor) instead of
/// reading entries that may have shifted.
///
/// The distinguished end cursor ([`BoughMap::end`](super::BoughMap::end))
/// marks the position after the last entry; all end cursors compare equal
/// and none of them can be dereferenced.
///
/// # Examples
///
/// ```
/// use bough_tree::BoughMap;
///
/// let mut map = BoughMap::new();
/// let cursor = map.insert(10, "ten")?;
/// assert_eq!(map.entry(cursor)?, (&10, &"ten"));
///
/// // The insert below lands in the same leaf, so `cursor` goes stale.
/// map.insert(20, "twenty")?;
/// assert!(map.entry(cursor).is_err());
/// # Ok::<(), bough_tree::Error>(())
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub(crate) raw: RawCursor,
}

impl Cursor {
    /// Returns `true` for the end-of-sequence sentinel.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.raw.leaf.is_none()
    }
}
