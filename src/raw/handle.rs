use core::num::NonZero;

/// Index of a node slot in the [`Arena`](super::arena::Arena).
///
/// Stored off-by-one in a `NonZero` so the niche optimization makes
/// `Option<Handle>` the same size as `Handle`; parent and sibling links are
/// all optional and there is one per node, so the layout matters.
#[derive(Clone, Copy, Eq, PartialEq)]
#[repr(transparent)]
pub(crate) struct Handle(NonZero<u32>);

impl Handle {
    pub(crate) const MAX: usize = (u32::MAX - 1) as usize;

    #[inline]
    pub(crate) const fn from_index(index: usize) -> Self {
        assert!(index <= Self::MAX, "`Handle::from_index()` - `index` > `Handle::MAX`!");
        // SAFETY: `index + 1` cannot be zero and cannot overflow.
        #[allow(clippy::cast_possible_truncation)]
        Self(NonZero::new((index + 1) as u32).unwrap())
    }

    #[inline]
    pub(crate) const fn to_index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl core::fmt::Debug for Handle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.to_index())
    }
}
