//! Error types for the B+ tree.
//!
//! Every failure in this crate is a programming-contract violation rather
//! than a transient condition: a cursor was used after the entries it
//! referenced moved, or a key was routed somewhere the tree cannot place
//! it. There are no retries and no partial recovery. Operations detect the
//! violation up front, return the error synchronously, and leave the tree
//! unchanged.

use thiserror::Error;

/// Errors reported by [`BoughMap`](crate::BoughMap) operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The cursor does not reference a live entry.
    ///
    /// Raised when dereferencing or advancing the end cursor, a cursor
    /// whose leaf has been mutated since the cursor was captured, or a
    /// cursor whose index no longer lies inside its leaf.
    #[error("cursor does not reference a live entry")]
    InvalidCursor,

    /// An internal node was asked to route a key smaller than its minimum
    /// separator.
    ///
    /// Once the root has split, the first separator of every node on the
    /// leftmost spine equals the lowest key ever stored, so a key strictly
    /// below that minimum has no target child. The condition is detected
    /// during descent, before any node is touched.
    #[error("key is ordered below every separator of an internal node")]
    RoutingUnderflow,

    /// The operation is declared by the interface but intentionally not
    /// implemented.
    #[error("{0} is not supported")]
    Unsupported(&'static str),
}

/// A `Result` alias using this crate's [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;
