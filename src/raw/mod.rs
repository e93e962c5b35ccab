mod arena;
mod handle;
mod node;
mod raw_bough_map;

pub(crate) use handle::Handle;
pub(crate) use raw_bough_map::{RawBoughMap, RawCursor};
