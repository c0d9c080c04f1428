//! Expression-tree enumeration and caching (C1, `spec.md` §4.1).

pub mod cache;
pub mod enumerator;

pub use cache::TreeCache;
pub use enumerator::{enumerate, EnumConfig};
