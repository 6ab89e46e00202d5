//! Content-addressed artifact caching.
//!
//! A [`Cacher`] stores immutable module artifacts under their canonical wire
//! names. Two backends ship with the proxy:
//! - [`TempCacher`]: the default; artifacts only live as long as the request
//!   that produced them.
//! - [`DiskCacher`]: a persistent directory-tree store.

mod disk;
mod temp;
mod traits;

pub use disk::DiskCacher;
pub use temp::TempCacher;
pub use traits::{Cache, Cacher, ChecksumHash, ReadSeek, Sha256Hash};
