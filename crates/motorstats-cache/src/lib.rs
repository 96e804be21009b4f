//! Motorstats Cache
//!
//! Read views of the statistics and of the blog are cached under string tags.
//! After a write commits, the writer derives the affected tags with
//! [`tags_for`] and hands exactly that set to a [`CacheStore`].
//!
//! Tag derivation is pure: the same kind and period always yield the same
//! tags in the same order, so invalidating twice is harmless.

mod store;
mod tags;

pub use store::{CacheError, CacheStore, InMemoryCacheStore};
pub use tags::{CacheTag, TagKind, tags_for};
