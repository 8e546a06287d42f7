//! tootwatch-state - registry store for tootwatch.
//!
//! Backed by [redb](https://docs.rs/redb), holds the tracked servers, the
//! admins registered for them, and the latest known upstream release.
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns and
//! keyed by their natural identifier (`domain`, `account`). The release
//! table holds a single row.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. Every mutating call runs in its
//! own write transaction, which is rolled back if it is dropped before
//! commit.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{AdminRemoval, StateStore};
pub use types::*;
