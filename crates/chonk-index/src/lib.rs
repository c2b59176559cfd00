//! # chonk-index
//!
//! Drives a [`chonk_core::Cursor`] from a stream of filesystem visit
//! events: preorder directory entry, child enumeration with metadata,
//! postorder close. The built-in [`walker`] produces that stream from the
//! real filesystem; external producers can feed [`Indexer::apply`]
//! directly.
//!
//! Host errors never reach the store. A child whose metadata cannot be
//! read becomes an entry with zero sizes (classified from its directory
//! entry type when known, `Unknown` otherwise); a directory that cannot be
//! enumerated publishes with zero children. The walk continues either way.

mod events;
mod indexer;
pub mod walker;

pub use events::{ChildSpec, WalkEvent};
pub use indexer::{IndexSummary, Indexer};
pub use walker::WalkOptions;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use chonk_core::StoreError;

/// Errors from the indexing layer.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("walk failed at {path}: {source}")]
    Walk { path: PathBuf, source: io::Error },

    #[error("walk event out of protocol: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
