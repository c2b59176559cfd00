//! # chonk-core
//!
//! Packed in-memory tree store for an interactive disk-usage viewer.
//!
//! The store indexes a filesystem subtree into fixed-size [`Entry`] records
//! living in one contiguous anonymous memory reservation. A single writer
//! (the indexer, driving a [`Cursor`]) inserts children depth-first while
//! any number of readers observe partial progress through a [`ReadView`].
//!
//! ## Memory layout
//!
//! ```text
//! page 0          StoreHeader, then the root Entry in the last 512 bytes
//! pages 1..H      root path bytes, NUL-terminated
//! page H          guard page, never written (entry index 0 stays invalid)
//! pages H+1..     Entry slabs, bump-allocated one directory at a time
//! ```
//!
//! Addresses are stable for the lifetime of the store: the full range is
//! reserved up front (`PROT_NONE`) and committed page-by-page as slabs are
//! allocated, so entry references by index never need remapping.
//!
//! ## Concurrency
//!
//! One writer thread, any number of reader threads, no locks. An entry is
//! published by storing `lock_this = 0` with release ordering after all of
//! its fields are written; readers acquire-load `lock_this` before touching
//! anything else. Directory size aggregates keep changing after publication
//! (deeper subtrees are still being summed) and are read with plain atomic
//! loads, so readers may see intermediate sums but never torn values.

mod cursor;
mod entry;
mod page_store;
mod pool;
mod read_view;
mod scratch;
mod store;

pub use cursor::Cursor;
pub use entry::{Entry, EntryRef, Kind, ENTRY_SIZE, NAME_MAX};
pub use page_store::{host_page_size, PageStore, DEFAULT_RESERVED_BYTES};
pub use pool::EntryPool;
pub use read_view::{ChildRecord, EntryView, ReadStatus, ReadView};
pub use scratch::{PathScratch, ScratchMark};
pub use store::{StoreStats, TreeStore, STORE_MAGIC, STORE_VERSION};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the store layer.
///
/// Everything except `OutOfCapacity` and the cursor-navigation variants
/// (`ChildNotFound`, `NotDirectory`, `NameTooLong`) indicates a setup
/// problem; cursor misuse beyond those is a programmer error and is caught
/// by debug assertions rather than `Err` values.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("address space reservation of {requested} bytes failed: {source}")]
    AddressSpaceReservationFailed { requested: usize, source: io::Error },

    #[error("store capacity exhausted: need {needed} pages, {reserved} reserved")]
    OutOfCapacity { needed: u32, reserved: u32 },

    #[error("name too long: {len} bytes (max {NAME_MAX})")]
    NameTooLong { len: usize },

    #[error("entry '{name}' is not a directory")]
    NotDirectory { name: String },

    #[error("no child named '{name}' in the current directory")]
    ChildNotFound { name: String },

    #[error("cursor at '{path}' not supported: only the store root may be walked")]
    NotSupported { path: PathBuf },

    #[error("a cursor has already been taken for this store")]
    CursorActive,

    #[error("invalid store configuration: {reason}")]
    InvalidConfig { reason: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Geometry of the backing reservation.
///
/// `page_size = 0` selects the host page size at init. The defaults reserve
/// 16 GiB of address space, enough for 32 million entries; nothing is
/// committed until slabs are allocated.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Total address range reserved at init. Rounded down to whole pages.
    pub reserved_address_bytes: usize,
    /// Pages committed at init for metadata, root entry, and root path.
    pub header_pages: u32,
    /// Backing page size. Must be a power of two and a multiple of 512;
    /// 0 means "ask the host".
    pub page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            reserved_address_bytes: DEFAULT_RESERVED_BYTES,
            header_pages: 2,
            page_size: 0,
        }
    }
}
