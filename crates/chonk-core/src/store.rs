//! Root-bearing store: page store + entry pool + header bookkeeping.

use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::entry::ROOT_IDX;
use crate::read_view::ReadView;
use crate::{
    Cursor, Entry, EntryPool, EntryRef, Kind, PageStore, Result, StoreConfig, StoreError,
    ENTRY_SIZE,
};

/// Store magic: "CHNK" in little-endian.
pub const STORE_MAGIC: u32 = 0x4b4e_4843;

/// Header format version.
pub const STORE_VERSION: u32 = 1;

/// Metadata at offset 0 of page 0. The root [`Entry`] occupies the last
/// 512 bytes of the same page; pages `1..header_pages` hold the root path.
///
/// Layout (64 bytes total):
/// ```text
/// offset  field           size
/// ------  --------------  ----
///  0      magic             4   (0x4b4e4843)
///  4      version           4
///  8      page_size         4
/// 12      header_pages      4
/// 16      reserved_pages    4
/// 20      root_path_len     4
/// 24      _pad             40
/// ```
#[repr(C)]
pub(crate) struct StoreHeader {
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    pub header_pages: u32,
    pub reserved_pages: u32,
    pub root_path_len: u32,
    _pad: [u8; 40],
}

const _: () = assert!(std::mem::size_of::<StoreHeader>() == 64);

/// Diagnostic counters for the viewer's status line.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreStats {
    /// Entries committed by the walk so far (files, links, and dirs).
    pub files_indexed: u64,
    /// Pages of backing memory committed so far.
    pub pages_committed: u32,
}

/// The in-memory tree under construction: owns the backing memory, the
/// root entry, and the root path. Shared between the single writer and
/// readers through an `Arc`.
pub struct TreeStore {
    pool: EntryPool,
    root_path: PathBuf,
    pub(crate) files_indexed: AtomicU64,
    cursor_taken: AtomicBool,
}

impl TreeStore {
    /// Initialize a store for the subtree rooted at `root_path`.
    ///
    /// Writes the header, the root path bytes, and the root entry (parent
    /// set to the ROOT sentinel, locked). The root stays locked until the
    /// cursor finishes enumerating its children.
    pub fn init(root_path: &Path, config: StoreConfig) -> Result<Arc<Self>> {
        if !root_path.is_absolute() {
            return Err(StoreError::InvalidConfig {
                reason: format!("root path {:?} is not absolute", root_path),
            });
        }

        let pages = PageStore::init(&config)?;
        let page_size = pages.page_size();
        let header_pages = pages.header_pages();

        let path_bytes = root_path.as_os_str().as_bytes();
        let path_cap = (header_pages as usize - 1) * page_size - 1;
        if path_bytes.len() > path_cap {
            return Err(StoreError::InvalidConfig {
                reason: format!(
                    "root path of {} bytes exceeds the header capacity of {}",
                    path_bytes.len(),
                    path_cap
                ),
            });
        }

        // Header metadata. The pages arrive zeroed, so only non-zero
        // fields need storing.
        {
            let header = unsafe { &mut *(pages.byte_ptr(0) as *mut StoreHeader) };
            header.magic = STORE_MAGIC;
            header.version = STORE_VERSION;
            header.page_size = page_size as u32;
            header.header_pages = header_pages;
            header.reserved_pages = pages.reserved_pages();
            header.root_path_len = path_bytes.len() as u32;
        }

        // Root path, NUL-terminated, on the pages after the metadata page.
        pages.bytes_at_mut(1, path_bytes.len()).copy_from_slice(path_bytes);

        // Root entry in the last 512 bytes of page 0.
        {
            let root = unsafe { &mut *(pages.byte_ptr(page_size - ENTRY_SIZE) as *mut Entry) };
            root.parent = ROOT_IDX;
            root.set_kind(Kind::Dir);
            root.lock_this = 1;
            let name = root_display_name(root_path);
            root.set_name(&name)?;
        }

        info!(
            root = %root_path.display(),
            page_size,
            reserved_pages = pages.reserved_pages(),
            "tree store initialized"
        );

        Ok(Arc::new(Self {
            pool: EntryPool::new(pages),
            root_path: root_path.to_path_buf(),
            files_indexed: AtomicU64::new(0),
            cursor_taken: AtomicBool::new(false),
        }))
    }

    #[inline]
    pub fn pool(&self) -> &EntryPool {
        &self.pool
    }

    #[inline]
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Handle to the root entry.
    #[inline]
    pub fn root(&self) -> EntryRef {
        EntryRef::ROOT
    }

    /// Basename the root entry was given (the full path for `/`).
    pub fn root_name(&self) -> &str {
        self.root_entry().name()
    }

    pub(crate) fn root_entry(&self) -> &Entry {
        let offset = self.pool.pages().page_size() - ENTRY_SIZE;
        unsafe { &*(self.pool.pages().byte_ptr(offset) as *const Entry) }
    }

    /// Resolve an index, mapping the ROOT sentinel onto the header-resident
    /// root entry.
    #[inline]
    pub(crate) fn entry_by_idx(&self, idx: u32) -> &Entry {
        if idx == ROOT_IDX {
            self.root_entry()
        } else {
            self.pool.get(idx)
        }
    }

    /// Mutable resolution, writer-only. See [`EntryPool::get_mut`].
    #[inline]
    pub(crate) unsafe fn entry_by_idx_mut(&self, idx: u32) -> &mut Entry {
        if idx == ROOT_IDX {
            let offset = self.pool.pages().page_size() - ENTRY_SIZE;
            &mut *(self.pool.pages().byte_ptr(offset) as *mut Entry)
        } else {
            self.pool.get_mut(idx)
        }
    }

    /// Shared view of a published entry's record.
    pub(crate) fn entry(&self, r: EntryRef) -> &Entry {
        self.entry_by_idx(r.0)
    }

    /// Take the single walk cursor, positioned at the root.
    ///
    /// `path` must equal the store's root path; subtree-scoped cursors are
    /// not supported. The cursor is single-shot: a second take fails with
    /// [`StoreError::CursorActive`] even after the first cursor is gone.
    pub fn new_cursor_at(self: &Arc<Self>, path: &Path) -> Result<Cursor> {
        if path != self.root_path {
            return Err(StoreError::NotSupported {
                path: path.to_path_buf(),
            });
        }
        if self.cursor_taken.swap(true, Ordering::AcqRel) {
            return Err(StoreError::CursorActive);
        }
        Ok(Cursor::new(Arc::clone(self)))
    }

    /// Cheap cloneable read handle for the UI threads.
    pub fn read_view(self: &Arc<Self>) -> ReadView {
        ReadView::new(Arc::clone(self))
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            files_indexed: self.files_indexed.load(Ordering::Relaxed),
            pages_committed: self.pool.pages().extent(),
        }
    }
}

/// Name the root entry carries: the basename, or the path itself when it
/// has none (e.g. `/`).
pub(crate) fn root_display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_else(|| path.as_os_str())
        .to_string_lossy()
        .into_owned()
}
