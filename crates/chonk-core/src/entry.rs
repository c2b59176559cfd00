//! Entry record layout — SSOT for the writer (cursor) and readers (views).
//!
//! Entries live inside the page store's mapping; any field change here MUST
//! keep the `#[repr(C)]` layout at exactly 512 bytes so that entry indices
//! translate to byte offsets with a shift.

use std::str;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::{Result, StoreError};

/// Fixed size of one entry record.
pub const ENTRY_SIZE: usize = 512;

/// Maximum basename length in bytes. The name buffer holds a trailing NUL.
pub const NAME_MAX: usize = 255;

/// Parent-index sentinel naming the root entry (it lives in the header,
/// outside the entry array).
pub(crate) const ROOT_IDX: u32 = u32::MAX;

/// Classification of a filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Kind {
    Dir = 0,
    File = 1,
    /// Symbolic link. Never followed; its own length is recorded.
    LinkSoft = 2,
    /// Regular file with more than one name. Recorded per name, never
    /// deduplicated.
    LinkHard = 3,
    /// Anything the walk could not classify (stat failure, special file).
    Unknown = 4,
}

impl Kind {
    /// Lossy decode; out-of-range bytes map to `Unknown`.
    #[inline]
    pub fn from_u8(v: u8) -> Kind {
        match v {
            0 => Kind::Dir,
            1 => Kind::File,
            2 => Kind::LinkSoft,
            3 => Kind::LinkHard,
            _ => Kind::Unknown,
        }
    }
}

/// Opaque handle to a published entry. The value for the root is a
/// sentinel; all other handles are indices into the entry array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryRef(pub(crate) u32);

impl EntryRef {
    /// Handle to the root entry.
    pub const ROOT: EntryRef = EntryRef(ROOT_IDX);

    #[inline]
    pub fn is_root(self) -> bool {
        self.0 == ROOT_IDX
    }
}

/// One tree node: a directory, file, or symlink under the indexed root.
///
/// Layout (512 bytes total):
/// ```text
/// offset  field           size
/// ------  --------------  ----
///   0     parent            4   (ROOT sentinel = u32::MAX)
///   4     children_start    4   (0 iff children_count == 0)
///   8     children_count    4
///  12     inode             4   (reserved, not interpreted here)
///  16     byte_count        8   (dirs: running sum over descendants)
///  24     block_count       8   (512-byte blocks, same aggregation)
///  32     mtime             8   (opaque)
///  40     lock_this         1   (1 = being written, 0 = published)
///  41     lock_child        1   (reserved)
///  42     kind              1
///  43     name_len          1
///  44     _reserved       212
/// 256     name            256   (UTF-8 basename + trailing NUL)
/// ```
///
/// `parent`, `children_start`, `children_count`, `inode`, `mtime`, `kind`,
/// and the name are written once by the single writer before publication
/// and frozen afterwards. `byte_count`/`block_count` of directories keep
/// growing after publication and are accessed through the atomic views
/// below. `lock_this` transitions 1 to 0 exactly once, with release
/// ordering, and never goes back up.
#[repr(C)]
pub struct Entry {
    pub(crate) parent: u32,
    pub(crate) children_start: u32,
    pub(crate) children_count: u32,
    pub inode: u32,
    pub byte_count: u64,
    pub block_count: u64,
    pub mtime: u64,
    pub(crate) lock_this: u8,
    pub lock_child: u8,
    pub(crate) kind: u8,
    pub(crate) name_len: u8,
    _reserved: [u8; 212],
    pub(crate) name: [u8; 256],
}

// Compile-time assertion: Entry must be exactly 512 bytes, with no
// implicit padding (every field is naturally aligned).
const _: () = assert!(std::mem::size_of::<Entry>() == ENTRY_SIZE);
const _: () = assert!(std::mem::align_of::<Entry>() == 8);

impl Entry {
    /// Basename of this entry. Empty if the stored bytes are not UTF-8
    /// (the writer only ever stores UTF-8).
    #[inline]
    pub fn name(&self) -> &str {
        str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }

    #[inline]
    pub(crate) fn name_bytes(&self) -> &[u8] {
        &self.name[..self.name_len as usize]
    }

    /// Store the basename. Rejects names longer than [`NAME_MAX`] bytes;
    /// the buffer keeps a trailing NUL after the name.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let bytes = name.as_bytes();
        if bytes.len() > NAME_MAX {
            return Err(StoreError::NameTooLong { len: bytes.len() });
        }
        self.name[..bytes.len()].copy_from_slice(bytes);
        self.name[bytes.len()] = 0;
        self.name_len = bytes.len() as u8;
        Ok(())
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        Kind::from_u8(self.kind)
    }

    #[inline]
    pub fn set_kind(&mut self, kind: Kind) {
        self.kind = kind as u8;
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == Kind::Dir as u8
    }

    #[inline]
    pub fn parent_ref(&self) -> EntryRef {
        EntryRef(self.parent)
    }

    // ------------------------------------------------------------------
    // Atomic views.
    //
    // Entries sit in shared memory; the publication byte and the directory
    // aggregates are accessed in place through atomic reinterpretation of
    // the plain fields, the same way the seqlock generation word works in
    // a shared header. Alignment holds because entries start on 512-byte
    // boundaries within page-aligned slabs.
    // ------------------------------------------------------------------

    #[inline]
    fn lock_atomic(&self) -> &AtomicU8 {
        unsafe { &*(&self.lock_this as *const u8 as *const AtomicU8) }
    }

    #[inline]
    fn byte_count_atomic(&self) -> &AtomicU64 {
        unsafe { &*(&self.byte_count as *const u64 as *const AtomicU64) }
    }

    #[inline]
    fn block_count_atomic(&self) -> &AtomicU64 {
        unsafe { &*(&self.block_count as *const u64 as *const AtomicU64) }
    }

    /// True once the writer has released this entry to readers.
    #[inline]
    pub fn is_published(&self) -> bool {
        self.lock_atomic().load(Ordering::Acquire) == 0
    }

    /// Publish: release-store `lock_this = 0`. All prior writes to this
    /// entry (and, for directories, to its child-list fields) become
    /// visible to readers that acquire-load the lock byte. Idempotent; the
    /// observable 1 to 0 transition happens once.
    #[inline]
    pub(crate) fn publish(&self) {
        self.lock_atomic().store(0, Ordering::Release);
    }

    /// Writer-side size accumulation. Single writer, so relaxed ordering
    /// is enough; atomicity only protects readers from torn u64 loads.
    #[inline]
    pub(crate) fn add_counts(&self, bytes: u64, blocks: u64) {
        self.byte_count_atomic().fetch_add(bytes, Ordering::Relaxed);
        self.block_count_atomic().fetch_add(blocks, Ordering::Relaxed);
    }

    /// Reader-side loads of the (possibly still growing) aggregates.
    #[inline]
    pub fn load_byte_count(&self) -> u64 {
        self.byte_count_atomic().load(Ordering::Acquire)
    }

    #[inline]
    pub fn load_block_count(&self) -> u64 {
        self.block_count_atomic().load(Ordering::Acquire)
    }

    /// Reader-side loads of the child list. Written once while the
    /// directory itself is still locked, so an acquire load of a published
    /// directory observes the final values.
    #[inline]
    pub(crate) fn load_children_start(&self) -> u32 {
        let a = unsafe { &*(&self.children_start as *const u32 as *const AtomicU32) };
        a.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn load_children_count(&self) -> u32 {
        let a = unsafe { &*(&self.children_count as *const u32 as *const AtomicU32) };
        a.load(Ordering::Acquire)
    }
}
