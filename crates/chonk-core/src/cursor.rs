//! Single-writer traversal cursor.
//!
//! The cursor is the only thing that mutates the tree. It tracks the
//! current directory and its parent by index, plus the child slab being
//! filled. There is no frame stack: `backtrack` recovers the grandparent
//! through the parent's own `parent` field and restores the parent's slab
//! view from its already-published child-list fields.
//!
//! Per-node life cycle driven from here:
//!
//! ```text
//! UNINIT -> ALLOCATED (parent's children_begin)
//!        -> POPULATED (child_init + caller fills + child_finish)
//!        -> CHILDREN_BEGUN / CHILDREN_ENDED (dirs only, own slab)
//!        -> PUBLISHED (lock_this = 0, release)  [terminal]
//! ```
//!
//! Files and links are published at `child_finish`; directories at their
//! own `children_end` (and again, idempotently, when backtracked from,
//! which covers directories closed out early by an aborted or truncated
//! walk).
//!
//! Aggregation: non-directory children are added to the current directory
//! at `child_finish`; directory children carry their finished subtree sums
//! and are added to the parent at `backtrack`. Each byte lands exactly
//! once per ancestor.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::trace;

use crate::entry::ROOT_IDX;
use crate::{Entry, Result, StoreError, TreeStore, NAME_MAX};

/// Writer-side walk state. Obtained once per store via
/// [`TreeStore::new_cursor_at`].
pub struct Cursor {
    store: Arc<TreeStore>,
    /// Parent of the current directory; ROOT sentinel at the root.
    parent_idx: u32,
    /// Current directory; ROOT sentinel at the root.
    cur_idx: u32,
    /// Child slab bound to the current directory, if `children_begin` ran.
    slab_start: u32,
    slab_len: u32,
    slab_bound: bool,
    slab_ended: bool,
    /// Next slab slot to initialize.
    children_next: u32,
    depth: u32,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("parent_idx", &self.parent_idx)
            .field("cur_idx", &self.cur_idx)
            .field("slab_start", &self.slab_start)
            .field("slab_len", &self.slab_len)
            .field("slab_bound", &self.slab_bound)
            .field("slab_ended", &self.slab_ended)
            .field("children_next", &self.children_next)
            .field("depth", &self.depth)
            .finish()
    }
}

impl Cursor {
    pub(crate) fn new(store: Arc<TreeStore>) -> Self {
        Self {
            store,
            parent_idx: ROOT_IDX,
            cur_idx: ROOT_IDX,
            slab_start: 0,
            slab_len: 0,
            slab_bound: false,
            slab_ended: false,
            children_next: 0,
            depth: 0,
        }
    }

    #[inline]
    pub fn store(&self) -> &Arc<TreeStore> {
        &self.store
    }

    /// Walk depth; the root is 0.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn at_root(&self) -> bool {
        self.cur_idx == ROOT_IDX
    }

    #[inline]
    fn cur(&self) -> &Entry {
        self.store.entry_by_idx(self.cur_idx)
    }

    /// Allocate and bind the child slab for the current directory.
    ///
    /// Sets `children_start`/`children_count` on the current directory
    /// (still locked, so invisible to readers) and locks every slab entry.
    /// A count of zero binds an empty slab without touching the pool.
    pub fn children_begin(&mut self, count: u32) -> Result<()> {
        debug_assert!(!self.slab_bound, "children slab already bound");
        debug_assert!(self.cur().is_dir(), "children_begin on a non-directory");

        if count == 0 {
            self.slab_start = 0;
            self.slab_len = 0;
            self.children_next = 0;
            self.slab_bound = true;
            self.slab_ended = false;
            return Ok(());
        }

        let start = self.store.pool().alloc(count)?;
        for i in 0..count {
            // Slab entries come out of the pool zeroed; raising the lock
            // byte is the only initialization they need before child_init.
            unsafe { self.store.pool().get_mut(start + i) }.lock_this = 1;
        }
        {
            // Safety: single writer; the current directory is unpublished,
            // so no reader dereferences these fields yet.
            let cur = unsafe { self.store.entry_by_idx_mut(self.cur_idx) };
            cur.children_start = start;
            cur.children_count = count;
        }
        self.slab_start = start;
        self.slab_len = count;
        self.children_next = 0;
        self.slab_bound = true;
        self.slab_ended = false;
        trace!(start, count, depth = self.depth, "child slab bound");
        Ok(())
    }

    /// Hand out the next slab slot for initialization. The entry's
    /// `parent` is set here; the caller fills name, kind, sizes, and mtime,
    /// then calls [`Cursor::child_finish`]. Does not advance.
    pub fn child_init(&mut self) -> &mut Entry {
        debug_assert!(self.slab_bound && !self.slab_ended, "no open child slab");
        debug_assert!(
            self.children_next < self.slab_len,
            "child slab already fully initialized"
        );
        // Safety: single writer; this slot is locked and unpublished.
        let entry = unsafe { self.store.pool().get_mut(self.slab_start + self.children_next) };
        entry.parent = self.cur_idx;
        entry
    }

    /// Commit the slot handed out by the last [`Cursor::child_init`] and
    /// advance. Non-directories contribute their sizes to the current
    /// directory now and become published; directories stay locked until
    /// their own enumeration finishes.
    pub fn child_finish(&mut self) {
        debug_assert!(self.slab_bound && self.children_next < self.slab_len);
        let entry = self.store.pool().get(self.slab_start + self.children_next);
        if !entry.is_dir() {
            self.cur()
                .add_counts(entry.byte_count, entry.block_count);
            entry.publish();
        }
        self.children_next += 1;
        self.store.files_indexed.fetch_add(1, Ordering::Relaxed);
    }

    /// Close the fully-initialized child slab and publish the current
    /// directory: its child list and scalar fields become visible to
    /// readers under the release store of its lock byte.
    pub fn children_end(&mut self) {
        debug_assert!(self.slab_bound && !self.slab_ended, "no open child slab");
        debug_assert_eq!(
            self.children_next, self.slab_len,
            "children_end before the slab is fully initialized"
        );
        self.slab_ended = true;
        self.cur().publish();
        trace!(depth = self.depth, count = self.slab_len, "directory published");
    }

    /// Descend into the named child directory.
    ///
    /// Requires the current slab to be complete (`children_end` called).
    /// The child's own slab state starts empty; its enumeration follows.
    pub fn recurse_into(&mut self, name: &str) -> Result<()> {
        if name.len() > NAME_MAX {
            return Err(StoreError::NameTooLong { len: name.len() });
        }
        debug_assert!(
            self.slab_bound && self.slab_ended,
            "recurse_into before children_end"
        );

        for i in 0..self.slab_len {
            let idx = self.slab_start + i;
            let entry = self.store.pool().get(idx);
            if entry.name_bytes() != name.as_bytes() {
                continue;
            }
            if !entry.is_dir() {
                return Err(StoreError::NotDirectory {
                    name: name.to_string(),
                });
            }
            self.parent_idx = self.cur_idx;
            self.cur_idx = idx;
            self.slab_start = 0;
            self.slab_len = 0;
            self.children_next = 0;
            self.slab_bound = false;
            self.slab_ended = false;
            self.depth += 1;
            trace!(name, depth = self.depth, "descended");
            return Ok(());
        }
        Err(StoreError::ChildNotFound {
            name: name.to_string(),
        })
    }

    /// Return to the parent directory, whose name must be `name`.
    ///
    /// Adds the finished subtree sums of the current directory into the
    /// parent, publishes the current directory, and restores the parent's
    /// slab view from its published child-list fields. At the root this is
    /// a no-op (the cursor stays put); calling it there is a driver bug.
    pub fn backtrack(&mut self, name: &str) {
        debug_assert!(self.cur_idx != ROOT_IDX, "backtrack at the root");
        if self.cur_idx == ROOT_IDX {
            return;
        }
        debug_assert!(
            !self.slab_bound || self.children_next == self.slab_len,
            "backtrack before the current directory is fully enumerated"
        );

        let parent = self.store.entry_by_idx(self.parent_idx);
        debug_assert_eq!(parent.name(), name, "backtrack name mismatch");

        let cur = self.cur();
        parent.add_counts(cur.load_byte_count(), cur.load_block_count());
        cur.publish();

        let grandparent_idx = if self.parent_idx == ROOT_IDX {
            ROOT_IDX
        } else {
            parent.parent
        };
        self.cur_idx = self.parent_idx;
        self.parent_idx = grandparent_idx;

        // The parent finished its enumeration before we descended; its
        // slab view is recoverable from the entry itself.
        let (slab_start, slab_len) = {
            let back = self.cur();
            (back.children_start, back.children_count)
        };
        self.slab_start = slab_start;
        self.slab_len = slab_len;
        self.children_next = slab_len;
        self.slab_bound = true;
        self.slab_ended = true;
        self.depth -= 1;
        trace!(name, depth = self.depth, "backtracked");
    }
}
