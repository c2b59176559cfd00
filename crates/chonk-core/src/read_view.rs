//! Reader-side view over the store.
//!
//! Readers never block the writer and take no locks. Visibility is
//! all-or-nothing per directory: if any child of a published directory is
//! still locked, the whole listing reports "not ready", so a listing that
//! does come back always has every sibling's name and kind in place.

use std::cmp::Reverse;
use std::sync::Arc;

use crate::{EntryRef, Kind, StoreStats, TreeStore};

/// Outcome of a [`ReadView::children_of`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The listing is complete and sorted in `out`.
    Ready,
    /// At least one child is still being written; try again later.
    NotReady,
    /// The directory is published with no children.
    Empty,
}

/// One row of a directory listing, copied out of the store.
#[derive(Debug, Clone)]
pub struct ChildRecord {
    pub name: String,
    pub kind: Kind,
    pub byte_count: u64,
    pub block_count: u64,
    pub entry_ref: EntryRef,
}

/// A published entry's own record, for the viewer's focused-directory
/// header line.
#[derive(Debug, Clone)]
pub struct EntryView {
    pub name: String,
    pub kind: Kind,
    pub byte_count: u64,
    pub block_count: u64,
}

/// Thread-safe read handle. Cheap to clone; one per UI thread.
#[derive(Clone)]
pub struct ReadView {
    store: Arc<TreeStore>,
}

impl ReadView {
    pub(crate) fn new(store: Arc<TreeStore>) -> Self {
        Self { store }
    }

    /// Handle to the root entry. Always safe to pass to
    /// [`ReadView::children_of`]; the root may still be unpublished, in
    /// which case its child count reads as zero.
    #[inline]
    pub fn root(&self) -> EntryRef {
        EntryRef::ROOT
    }

    /// Fill `out` with the published children of `entry_ref`, sorted by
    /// descending byte count, ties broken lexicographically by name.
    ///
    /// `out` is cleared first and left empty unless `Ready` is returned.
    /// Directory rows may report sizes that are still growing while the
    /// writer works deeper in that subtree.
    pub fn children_of(&self, entry_ref: EntryRef, out: &mut Vec<ChildRecord>) -> ReadStatus {
        out.clear();
        let dir = self.store.entry(entry_ref);
        let count = dir.load_children_count();
        if count == 0 {
            return ReadStatus::Empty;
        }
        let start = dir.load_children_start();
        for i in 0..count {
            let idx = start + i;
            let child = self.store.pool().get(idx);
            // The acquire load pairs with the writer's release publish;
            // a locked sibling aborts the whole listing.
            if !child.is_published() {
                out.clear();
                return ReadStatus::NotReady;
            }
            out.push(ChildRecord {
                name: child.name().to_owned(),
                kind: child.kind(),
                byte_count: child.load_byte_count(),
                block_count: child.load_block_count(),
                entry_ref: EntryRef(idx),
            });
        }
        out.sort_by(|a, b| {
            Reverse(a.byte_count)
                .cmp(&Reverse(b.byte_count))
                .then_with(|| a.name.cmp(&b.name))
        });
        ReadStatus::Ready
    }

    /// Copy of one entry's own record, or `None` while it is unpublished.
    pub fn entry(&self, entry_ref: EntryRef) -> Option<EntryView> {
        let e = self.store.entry(entry_ref);
        if !e.is_published() {
            return None;
        }
        Some(EntryView {
            name: e.name().to_owned(),
            kind: e.kind(),
            byte_count: e.load_byte_count(),
            block_count: e.load_block_count(),
        })
    }

    /// Diagnostic counters for the status line.
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_store::host_page_size;
    use crate::{Cursor, StoreConfig};
    use std::path::Path;

    fn store() -> Arc<TreeStore> {
        let cfg = StoreConfig {
            reserved_address_bytes: 64 * host_page_size(),
            ..StoreConfig::default()
        };
        TreeStore::init(Path::new("/scan"), cfg).unwrap()
    }

    fn add(c: &mut Cursor, name: &str, kind: Kind, bytes: u64) {
        let e = c.child_init();
        e.set_name(name).unwrap();
        e.set_kind(kind);
        e.byte_count = bytes;
        e.block_count = bytes.div_ceil(512);
        c.child_finish();
    }

    #[test]
    fn test_unwalked_root_reads_empty() {
        let s = store();
        let view = s.read_view();
        let mut out = Vec::new();
        assert_eq!(view.children_of(view.root(), &mut out), ReadStatus::Empty);
        assert!(out.is_empty());
        // The root entry itself is still locked.
        assert!(view.entry(view.root()).is_none());
    }

    #[test]
    fn test_listing_sorted_by_size_then_name() {
        let s = store();
        let mut c = s.new_cursor_at(Path::new("/scan")).unwrap();
        c.children_begin(4).unwrap();
        add(&mut c, "small", Kind::File, 100);
        add(&mut c, "big", Kind::File, 300);
        add(&mut c, "bbb", Kind::File, 200);
        add(&mut c, "aaa", Kind::File, 200);
        c.children_end();

        let view = s.read_view();
        let mut out = Vec::new();
        assert_eq!(view.children_of(view.root(), &mut out), ReadStatus::Ready);
        let names: Vec<&str> = out.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["big", "aaa", "bbb", "small"]);
    }

    #[test]
    fn test_locked_sibling_makes_listing_not_ready() {
        let s = store();
        let mut c = s.new_cursor_at(Path::new("/scan")).unwrap();
        c.children_begin(2).unwrap();
        add(&mut c, "a", Kind::Dir, 0);
        add(&mut c, "f", Kind::File, 10);
        c.children_end();

        let view = s.read_view();
        let mut out = Vec::new();
        // Root is published but "a" is a directory still being written.
        assert_eq!(view.children_of(view.root(), &mut out), ReadStatus::NotReady);
        assert!(out.is_empty());

        c.recurse_into("a").unwrap();
        c.children_begin(0).unwrap();
        c.children_end();
        c.backtrack("scan");

        assert_eq!(view.children_of(view.root(), &mut out), ReadStatus::Ready);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "f");
        assert_eq!(out[0].byte_count, 10);
    }

    #[test]
    fn test_child_refs_resolve_to_nested_listings() {
        let s = store();
        let mut c = s.new_cursor_at(Path::new("/scan")).unwrap();
        c.children_begin(1).unwrap();
        add(&mut c, "d", Kind::Dir, 0);
        c.children_end();
        c.recurse_into("d").unwrap();
        c.children_begin(1).unwrap();
        add(&mut c, "leaf", Kind::File, 42);
        c.children_end();
        c.backtrack("scan");

        let view = s.read_view();
        let mut out = Vec::new();
        view.children_of(view.root(), &mut out);
        let d_ref = out[0].entry_ref;
        let d = view.entry(d_ref).unwrap();
        assert_eq!(d.name, "d");
        assert_eq!(d.byte_count, 42);

        let mut nested = Vec::new();
        assert_eq!(view.children_of(d_ref, &mut nested), ReadStatus::Ready);
        assert_eq!(nested[0].name, "leaf");
    }

    #[test]
    fn test_out_buffer_is_reused_across_calls() {
        let s = store();
        let mut c = s.new_cursor_at(Path::new("/scan")).unwrap();
        c.children_begin(1).unwrap();
        add(&mut c, "f", Kind::File, 1);
        c.children_end();

        let view = s.read_view();
        let mut out = vec![ChildRecord {
            name: "stale".into(),
            kind: Kind::Unknown,
            byte_count: 0,
            block_count: 0,
            entry_ref: view.root(),
        }];
        assert_eq!(view.children_of(view.root(), &mut out), ReadStatus::Ready);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "f");
    }
}
