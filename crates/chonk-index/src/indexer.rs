//! Event-driven cursor driver.
//!
//! Consumes the walker's preorder/children/postorder stream and issues
//! cursor calls in the order the cursor requires. Because the stream
//! carries explicit postorder events, a preorder event always arrives with
//! the cursor sitting at the parent; there is no sideways sibling step and
//! no name comparison to decide when to backtrack.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use serde::Serialize;
use tracing::{info, warn};

use chonk_core::{Cursor, Kind, TreeStore};

use crate::walker::{self, WalkOptions};
use crate::{ChildSpec, IndexError, Result, WalkEvent};

/// Final tally of one walk, also delivered through the completion channel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexSummary {
    pub directories: u64,
    pub files: u64,
    pub symlinks: u64,
    pub hard_links: u64,
    pub unknown: u64,
    /// Apparent bytes under the root after aggregation.
    pub byte_total: u64,
    pub aborted: bool,
}

/// Single-writer walk driver. One per store, consuming the store's one
/// cursor.
pub struct Indexer {
    store: Arc<TreeStore>,
    cursor: Cursor,
    opts: WalkOptions,
    abort: Arc<AtomicBool>,
    /// Names of the directories on the walk path, root first. The top is
    /// the current directory; the one beneath it is what `backtrack`
    /// returns to.
    names: Vec<String>,
    summary: IndexSummary,
    finished: bool,
    completion: Option<Sender<IndexSummary>>,
}

impl Indexer {
    /// Take the store's cursor and prepare a walk over its root path.
    pub fn new(store: &Arc<TreeStore>, opts: WalkOptions) -> Result<Self> {
        let cursor = store.new_cursor_at(store.root_path())?;
        Ok(Self {
            store: Arc::clone(store),
            cursor,
            opts,
            abort: Arc::new(AtomicBool::new(false)),
            names: Vec::new(),
            summary: IndexSummary::default(),
            finished: false,
            completion: None,
        })
    }

    /// Flag polled between directory events; setting it makes the walk
    /// close out the remaining directories empty and finish early.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Register the one-shot "indexing finished" channel. The summary is
    /// sent once, when the root's postorder event is applied.
    pub fn on_complete(&mut self, tx: Sender<IndexSummary>) {
        self.completion = Some(tx);
    }

    /// True once the root's postorder event has been applied.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Walk the store's root path with the built-in walker.
    ///
    /// On capacity exhaustion the walker finishes the event stream in
    /// record-only mode, so every allocated entry is published and the
    /// root and all already-walked directories stay readable when the
    /// error surfaces.
    pub fn run(&mut self) -> Result<IndexSummary> {
        let root_path: PathBuf = self.store.root_path().to_path_buf();
        let root_name = self.store.root_name().to_string();
        let opts = self.opts.clone();
        let abort = self.abort_handle();

        info!(root = %root_path.display(), "indexing started");
        let walked = walker::walk(&root_path, &root_name, &opts, &abort, |ev| self.apply(ev));

        match walked {
            Ok(()) => {
                debug_assert!(self.finished, "walker ended without the root postorder");
                Ok(self.summary.clone())
            }
            Err(e) => {
                if self.finished {
                    warn!(error = %e, "indexing truncated");
                }
                Err(e)
            }
        }
    }

    /// Apply one walk event. Public so an external event producer can
    /// drive the cursor instead of the built-in walker.
    pub fn apply(&mut self, event: WalkEvent) -> Result<()> {
        match event {
            WalkEvent::EnterDir { name, depth } => self.enter_dir(name, depth),
            WalkEvent::Children(specs) => self.fill_children(specs),
            WalkEvent::LeaveDir { depth } => self.leave_dir(depth),
        }
    }

    fn enter_dir(&mut self, name: String, depth: u32) -> Result<()> {
        if self.finished {
            return Err(IndexError::Protocol("event after the walk finished".into()));
        }
        if depth == 0 {
            if !self.names.is_empty() {
                return Err(IndexError::Protocol("root entered twice".into()));
            }
        } else {
            if self.names.len() != depth as usize {
                return Err(IndexError::Protocol(format!(
                    "preorder depth {} with {} open frames",
                    depth,
                    self.names.len()
                )));
            }
            self.cursor.recurse_into(&name)?;
        }
        self.names.push(name);
        self.summary.directories += 1;
        Ok(())
    }

    fn fill_children(&mut self, specs: Vec<ChildSpec>) -> Result<()> {
        if self.names.is_empty() || self.finished {
            return Err(IndexError::Protocol("child list with no open directory".into()));
        }
        self.cursor.children_begin(specs.len() as u32)?;
        for spec in &specs {
            let entry = self.cursor.child_init();
            entry.set_name(&spec.name)?;
            entry.set_kind(spec.kind);
            entry.byte_count = spec.byte_count;
            entry.block_count = spec.block_count;
            entry.mtime = spec.mtime;
            entry.inode = spec.inode;
            self.cursor.child_finish();

            match spec.kind {
                Kind::Dir => {}
                Kind::File => self.summary.files += 1,
                Kind::LinkSoft => self.summary.symlinks += 1,
                Kind::LinkHard => self.summary.hard_links += 1,
                Kind::Unknown => self.summary.unknown += 1,
            }
        }
        self.cursor.children_end();
        Ok(())
    }

    fn leave_dir(&mut self, depth: u32) -> Result<()> {
        if self.names.len() != depth as usize + 1 {
            return Err(IndexError::Protocol(format!(
                "postorder depth {} with {} open frames",
                depth,
                self.names.len()
            )));
        }
        self.names.pop();
        match self.names.len() {
            0 => self.complete(),
            n => self.cursor.backtrack(&self.names[n - 1]),
        }
        Ok(())
    }

    /// The root's postorder: freeze the summary and notify the observer.
    fn complete(&mut self) {
        self.finished = true;
        self.summary.aborted = self.abort.load(Ordering::Relaxed);
        if let Some(root) = self.store.read_view().entry(self.store.root()) {
            self.summary.byte_total = root.byte_count;
        }
        info!(
            directories = self.summary.directories,
            files = self.summary.files,
            bytes = self.summary.byte_total,
            aborted = self.summary.aborted,
            "indexing finished"
        );
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(self.summary.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chonk_core::{ReadStatus, StoreConfig, StoreError};
    use std::path::Path;

    fn store() -> Arc<TreeStore> {
        let cfg = StoreConfig {
            reserved_address_bytes: 256 * chonk_core::host_page_size(),
            ..StoreConfig::default()
        };
        TreeStore::init(Path::new("/virtual"), cfg).unwrap()
    }

    fn file(name: &str, bytes: u64) -> ChildSpec {
        ChildSpec {
            name: name.to_string(),
            kind: Kind::File,
            byte_count: bytes,
            block_count: bytes.div_ceil(512),
            mtime: 1,
            inode: 0,
        }
    }

    fn dir(name: &str) -> ChildSpec {
        ChildSpec {
            name: name.to_string(),
            kind: Kind::Dir,
            byte_count: 0,
            block_count: 0,
            mtime: 1,
            inode: 0,
        }
    }

    /// Drive the indexer from a hand-written event stream, no filesystem.
    #[test]
    fn test_apply_synthetic_stream() {
        let s = store();
        let mut ix = Indexer::new(&s, WalkOptions::default()).unwrap();

        let events = vec![
            WalkEvent::EnterDir { name: "virtual".into(), depth: 0 },
            WalkEvent::Children(vec![dir("a"), file("big", 500)]),
            WalkEvent::EnterDir { name: "a".into(), depth: 1 },
            WalkEvent::Children(vec![file("x", 10), file("y", 20)]),
            WalkEvent::LeaveDir { depth: 1 },
            WalkEvent::LeaveDir { depth: 0 },
        ];
        for ev in events {
            ix.apply(ev).unwrap();
        }
        assert!(ix.finished());

        let view = s.read_view();
        let mut out = Vec::new();
        assert_eq!(view.children_of(view.root(), &mut out), ReadStatus::Ready);
        assert_eq!(out[0].name, "big");
        assert_eq!(out[1].name, "a");
        assert_eq!(out[1].byte_count, 30);
        assert_eq!(view.entry(view.root()).unwrap().byte_count, 530);
    }

    #[test]
    fn test_completion_channel_fires_once() {
        let s = store();
        let mut ix = Indexer::new(&s, WalkOptions::default()).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        ix.on_complete(tx);

        ix.apply(WalkEvent::EnterDir { name: "virtual".into(), depth: 0 }).unwrap();
        ix.apply(WalkEvent::Children(vec![file("f", 7)])).unwrap();
        assert!(rx.try_recv().is_err(), "completion before postorder");
        ix.apply(WalkEvent::LeaveDir { depth: 0 }).unwrap();

        let summary = rx.try_recv().unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.byte_total, 7);
        assert!(!summary.aborted);
    }

    #[test]
    fn test_indexer_claims_the_store_cursor() {
        let s = store();
        let _ix = Indexer::new(&s, WalkOptions::default()).unwrap();
        assert!(matches!(
            s.new_cursor_at(Path::new("/virtual")),
            Err(StoreError::CursorActive)
        ));
    }

    #[test]
    fn test_depth_mismatch_is_a_protocol_error() {
        let s = store();
        let mut ix = Indexer::new(&s, WalkOptions::default()).unwrap();
        ix.apply(WalkEvent::EnterDir { name: "virtual".into(), depth: 0 }).unwrap();
        let err = ix
            .apply(WalkEvent::EnterDir { name: "skip".into(), depth: 2 })
            .unwrap_err();
        assert!(matches!(err, IndexError::Protocol(_)));
    }

    #[test]
    fn test_events_after_finish_rejected() {
        let s = store();
        let mut ix = Indexer::new(&s, WalkOptions::default()).unwrap();
        ix.apply(WalkEvent::EnterDir { name: "virtual".into(), depth: 0 }).unwrap();
        ix.apply(WalkEvent::Children(vec![])).unwrap();
        ix.apply(WalkEvent::LeaveDir { depth: 0 }).unwrap();
        let err = ix
            .apply(WalkEvent::EnterDir { name: "virtual".into(), depth: 0 })
            .unwrap_err();
        assert!(matches!(err, IndexError::Protocol(_)));
    }
}
