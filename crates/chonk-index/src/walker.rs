//! Depth-first filesystem walker.
//!
//! Produces the preorder/children/postorder event stream the [`Indexer`]
//! consumes. Symlinks are never followed; classification and metadata come
//! from the directory entry type and lstat. Unreadable directories yield
//! an empty child list, so the corresponding tree node still publishes.
//!
//! [`Indexer`]: crate::Indexer

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use chonk_core::{PathScratch, StoreError, NAME_MAX};

use crate::{ChildSpec, IndexError, Result, WalkEvent};

/// Walk tuning knobs.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Deepest directory level to enumerate; directories below it are
    /// recorded but published empty. 0 means unlimited.
    pub max_depth: u32,
    /// Stay on the root's filesystem: directories on other devices are
    /// recorded but not entered.
    pub one_filesystem: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: 0,
            one_filesystem: false,
        }
    }
}

#[derive(Default)]
struct DirListing {
    specs: Vec<ChildSpec>,
    /// Directory children in listing order, each with a flag saying
    /// "enter but publish empty" (depth cutoff, foreign device, abort).
    subdirs: Vec<(String, bool)>,
}

/// Walk the subtree at `root`, feeding events to `sink` in cursor order.
///
/// `root_name` is the name the root directory was registered under in the
/// store. The abort flag is polled once per directory; after it flips, the
/// remaining directories are still entered and closed empty so every
/// allocated node publishes. A capacity failure from the sink gets the
/// same treatment: the rest of the walk runs in record-only mode and the
/// error is surfaced only after the event stream is complete.
pub fn walk<F>(
    root: &Path,
    root_name: &str,
    opts: &WalkOptions,
    abort: &AtomicBool,
    sink: F,
) -> Result<()>
where
    F: FnMut(WalkEvent) -> Result<()>,
{
    let meta = fs::symlink_metadata(root).map_err(|e| IndexError::Walk {
        path: root.to_path_buf(),
        source: e,
    })?;
    if !meta.is_dir() {
        return Err(IndexError::Walk {
            path: root.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "root is not a directory"),
        });
    }

    let mut ctx = WalkCtx {
        opts,
        abort,
        sink,
        scratch: PathScratch::new(root),
        root_dev: meta.dev(),
        exhausted: None,
    };
    ctx.visit(root_name, 0, false)?;
    match ctx.exhausted {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct WalkCtx<'a, F> {
    opts: &'a WalkOptions,
    abort: &'a AtomicBool,
    sink: F,
    scratch: PathScratch,
    root_dev: u64,
    /// First capacity error from the sink. Once set, every remaining
    /// directory is entered and closed empty instead of enumerated.
    exhausted: Option<IndexError>,
}

impl<F> WalkCtx<'_, F>
where
    F: FnMut(WalkEvent) -> Result<()>,
{
    fn visit(&mut self, name: &str, depth: u32, force_empty: bool) -> Result<()> {
        let force =
            force_empty || self.exhausted.is_some() || self.abort.load(Ordering::Relaxed);
        (self.sink)(WalkEvent::EnterDir {
            name: name.to_string(),
            depth,
        })?;

        let listing = if force {
            DirListing::default()
        } else {
            self.list_current(depth)
        };
        let mut subdirs = listing.subdirs;
        if let Err(e) = (self.sink)(WalkEvent::Children(listing.specs)) {
            if !matches!(e, IndexError::Store(StoreError::OutOfCapacity { .. })) {
                return Err(e);
            }
            // The child slab never bound. Close this directory empty and
            // keep walking in record-only mode: siblings already sitting
            // locked in their parents' slabs must still be entered and
            // published, or their parents' listings stay not-ready
            // forever. Nothing from the failed listing was allocated, so
            // its subdirectories are not descended into.
            warn!(
                path = %self.scratch.as_path().display(),
                error = %e,
                "store full, closing out the remaining walk empty"
            );
            self.exhausted.get_or_insert(e);
            subdirs.clear();
            (self.sink)(WalkEvent::Children(Vec::new()))?;
        }

        for (sub, sub_force) in subdirs {
            let mark = self.scratch.push(&sub);
            let result = self.visit(&sub, depth + 1, sub_force);
            self.scratch.rewind(mark);
            result?;
        }

        (self.sink)(WalkEvent::LeaveDir { depth })
    }

    /// Enumerate the directory at the scratch path. Filesystem errors end
    /// up as diagnostics, never as walk failures.
    fn list_current(&mut self, depth: u32) -> DirListing {
        let mut listing = DirListing::default();
        let path = self.scratch.as_path();

        let iter = match fs::read_dir(path) {
            Ok(iter) => iter,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read directory");
                return listing;
            }
        };

        for dent in iter {
            let dent = match dent {
                Ok(d) => d,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read entry");
                    continue;
                }
            };
            let name = dent.file_name().to_string_lossy().into_owned();
            if name.len() > NAME_MAX {
                warn!(path = %path.display(), len = name.len(), "skipping over-long name");
                continue;
            }

            let file_type = dent.file_type().ok();
            let meta = dent.metadata();
            if let Err(e) = &meta {
                debug!(path = %path.display(), name = %name, error = %e, "stat failed, recording as error entry");
            }
            let child_dev = meta.as_ref().ok().map(|m| m.dev());

            let spec = ChildSpec::classify(name, file_type, meta);
            if spec.kind == chonk_core::Kind::Dir {
                let cutoff = self.opts.max_depth > 0 && depth + 1 > self.opts.max_depth;
                let foreign = self.opts.one_filesystem
                    && child_dev.is_some_and(|dev| dev != self.root_dev);
                listing.subdirs.push((spec.name.clone(), cutoff || foreign));
            }
            listing.specs.push(spec);
        }
        listing
    }
}
