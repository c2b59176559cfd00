//! Walk events and child classification.

use std::fs::{FileType, Metadata};
use std::io;
use std::os::unix::fs::MetadataExt;

use chonk_core::Kind;

/// One filesystem visit event, in depth-first order.
///
/// For every directory the stream carries `EnterDir`, then exactly one
/// `Children`, then (after the subdirectories' own event runs) `LeaveDir`.
/// Files and links appear only inside their parent's `Children` list.
#[derive(Debug, Clone)]
pub enum WalkEvent {
    /// Preorder: about to enumerate this directory. Depth 0 is the root.
    EnterDir { name: String, depth: u32 },
    /// The complete child list of the directory last entered.
    Children(Vec<ChildSpec>),
    /// Postorder: this directory's subtree is complete.
    LeaveDir { depth: u32 },
}

/// Scalar payload for one child entry, ready for `child_init`.
#[derive(Debug, Clone)]
pub struct ChildSpec {
    pub name: String,
    pub kind: Kind,
    pub byte_count: u64,
    pub block_count: u64,
    pub mtime: u64,
    pub inode: u32,
}

impl ChildSpec {
    /// Classify a directory entry from its `d_type` hint and (possibly
    /// failed) lstat result.
    ///
    /// Metadata wins when present; a failed stat falls back to the hint
    /// with zero sizes, so a symlink whose stat fails still records as a
    /// symlink. Special files (fifos, sockets, devices) classify as
    /// `Unknown` and carry no sizes.
    pub fn classify(
        name: String,
        file_type: Option<FileType>,
        meta: io::Result<Metadata>,
    ) -> ChildSpec {
        match meta {
            Ok(meta) => {
                let ft = meta.file_type();
                let kind = if ft.is_dir() {
                    Kind::Dir
                } else if ft.is_symlink() {
                    Kind::LinkSoft
                } else if ft.is_file() {
                    if meta.nlink() > 1 {
                        Kind::LinkHard
                    } else {
                        Kind::File
                    }
                } else {
                    Kind::Unknown
                };
                let (bytes, blocks) = if kind == Kind::Unknown || kind == Kind::Dir {
                    // Directories aggregate from their children; special
                    // files carry nothing.
                    (0, 0)
                } else {
                    (meta.len(), meta.blocks())
                };
                ChildSpec {
                    name,
                    kind,
                    byte_count: bytes,
                    block_count: blocks,
                    mtime: meta.mtime().max(0) as u64,
                    inode: meta.ino() as u32,
                }
            }
            Err(_) => ChildSpec {
                name,
                kind: kind_from_hint(file_type),
                byte_count: 0,
                block_count: 0,
                mtime: 0,
                inode: 0,
            },
        }
    }
}

fn kind_from_hint(file_type: Option<FileType>) -> Kind {
    match file_type {
        Some(ft) if ft.is_dir() => Kind::Dir,
        Some(ft) if ft.is_symlink() => Kind::LinkSoft,
        Some(ft) if ft.is_file() => Kind::File,
        _ => Kind::Unknown,
    }
}
