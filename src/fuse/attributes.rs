//! File attribute conversion for FUSE filesystem

use crate::tree::Item;
use fuser::{FileAttr, FileType};

const BLOCK_SIZE: u32 = 512;

/// Attribute manager for the FUSE filesystem
pub struct AttributeManager;

impl AttributeManager {
    /// Convert a cached item to a FUSE FileAttr owned by `uid`/`gid`
    pub fn item_to_file_attr(item: &Item, uid: u32, gid: u32) -> FileAttr {
        let size = item.fake_size();
        let mtime = item.mtime();

        FileAttr {
            ino: item.ino(),
            size,
            blocks: size.div_ceil(BLOCK_SIZE as u64),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind: if item.is_dir() {
                FileType::Directory
            } else {
                FileType::RegularFile
            },
            perm: (item.mode() & 0o7777) as u16,
            nlink: item.nlink(),
            uid,
            gid,
            rdev: 0,
            flags: 0,
            blksize: BLOCK_SIZE,
        }
    }
}
