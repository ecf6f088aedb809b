//! Path-based navigation over the lazily filled tree

use crate::error::FsResult;
use crate::tree::drive_tree::DriveTree;
use crate::tree::item::{ChildRef, ROOT_INO};

impl DriveTree {
    /// Resolve an absolute path to an inode, filling directories on the way
    pub async fn get_item(&self, path: &str) -> FsResult<u64> {
        let mut current = ROOT_INO;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = self.lookup(current, segment).await?;
        }
        Ok(current)
    }

    /// Children of the directory at `path`
    pub async fn get_children(&self, path: &str) -> FsResult<Vec<(String, ChildRef)>> {
        let ino = self.get_item(path).await?;
        self.children(ino).await
    }
}
