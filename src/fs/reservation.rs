//! 分配回滚：多步操作中途失败时，已经分配的块/inode 自动释放。

use tracing::{debug, warn};

use crate::fs::FileSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reserved {
    Block(u64),
    Inode(u64),
}

/// 尚未提交的一次分配。
///
/// 没有调用 `commit` 就被丢弃时，对应的位会被清除，计数器恢复原值。
#[must_use = "an uncommitted reservation is released when dropped"]
#[derive(Debug)]
pub struct Reservation<'a> {
    fs: &'a FileSystem,
    object: Reserved,
    committed: bool,
}

impl<'a> Reservation<'a> {
    pub(crate) fn block(fs: &'a FileSystem, blkno: u64) -> Self {
        Self {
            fs,
            object: Reserved::Block(blkno),
            committed: false,
        }
    }

    pub(crate) fn inode(fs: &'a FileSystem, ino: u64) -> Self {
        Self {
            fs,
            object: Reserved::Inode(ino),
            committed: false,
        }
    }

    /// 块号或 inode 号
    pub fn index(&self) -> u64 {
        match self.object {
            Reserved::Block(index) | Reserved::Inode(index) => index,
        }
    }

    pub fn commit(mut self) -> u64 {
        self.committed = true;
        self.index()
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let released = match self.object {
            Reserved::Block(blkno) => self.fs.free_block(blkno),
            Reserved::Inode(ino) => self.fs.free_inode(ino),
        };
        match released {
            Ok(()) => debug!(object = ?self.object, "rolled back allocation"),
            // 回滚本身失败只能记录下来，位会一直保持已分配
            Err(e) => warn!(object = ?self.object, error = %e, "failed to roll back allocation"),
        }
    }
}
