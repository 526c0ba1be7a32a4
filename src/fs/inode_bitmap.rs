use tracing::{debug, trace};

use crate::fs::{
    bitmap::BitmapKind,
    config::ROOT_INO,
    error::{FileSystemError, Result},
    FileSystem,
};

impl FileSystem {
    /// 在 inode 位图中占用一个 inode 号，位图用完时自动扩展
    pub(crate) fn allocate_ino(&self) -> Result<u64> {
        let _chain = self.inode_bitmap_lock.lock();

        let ino = self.bitmap_allocate(BitmapKind::Inodes)?;
        if ino < ROOT_INO {
            // 0 号位在格式化时置 1，拿到它说明位图已损坏
            self.bitmap_free(BitmapKind::Inodes, ino)?;
            return Err(FileSystemError::Corrupted(format!(
                "inode bitmap handed out reserved inode {}",
                ino
            )));
        }
        self.super_block.update(|sb| sb.inode_count += 1);
        self.super_block.sync(&self.store, false)?;
        trace!(ino, "allocated inode number");
        Ok(ino)
    }

    /// 释放 inode 号。0 号和根目录永远不会被释放
    pub fn free_inode(&self, ino: u64) -> Result<()> {
        if ino == 0 || ino == ROOT_INO {
            debug!(ino, "refusing to free reserved inode");
            return Ok(());
        }

        let _chain = self.inode_bitmap_lock.lock();
        if self.bitmap_free(BitmapKind::Inodes, ino)? {
            self.super_block
                .update(|sb| sb.inode_count = sb.inode_count.saturating_sub(1));
        }
        self.super_block.sync(&self.store, false)?;
        trace!(ino, "freed inode");
        Ok(())
    }

    /// inode 号当前是否有效（位图中对应位为 1）
    pub fn is_ino_valid(&self, ino: u64) -> Result<bool> {
        self.bitmap_test(BitmapKind::Inodes, ino)
    }
}
