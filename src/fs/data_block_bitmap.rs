use tracing::{debug, trace};

use crate::fs::{
    bitmap::BitmapKind,
    config::ROOT_DIR_BLOCK_ID,
    error::{FileSystemError, Result},
    reservation::Reservation,
    FileSystem,
};

impl FileSystem {
    /// 分配一个空闲块，返回块号。
    ///
    /// 块位图不可扩展，空闲块数为 0 时直接返回 `ObjectsExhausted`。
    pub fn allocate_block(&self) -> Result<u64> {
        let _chain = self.block_bitmap_lock.lock();

        if self.super_block.snapshot().free_block_count == 0 {
            debug!("no free block left");
            return Err(FileSystemError::ObjectsExhausted);
        }

        let blkno = self.bitmap_allocate(BitmapKind::Blocks)?;
        self.super_block
            .update(|sb| sb.free_block_count = sb.free_block_count.saturating_sub(1));
        self.super_block.sync(&self.store, false)?;
        trace!(blkno, "allocated block");
        Ok(blkno)
    }

    /// 释放一个块。
    ///
    /// 保留块（0 ~ 5 号）不会被释放；重复释放是空操作，空闲块数只在位真正被清除时增加。
    pub fn free_block(&self, blkno: u64) -> Result<()> {
        if blkno <= ROOT_DIR_BLOCK_ID {
            debug!(blkno, "refusing to free reserved block");
            return Ok(());
        }
        if blkno >= self.super_block.snapshot().block_count {
            return Err(FileSystemError::InvalidBlock(blkno));
        }

        let _chain = self.block_bitmap_lock.lock();
        if self.bitmap_free(BitmapKind::Blocks, blkno)? {
            self.super_block
                .update(|sb| sb.free_block_count += 1);
        }
        self.super_block.sync(&self.store, false)?;
        trace!(blkno, "freed block");
        Ok(())
    }

    /// 块是否已被分配
    pub fn is_block_allocated(&self, blkno: u64) -> Result<bool> {
        self.bitmap_test(BitmapKind::Blocks, blkno)
    }

    /// 分配一个块，调用者出错返回时自动归还
    pub(crate) fn reserve_block(&self) -> Result<Reservation<'_>> {
        let blkno = self.allocate_block()?;
        Ok(Reservation::block(self, blkno))
    }
}
