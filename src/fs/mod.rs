use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    disk::{BlockDevice, BlockRef, BlockStore, BLOCK_SIZE},
    fs::{
        bitmap::{count_zero_bits, BitmapKind},
        config::{BITS_PER_BITMAP, FILENAME_MAX, ROOT_INO, SUPER_BLOCK_BLOCK_ID},
        directory::Directory,
        error::{FileSystemError, Result},
        format::FormatOptions,
        lock::{InodeGuard, InodeLocks},
        super_block::{SuperBlock, SuperBlockState},
    },
    utils::format_uuid,
};

pub mod bitmap;
pub mod config;
pub mod data_block_bitmap;
pub mod directory;
pub mod error;
pub mod format;
pub mod inode_bitmap;
pub mod inode_table;
pub mod linked_block;
pub mod lock;
pub mod object;
pub mod reservation;
pub mod super_block;

/// 一个已挂载的卷
#[derive(Debug)]
pub struct FileSystem {
    store: BlockStore,             // 带写回缓存的块设备
    super_block: SuperBlockState,  // 超级块计数器
    block_bitmap_lock: Mutex<()>,  // 块位图链锁
    inode_bitmap_lock: Mutex<()>,  // inode 位图链锁
    inode_table_lock: Mutex<()>,   // inode 表扩展锁
    locks: InodeLocks,             // 调用者持有的 inode 锁
}

/// 卷的使用情况
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFs {
    pub block_size: u64,
    pub blocks: u64,
    pub free_blocks: u64,
    pub inodes: u64,      // 已分配的 inode 数
    pub free_inodes: u64, // 现有 inode 位图中剩余的 inode 数
    pub name_max: u64,
    pub label: String,
    pub uuid: [u8; 16],
}

impl FileSystem {
    fn new(store: BlockStore, super_block: SuperBlock) -> Self {
        Self {
            store,
            super_block: SuperBlockState::new(super_block),
            block_bitmap_lock: Mutex::new(()),
            inode_bitmap_lock: Mutex::new(()),
            inode_table_lock: Mutex::new(()),
            locks: InodeLocks::new(),
        }
    }

    /// 格式化设备并挂载
    pub fn format(device: Arc<dyn BlockDevice>, options: &FormatOptions) -> Result<Self> {
        format::format(device, options)
    }

    /// 读取并校验超级块，确认根目录存在
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Self> {
        let mut store = BlockStore::new(device);
        let block_count = store.block_count();
        let super_block = store
            .get(SUPER_BLOCK_BLOCK_ID)?
            .read(|b| SuperBlock::decode(b, block_count))?;
        store.limit(super_block.block_count);
        let fs = Self::new(store, super_block);

        if !fs.bitmap_test(BitmapKind::Inodes, 0)? {
            return Err(FileSystemError::Corrupted(
                "inode 0 is not reserved".to_string(),
            ));
        }
        if !fs.is_ino_valid(ROOT_INO)? {
            return Err(FileSystemError::Corrupted(
                "root inode is not allocated".to_string(),
            ));
        }
        let root = fs.read_inode(ROOT_INO)?;
        if root.ino != ROOT_INO || !root.is_dir() {
            return Err(FileSystemError::Corrupted(
                "root inode is not a directory".to_string(),
            ));
        }

        let sb = fs.super_block.snapshot();
        debug!(
            block_count = sb.block_count,
            free_blocks = sb.free_block_count,
            inodes = sb.inode_count,
            label = %sb.label(),
            uuid = %format_uuid(&sb.uuid),
            "mounted volume"
        );
        Ok(fs)
    }

    /// 写回所有数据后卸载
    pub fn unmount(self) -> Result<()> {
        self.sync_fs(true)?;
        debug!("unmounted volume");
        Ok(())
    }

    /// 写回超级块；`wait` 为真时同时写回所有脏块并等待落盘
    pub fn sync_fs(&self, wait: bool) -> Result<()> {
        self.super_block.sync(&self.store, wait)?;
        if wait {
            self.store.sync_all()?;
        }
        Ok(())
    }

    /// 超级块写回，见 `SuperBlockState::sync`
    pub fn sync_super(&self, wait: bool) -> Result<()> {
        self.super_block.sync(&self.store, wait)
    }

    pub fn statfs(&self) -> StatFs {
        let sb = self.super_block.snapshot();
        StatFs {
            block_size: BLOCK_SIZE as u64,
            blocks: sb.block_count,
            free_blocks: sb.free_block_count,
            inodes: sb.inode_count,
            free_inodes: (sb.inode_bitmap_count * BITS_PER_BITMAP).saturating_sub(sb.inode_count),
            name_max: FILENAME_MAX as u64,
            label: sb.label(),
            uuid: sb.uuid,
        }
    }

    /// 当前超级块计数器的副本
    pub fn super_block(&self) -> SuperBlock {
        self.super_block.snapshot()
    }

    /// 扫描块位图统计空闲块，用于核对 `free_block_count`
    pub fn count_free_blocks(&self) -> Result<u64> {
        let _chain = self.block_bitmap_lock.lock();
        let sb = self.super_block.snapshot();
        count_zero_bits(&self.store, BitmapKind::Blocks.entry(&sb))
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    /// 取得 inode 的排他锁，修改目录前必须持有
    pub fn lock_inode(&self, ino: u64) -> InodeGuard<'_> {
        self.locks.lock(ino)
    }

    pub fn root(&self) -> Result<Directory> {
        self.open_dir(ROOT_INO)
    }

    /// 见 `linked_block::walk`
    pub fn walk(&self, entry: u64, offset: i64) -> Result<BlockRef> {
        linked_block::walk(&self.store, entry, offset)
    }

    /// 见 `linked_block::splice`
    pub fn splice(&self, new_index: u64, after: Option<&BlockRef>) -> Result<BlockRef> {
        linked_block::splice(&self.store, new_index, after)
    }
}
