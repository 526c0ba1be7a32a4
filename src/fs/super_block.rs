use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::{
    disk::{Block, BlockStore, BLOCK_SIZE},
    fs::{
        config::{
            FIRST_FREE_BLOCK_ID, INODE_TABLE_START_BLOCK_ID, LABEL_MAX, MAGIC,
            SUPER_BLOCK_BLOCK_ID, UUID_SIZE, VERSION,
        },
        error::{FileSystemError, Result},
    },
    utils::trim_nul,
};

/// 磁盘上的超级块（位于 1 号块，小端序，其余部分补零）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperBlock {
    pub version: u64,     // 格式版本
    pub magic: u64,       // 魔数，用于识别文件系统
    pub block_size: u64,  // 每块大小（字节）
    pub block_count: u64, // 文件系统总块数
    /** 元数据链表 */
    pub inode_table_first: u64, // 第一个 inode 表块号
    pub inode_table_count: u64, // inode 表链表长度
    pub block_bitmap_first: u64, // 第一个块位图块号
    pub block_bitmap_count: u64, // 块位图链表长度
    pub inode_bitmap_first: u64, // 第一个 inode 位图块号
    pub inode_bitmap_count: u64, // inode 位图链表长度
    /** 计数器 */
    pub inode_count: u64,      // 已分配的 inode 数
    pub free_block_count: u64, // 当前空闲块数
    /** 其他元信息 */
    pub label: [u8; LABEL_MAX], // 卷标，NUL 填充
    pub uuid: [u8; UUID_SIZE],  // 卷 ID
}

impl SuperBlock {
    /// 写入一个块缓冲区，超出字段的部分清零
    pub fn encode_into(&self, block: &mut Block) -> Result<()> {
        block.fill(0);
        bincode::serialize_into(&mut block[..], self)
            .map_err(|e| FileSystemError::Corrupted(format!("super block encode: {}", e)))
    }

    /// 从块缓冲区解析并校验超级块，`device_blocks` 是设备实际块数
    pub fn decode(block: &Block, device_blocks: u64) -> Result<Self> {
        let sb: SuperBlock = bincode::deserialize(&block[..])
            .map_err(|e| FileSystemError::Corrupted(format!("super block decode: {}", e)))?;
        sb.validate(device_blocks)?;
        Ok(sb)
    }

    fn validate(&self, device_blocks: u64) -> Result<()> {
        if self.magic != MAGIC {
            return Err(FileSystemError::BadMagic(self.magic));
        }
        if self.version != VERSION {
            return Err(FileSystemError::VersionMismatch(self.version));
        }
        if self.block_size != BLOCK_SIZE as u64 {
            return Err(FileSystemError::Corrupted(format!(
                "unsupported block size {}",
                self.block_size
            )));
        }
        if self.block_count <= FIRST_FREE_BLOCK_ID || self.block_count > device_blocks {
            return Err(FileSystemError::Corrupted(format!(
                "block count {} does not fit device of {} blocks",
                self.block_count, device_blocks
            )));
        }

        let chains = [
            ("inode table", self.inode_table_first, self.inode_table_count),
            ("block bitmap", self.block_bitmap_first, self.block_bitmap_count),
            ("inode bitmap", self.inode_bitmap_first, self.inode_bitmap_count),
        ];
        for (name, first, count) in chains {
            if first < INODE_TABLE_START_BLOCK_ID || first >= self.block_count || count == 0 {
                return Err(FileSystemError::Corrupted(format!(
                    "{} chain head {} (length {}) out of range",
                    name, first, count
                )));
            }
        }

        if self.free_block_count > self.block_count {
            return Err(FileSystemError::Corrupted(format!(
                "free block count {} exceeds block count {}",
                self.free_block_count, self.block_count
            )));
        }
        Ok(())
    }

    pub fn label(&self) -> String {
        String::from_utf8_lossy(trim_nul(&self.label)).into_owned()
    }
}

/// 挂载期间超级块计数器的内存镜像。
///
/// 所有计数器以这里为准，每次分配/释放后写回 1 号块。
#[derive(Debug)]
pub struct SuperBlockState {
    inner: Mutex<SuperBlock>,
}

impl SuperBlockState {
    pub fn new(super_block: SuperBlock) -> Self {
        Self {
            inner: Mutex::new(super_block),
        }
    }

    pub fn snapshot(&self) -> SuperBlock {
        self.inner.lock().clone()
    }

    pub fn update<V>(&self, f: impl FnOnce(&mut SuperBlock) -> V) -> V {
        f(&mut self.inner.lock())
    }

    /// 把计数器写回超级块。`wait` 为真时等待落盘，失败返回 `SyncFailed`
    pub fn sync(&self, store: &BlockStore, wait: bool) -> Result<()> {
        let block = store.get(SUPER_BLOCK_BLOCK_ID)?;
        {
            let sb = self.inner.lock();
            block.modify(|buf| sb.encode_into(buf))?;
            trace!(
                free_blocks = sb.free_block_count,
                inodes = sb.inode_count,
                "super block updated"
            );
        }

        if wait {
            store.flush(SUPER_BLOCK_BLOCK_ID).map_err(|e| {
                warn!(error = %e, "failed to sync super block");
                FileSystemError::SyncFailed
            })?;
        }
        Ok(())
    }
}
