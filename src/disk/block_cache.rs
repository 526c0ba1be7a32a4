use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tracing::trace;

use crate::{
    disk::{
        block_device::BlockDevice,
        types::{Block, BLOCK_SIZE},
    },
    fs::error::{FileSystemError, Result},
};

/// 缓存中最多保留的块数（超出后淘汰没有被引用的块）
pub const BLOCK_CACHE_CAPACITY: usize = 256;

#[derive(Debug)]
struct CachedBlock {
    data: Box<Block>, // 块内容
    dirty: bool,      // 是否被修改、尚未写回
}

/// 指向缓存中某个块的句柄。
///
/// 多个句柄可以同时指向同一块，通过 `modify` 做的修改对所有句柄可见，
/// 并把块标记为脏，等待 `BlockStore::flush` 或 `sync_all` 写回。
#[derive(Debug, Clone)]
pub struct BlockRef {
    index: u64,
    inner: Arc<Mutex<CachedBlock>>,
}

impl BlockRef {
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn read<V>(&self, f: impl FnOnce(&Block) -> V) -> V {
        f(&self.inner.lock().data)
    }

    pub fn modify<V>(&self, f: impl FnOnce(&mut Block) -> V) -> V {
        let mut cached = self.inner.lock();
        cached.dirty = true;
        f(&mut cached.data)
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }
}

/// 带写回缓存的块存储
pub struct BlockStore {
    device: Arc<dyn BlockDevice>,
    block_count: u64,
    cache: Mutex<HashMap<u64, Arc<Mutex<CachedBlock>>>>,
}

impl std::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStore")
            .field("block_count", &self.block_count)
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}

impl BlockStore {
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        let block_count = device.block_count();
        Self {
            device,
            block_count,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// 设备可以比卷大，卷之外的块不可访问
    pub fn limit(&mut self, block_count: u64) {
        self.block_count = self.block_count.min(block_count);
    }

    /// 取得块句柄，未命中时从设备读取
    pub fn get(&self, index: u64) -> Result<BlockRef> {
        if index >= self.block_count {
            return Err(FileSystemError::InvalidBlock(index));
        }

        let mut cache = self.cache.lock();
        if let Some(inner) = cache.get(&index) {
            return Ok(BlockRef {
                index,
                inner: Arc::clone(inner),
            });
        }

        if cache.len() >= BLOCK_CACHE_CAPACITY {
            self.evict_one(&mut cache)?;
        }

        let mut data = Box::new([0u8; BLOCK_SIZE]);
        self.device.read_block(index, &mut data)?;
        trace!(index, "block cache miss");

        let inner = Arc::new(Mutex::new(CachedBlock { data, dirty: false }));
        cache.insert(index, Arc::clone(&inner));
        Ok(BlockRef { index, inner })
    }

    // 淘汰一个没有外部引用的块，脏块先写回
    fn evict_one(&self, cache: &mut HashMap<u64, Arc<Mutex<CachedBlock>>>) -> Result<()> {
        let victim = cache
            .iter()
            .find(|(_, inner)| Arc::strong_count(inner) == 1)
            .map(|(&index, _)| index);

        if let Some(index) = victim {
            if let Some(inner) = cache.get(&index) {
                let mut cached = inner.lock();
                if cached.dirty {
                    self.device.write_block(index, &cached.data)?;
                    cached.dirty = false;
                }
            }
            cache.remove(&index);
            trace!(index, "block evicted");
        }
        // 全部都在使用中时允许缓存暂时超过容量
        Ok(())
    }

    /// 写回单个块并等待设备落盘
    pub fn flush(&self, index: u64) -> Result<()> {
        let inner = self.cache.lock().get(&index).map(Arc::clone);
        if let Some(inner) = inner {
            let mut cached = inner.lock();
            if cached.dirty {
                self.device.write_block(index, &cached.data)?;
                cached.dirty = false;
            }
        }
        self.device.flush()?;
        Ok(())
    }

    /// 写回所有脏块
    pub fn sync_all(&self) -> Result<()> {
        let mut entries: Vec<(u64, Arc<Mutex<CachedBlock>>)> = self
            .cache
            .lock()
            .iter()
            .map(|(&index, inner)| (index, Arc::clone(inner)))
            .collect();
        entries.sort_by_key(|(index, _)| *index);

        for (index, inner) in entries {
            let mut cached = inner.lock();
            if cached.dirty {
                self.device.write_block(index, &cached.data)?;
                cached.dirty = false;
            }
        }
        self.device.flush()?;
        Ok(())
    }

    /// 当前缓存中的脏块数
    pub fn dirty_count(&self) -> usize {
        self.cache
            .lock()
            .values()
            .filter(|inner| inner.lock().dirty)
            .count()
    }
}
