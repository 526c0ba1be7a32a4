use std::{
    collections::HashSet,
    io::{Error, ErrorKind, Result},
};

use parking_lot::Mutex;

use crate::disk::{
    block_device::BlockDevice,
    types::{Block, BLOCK_SIZE},
};

/// 内存中的块设备，主要用于测试和临时卷。
///
/// 支持故障注入：指定块读失败、所有写入失败。
#[derive(Debug)]
pub struct MemDisk {
    blocks: Mutex<Vec<Block>>,
    faults: Mutex<Faults>,
}

#[derive(Debug, Default)]
struct Faults {
    failing_reads: HashSet<u64>, // 读取这些块时返回错误
    fail_writes: bool,           // 所有写入都失败
}

impl MemDisk {
    pub fn new(block_count: u64) -> Self {
        Self {
            blocks: Mutex::new(vec![[0; BLOCK_SIZE]; block_count as usize]),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// 让之后对 `block_id` 的读取失败
    pub fn fail_reads_of(&self, block_id: u64) {
        self.faults.lock().failing_reads.insert(block_id);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.faults.lock().fail_writes = fail;
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    /// 直接查看设备上的块内容（绕过缓存）
    pub fn snapshot(&self, block_id: u64) -> Option<Block> {
        self.blocks.lock().get(block_id as usize).copied()
    }
}

fn out_of_range(block_id: u64) -> Error {
    Error::new(
        ErrorKind::InvalidInput,
        format!("block {} out of range", block_id),
    )
}

impl BlockDevice for MemDisk {
    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()> {
        if self.faults.lock().failing_reads.contains(&block_id) {
            return Err(Error::new(
                ErrorKind::Other,
                format!("injected read failure at block {}", block_id),
            ));
        }
        let blocks = self.blocks.lock();
        let block = blocks
            .get(block_id as usize)
            .ok_or_else(|| out_of_range(block_id))?;
        buf.copy_from_slice(block);
        Ok(())
    }

    fn write_block(&self, block_id: u64, buf: &Block) -> Result<()> {
        if self.faults.lock().fail_writes {
            return Err(Error::new(
                ErrorKind::Other,
                format!("injected write failure at block {}", block_id),
            ));
        }
        let mut blocks = self.blocks.lock();
        let block = blocks
            .get_mut(block_id as usize)
            .ok_or_else(|| out_of_range(block_id))?;
        block.copy_from_slice(buf);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn block_count(&self) -> u64 {
        self.blocks.lock().len() as u64
    }
}
