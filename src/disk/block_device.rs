use std::io::Result;

use crate::disk::types::Block;

/// 块设备：按块号读写固定大小的块。
///
/// 缓存与持久化由设备自己负责，上层只在需要时调用 `flush`。
pub trait BlockDevice: Send + Sync {
    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()>;
    fn write_block(&self, block_id: u64, buf: &Block) -> Result<()>;
    /// 把已写入的数据刷到稳定存储
    fn flush(&self) -> Result<()>;
    /// 设备总块数
    fn block_count(&self) -> u64;
}
