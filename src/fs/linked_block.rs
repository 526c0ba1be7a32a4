//! 链表块：块的最后 16 字节是 `prev`、`next` 两个块号，
//! 同一用途的块（inode 表、位图、目录块、文件索引块）首尾相连成环形双向链表。
//!
//! 这一层只负责在缓存中修改块并标记为脏，不做任何落盘操作。

use tracing::trace;

use crate::{
    disk::{Block, BlockRef, BlockStore, BLOCK_SIZE},
    fs::{
        config::{INODE_TABLE_START_BLOCK_ID, LINKED_PAYLOAD_SIZE},
        error::{FileSystemError, Result},
    },
};

const PREV_OFFSET: usize = LINKED_PAYLOAD_SIZE;
const NEXT_OFFSET: usize = LINKED_PAYLOAD_SIZE + 8;

pub fn prev_of(block: &Block) -> u64 {
    read_u64(block, PREV_OFFSET)
}

pub fn next_of(block: &Block) -> u64 {
    read_u64(block, NEXT_OFFSET)
}

pub fn set_prev(block: &mut Block, prev: u64) {
    block[PREV_OFFSET..PREV_OFFSET + 8].copy_from_slice(&prev.to_le_bytes());
}

pub fn set_next(block: &mut Block, next: u64) {
    block[NEXT_OFFSET..NEXT_OFFSET + 8].copy_from_slice(&next.to_le_bytes());
}

fn read_u64(block: &Block, offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&block[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// 链表块只能位于 inode 表起始块之后、卷的末尾之前
fn check_entry(store: &BlockStore, entry: u64) -> Result<()> {
    if entry < INODE_TABLE_START_BLOCK_ID || entry >= store.block_count() {
        return Err(FileSystemError::InvalidChain(entry));
    }
    Ok(())
}

// 磁盘上读到的指针越界说明卷已损坏
fn check_pointer(store: &BlockStore, from: u64, to: u64) -> Result<()> {
    if to < INODE_TABLE_START_BLOCK_ID || to >= store.block_count() {
        return Err(FileSystemError::Corrupted(format!(
            "block {} links to invalid block {}",
            from, to
        )));
    }
    Ok(())
}

/// 从 `entry` 出发沿 `next` 走 `offset` 步（负数则沿 `prev` 走），绕环不报错
pub fn walk(store: &BlockStore, entry: u64, offset: i64) -> Result<BlockRef> {
    check_entry(store, entry)?;

    let mut current = store.get(entry)?;
    for _ in 0..offset.unsigned_abs() {
        let target = current.read(|block| {
            if offset > 0 {
                next_of(block)
            } else {
                prev_of(block)
            }
        });
        check_pointer(store, current.index(), target)?;
        current = store.get(target)?;
    }
    Ok(current)
}

/// 把 `new_index` 清零后插入到 `after` 之后。
///
/// `after` 为 `None` 时新块自成一个单元素环（`prev == next == self`）。
/// 所有读取都在修改之前完成，读失败时链表保持原样。
pub fn splice(store: &BlockStore, new_index: u64, after: Option<&BlockRef>) -> Result<BlockRef> {
    check_entry(store, new_index)?;
    let block = store.get(new_index)?;

    match after {
        None => {
            block.modify(|buf| {
                buf.fill(0);
                set_prev(buf, new_index);
                set_next(buf, new_index);
            });
        }
        Some(prev) => {
            let next_index = prev.read(next_of);
            check_pointer(store, prev.index(), next_index)?;
            let next = store.get(next_index)?;

            block.modify(|buf| {
                buf.fill(0);
                set_prev(buf, prev.index());
                set_next(buf, next_index);
            });
            prev.modify(|buf| set_next(buf, new_index));
            // 单元素环时 next 和 prev 是同一块
            next.modify(|buf| set_prev(buf, new_index));
        }
    }

    trace!(
        block = new_index,
        after = after.map(BlockRef::index),
        "spliced linked block"
    );
    Ok(block)
}

/// 按 `next` 顺序遍历整条链，回到入口块时结束
pub struct ChainIter<'a> {
    store: &'a BlockStore,
    entry: u64,
    next: Option<u64>,
    steps: u64,
}

pub fn iter_chain(store: &BlockStore, entry: u64) -> Result<ChainIter<'_>> {
    check_entry(store, entry)?;
    Ok(ChainIter {
        store,
        entry,
        next: Some(entry),
        steps: 0,
    })
}

impl Iterator for ChainIter<'_> {
    type Item = Result<BlockRef>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next.take()?;

        // 比卷的块数还长的链一定有环没有回到入口
        self.steps += 1;
        if self.steps > self.store.block_count() {
            return Some(Err(FileSystemError::Corrupted(format!(
                "chain starting at {} never returns to its entry",
                self.entry
            ))));
        }

        let block = match self.store.get(index) {
            Ok(block) => block,
            Err(e) => return Some(Err(e)),
        };
        let following = block.read(next_of);
        if following != self.entry {
            if let Err(e) = check_pointer(self.store, index, following) {
                return Some(Err(e));
            }
            self.next = Some(following);
        }
        Some(Ok(block))
    }
}

/// 链表长度
pub fn chain_len(store: &BlockStore, entry: u64) -> Result<u64> {
    let mut len = 0;
    for block in iter_chain(store, entry)? {
        block?;
        len += 1;
    }
    Ok(len)
}

/// 链表块中数据区的只读视图
pub fn payload(block: &Block) -> &[u8] {
    &block[..LINKED_PAYLOAD_SIZE]
}

pub fn payload_mut(block: &mut Block) -> &mut [u8] {
    &mut block[..LINKED_PAYLOAD_SIZE]
}

const _: () = assert!(NEXT_OFFSET + 8 == BLOCK_SIZE);
