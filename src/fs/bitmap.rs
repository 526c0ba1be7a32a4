//! 位图分配器：位图块本身组成链表，全局对象号 `n` 位于第
//! `n / BITS_PER_BITMAP` 个位图块的第 `n % BITS_PER_BITMAP` 位（1 = 已分配）。

use tracing::{debug, trace};

use crate::{
    disk::BlockStore,
    fs::{
        config::BITS_PER_BITMAP,
        error::{FileSystemError, Result},
        linked_block::{iter_chain, payload, payload_mut, splice, walk},
        super_block::SuperBlock,
        FileSystem,
    },
};

/// 超级块管理的两条位图链
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapKind {
    /// 块位图：卷大小固定，不可扩展
    Blocks,
    /// inode 位图：用完后可以申请新块扩展
    Inodes,
}

impl BitmapKind {
    pub fn entry(self, sb: &SuperBlock) -> u64 {
        match self {
            Self::Blocks => sb.block_bitmap_first,
            Self::Inodes => sb.inode_bitmap_first,
        }
    }

    pub fn length(self, sb: &SuperBlock) -> u64 {
        match self {
            Self::Blocks => sb.block_bitmap_count,
            Self::Inodes => sb.inode_bitmap_count,
        }
    }

    fn length_mut(self, sb: &mut SuperBlock) -> &mut u64 {
        match self {
            Self::Blocks => &mut sb.block_bitmap_count,
            Self::Inodes => &mut sb.inode_bitmap_count,
        }
    }

    pub fn extendable(self) -> bool {
        matches!(self, Self::Inodes)
    }
}

/// 对象号 -> (位图块在链表中的位置, 块内位号)
pub fn split_object(objno: u64) -> (u64, usize) {
    (objno / BITS_PER_BITMAP, (objno % BITS_PER_BITMAP) as usize)
}

pub fn test_bit(bits: &[u8], bit: usize) -> bool {
    bits[bit / 8] & (1 << (bit % 8)) != 0
}

pub fn set_bit(bits: &mut [u8], bit: usize) {
    bits[bit / 8] |= 1 << (bit % 8);
}

pub fn clear_bit(bits: &mut [u8], bit: usize) {
    bits[bit / 8] &= !(1 << (bit % 8));
}

/// 第一个为 0 的位
pub fn find_first_zero(bits: &[u8]) -> Option<usize> {
    bits.iter()
        .enumerate()
        .find(|(_, byte)| **byte != 0xFF)
        .map(|(index, byte)| index * 8 + byte.trailing_ones() as usize)
}

/// 统计整条位图链中 0 的个数
pub fn count_zero_bits(store: &BlockStore, entry: u64) -> Result<u64> {
    let mut zeros = 0;
    for block in iter_chain(store, entry)? {
        zeros += block?.read(|b| {
            payload(b)
                .iter()
                .map(|byte| byte.count_zeros() as u64)
                .sum::<u64>()
        });
    }
    Ok(zeros)
}

impl FileSystem {
    /// 首次适配分配一个对象号。
    ///
    /// 调用者必须持有 `kind` 对应的链锁。链表全部用完时，
    /// 可扩展的位图会从块位图申请一个新块接到链尾并返回它的第 0 位。
    pub(crate) fn bitmap_allocate(&self, kind: BitmapKind) -> Result<u64> {
        let sb = self.super_block.snapshot();
        let entry = kind.entry(&sb);

        let mut position = 0;
        let mut tail = None;
        for block in iter_chain(&self.store, entry)? {
            let block = block?;
            trace!(?kind, bitmap = block.index(), "finding first zero bit");
            if let Some(bit) = block.read(|b| find_first_zero(payload(b))) {
                block.modify(|b| set_bit(payload_mut(b), bit));
                let objno = position * BITS_PER_BITMAP + bit as u64;
                trace!(?kind, objno, "allocated object");
                return Ok(objno);
            }
            position += 1;
            tail = Some(block);
        }

        if !kind.extendable() {
            debug!(?kind, "bitmap exhausted");
            return Err(FileSystemError::ObjectsExhausted);
        }
        let tail = tail.ok_or_else(|| {
            FileSystemError::Corrupted(format!("bitmap chain at {} is empty", entry))
        })?;

        // 新位图块来自块位图，splice 失败时预留的块会被自动释放
        let reservation = self.reserve_block()?;
        let block = splice(&self.store, reservation.index(), Some(&tail))?;
        block.modify(|b| set_bit(payload_mut(b), 0));
        let new_block = reservation.commit();

        self.super_block.update(|sb| *kind.length_mut(sb) += 1);
        debug!(?kind, block = new_block, position, "extended bitmap chain");
        Ok(position * BITS_PER_BITMAP)
    }

    /// 清除对象对应的位（幂等），返回清除前该位是否为 1。调用者持有链锁
    pub(crate) fn bitmap_free(&self, kind: BitmapKind, objno: u64) -> Result<bool> {
        let sb = self.super_block.snapshot();
        let (position, bit) = split_object(objno);
        if position >= kind.length(&sb) {
            return Ok(false);
        }

        let block = walk(&self.store, kind.entry(&sb), position as i64)?;
        let was_set = block.read(|b| test_bit(payload(b), bit));
        if was_set {
            block.modify(|b| clear_bit(payload_mut(b), bit));
        }
        trace!(?kind, objno, was_set, "freed object");
        Ok(was_set)
    }

    /// 查询对象对应的位，超出位图链范围的对象视为未分配
    pub fn bitmap_test(&self, kind: BitmapKind, objno: u64) -> Result<bool> {
        let sb = self.super_block.snapshot();
        let (position, bit) = split_object(objno);
        if position >= kind.length(&sb) {
            return Ok(false);
        }

        let block = walk(&self.store, kind.entry(&sb), position as i64)?;
        Ok(block.read(|b| test_bit(payload(b), bit)))
    }
}
