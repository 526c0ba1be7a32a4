//! 目录项管理：目录内容是一条目录块链表，每块 63 个 64 字节的目录项，
//! `ino == 0` 的目录项为空槽。

use tracing::{debug, trace};

use crate::{
    disk::BLOCK_SIZE,
    fs::{
        config::{DENTRIES_PER_BLOCK, DENTRY_SIZE, FILENAME_FIELD, FILENAME_MAX},
        error::{FileSystemError, Result},
        inode_table::Inode,
        linked_block::{chain_len, iter_chain, payload, payload_mut, splice},
        lock::InodeGuard,
        FileSystem,
    },
    utils::trim_nul,
};

const NAME_OFFSET: usize = 8;

// 一个目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    pub name: String,
}

/// 打开的目录：inode 记录加上内存中的块数
#[derive(Debug, Clone)]
pub struct Directory {
    inode: Inode,
    blocks: u64, // 目录块链表长度
}

impl Directory {
    pub fn ino(&self) -> u64 {
        self.inode.ino
    }

    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    pub fn first_block(&self) -> u64 {
        self.inode.first_block
    }

    pub fn dentry_count(&self) -> u64 {
        self.inode.dentry_count()
    }

    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// 目录占用的字节数
    pub fn size(&self) -> u64 {
        self.blocks * BLOCK_SIZE as u64
    }
}

/// 文件名校验，在任何分配之前进行
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FileSystemError::NameEmpty);
    }
    if name.len() > FILENAME_MAX {
        return Err(FileSystemError::NameTooLong(name.len()));
    }
    if name.contains('\0') {
        return Err(FileSystemError::InvalidArgument(format!(
            "file name {:?} contains NUL",
            name
        )));
    }
    Ok(())
}

fn slot_range(slot: usize) -> std::ops::Range<usize> {
    slot * DENTRY_SIZE..(slot + 1) * DENTRY_SIZE
}

fn dentry_ino(entries: &[u8], slot: usize) -> u64 {
    let start = slot * DENTRY_SIZE;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&entries[start..start + 8]);
    u64::from_le_bytes(bytes)
}

fn dentry_name(entries: &[u8], slot: usize) -> &[u8] {
    let start = slot * DENTRY_SIZE + NAME_OFFSET;
    trim_nul(&entries[start..start + FILENAME_FIELD])
}

pub(crate) fn write_dentry(entries: &mut [u8], slot: usize, ino: u64, name: &str) {
    let entry = &mut entries[slot_range(slot)];
    entry.fill(0);
    entry[..8].copy_from_slice(&ino.to_le_bytes());
    entry[NAME_OFFSET..NAME_OFFSET + name.len()].copy_from_slice(name.as_bytes());
}

fn slots() -> impl Iterator<Item = usize> {
    0..DENTRIES_PER_BLOCK as usize
}

impl FileSystem {
    /// 打开目录，`ino` 不是目录时返回 `NotADirectory`
    pub fn open_dir(&self, ino: u64) -> Result<Directory> {
        let inode = self.read_inode(ino)?;
        if !inode.is_dir() {
            return Err(FileSystemError::NotADirectory(ino));
        }
        let blocks = chain_len(&self.store, inode.first_block)?;
        Ok(Directory { inode, blocks })
    }

    /// 在目录中查找文件名，返回第一个匹配的 inode 号
    pub fn find(&self, dir: &Directory, name: &str) -> Result<Option<u64>> {
        for block in iter_chain(&self.store, dir.first_block())? {
            let found = block?.read(|b| {
                let entries = payload(b);
                slots()
                    .filter(|&slot| dentry_ino(entries, slot) != 0)
                    .find(|&slot| dentry_name(entries, slot) == name.as_bytes())
                    .map(|slot| dentry_ino(entries, slot))
            });
            if found.is_some() {
                trace!(dir = dir.ino(), name, ino = ?found, "found dentry");
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// 插入目录项。
    ///
    /// 填入第一个空槽；所有块都满时分配一个新目录块接到链尾。
    /// 不检查重名，需要时使用 `insert_unique`。
    pub fn insert(&self, guard: &InodeGuard, dir: &mut Directory, ino: u64, name: &str) -> Result<()> {
        guard.check(dir.ino())?;
        validate_name(name)?;
        if ino == 0 {
            return Err(FileSystemError::InvalidInode(ino));
        }

        let mut tail = None;
        for block in iter_chain(&self.store, dir.first_block())? {
            let block = block?;
            let empty = block.read(|b| slots().find(|&slot| dentry_ino(payload(b), slot) == 0));
            if let Some(slot) = empty {
                block.modify(|b| write_dentry(payload_mut(b), slot, ino, name));
                trace!(dir = dir.ino(), block = block.index(), slot, name, "inserted dentry");
                return self.finish_insert(dir, false);
            }
            tail = Some(block);
        }

        let tail = tail.ok_or_else(|| {
            FileSystemError::Corrupted(format!("directory {} has no blocks", dir.ino()))
        })?;
        let reservation = self.reserve_block()?;
        let block = splice(&self.store, reservation.index(), Some(&tail))?;
        block.modify(|b| write_dentry(payload_mut(b), 0, ino, name));
        let new_block = reservation.commit();

        debug!(dir = dir.ino(), block = new_block, name, "grew directory");
        self.finish_insert(dir, true)
    }

    fn finish_insert(&self, dir: &mut Directory, grew: bool) -> Result<()> {
        dir.inode.size += 1;
        dir.inode.touch();
        if grew {
            dir.blocks += 1;
        }
        self.write_inode(&dir.inode)
    }

    /// 与 `insert` 相同，但目录中已有同名项时返回 `AlreadyExists`
    pub fn insert_unique(
        &self,
        guard: &InodeGuard,
        dir: &mut Directory,
        ino: u64,
        name: &str,
    ) -> Result<()> {
        guard.check(dir.ino())?;
        validate_name(name)?;
        if self.find(dir, name)?.is_some() {
            return Err(FileSystemError::AlreadyExists(name.to_string()));
        }
        self.insert(guard, dir, ino, name)
    }

    /// 删除第一个指向 `ino` 的目录项，目录块不回收
    pub fn remove(&self, guard: &InodeGuard, dir: &mut Directory, ino: u64) -> Result<()> {
        guard.check(dir.ino())?;
        if ino != 0 {
            for block in iter_chain(&self.store, dir.first_block())? {
                let block = block?;
                let slot = block.read(|b| slots().find(|&slot| dentry_ino(payload(b), slot) == ino));
                if let Some(slot) = slot {
                    block.modify(|b| payload_mut(b)[slot_range(slot)].fill(0));
                    dir.inode.size = dir.inode.size.saturating_sub(1);
                    dir.inode.touch();
                    trace!(dir = dir.ino(), ino, block = block.index(), slot, "removed dentry");
                    return self.write_inode(&dir.inode);
                }
            }
        }
        Err(FileSystemError::NotFound(format!(
            "inode {} in directory {}",
            ino,
            dir.ino()
        )))
    }

    /// 按目录块链表顺序列出所有目录项
    pub fn read_dir(&self, dir: &Directory) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for block in iter_chain(&self.store, dir.first_block())? {
            block?.read(|b| {
                let data = payload(b);
                for slot in slots() {
                    let ino = dentry_ino(data, slot);
                    if ino != 0 {
                        entries.push(DirEntry {
                            ino,
                            name: String::from_utf8_lossy(dentry_name(data, slot)).into_owned(),
                        });
                    }
                }
            });
        }
        Ok(entries)
    }
}
