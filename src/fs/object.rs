//! 创建/删除文件系统对象：分配 inode 和第一个块、初始化内容块、挂到父目录。

use tracing::debug;

use crate::{
    fs::{
        config::{INDICES_PER_BLOCK, ROOT_DIR_BLOCK_ID, ROOT_INO, SYMLINK_MAX},
        directory::{validate_name, Directory},
        error::{FileSystemError, Result},
        inode_table::{Inode, InodeType},
        linked_block::{iter_chain, payload, payload_mut, splice},
        lock::InodeGuard,
        reservation::Reservation,
        FileSystem,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    Directory,
    File,
    Symlink(String), // 链接目标
}

impl ObjectKind {
    fn inode_type(&self) -> InodeType {
        match self {
            Self::Directory => InodeType::Directory,
            Self::File => InodeType::File,
            Self::Symlink(_) => InodeType::Symlink,
        }
    }
}

/// 新对象的类型、权限和属主
#[derive(Debug, Clone)]
pub struct ObjectAttrs {
    pub kind: ObjectKind,
    pub perm: u16,
    pub uid: u32,
    pub gid: u32,
}

impl ObjectAttrs {
    pub fn dir(perm: u16) -> Self {
        Self::new(ObjectKind::Directory, perm)
    }

    pub fn file(perm: u16) -> Self {
        Self::new(ObjectKind::File, perm)
    }

    pub fn symlink(target: &str) -> Self {
        Self::new(ObjectKind::Symlink(target.to_string()), 0o777)
    }

    fn new(kind: ObjectKind, perm: u16) -> Self {
        Self {
            kind,
            perm,
            uid: 0,
            gid: 0,
        }
    }

    pub fn owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }
}

/// 文件索引块中第 `slot` 个数据块号
fn index_entry(entries: &[u8], slot: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&entries[slot * 8..slot * 8 + 8]);
    u64::from_le_bytes(bytes)
}

fn set_index_entry(entries: &mut [u8], slot: usize, blkno: u64) {
    entries[slot * 8..slot * 8 + 8].copy_from_slice(&blkno.to_le_bytes());
}

impl FileSystem {
    /// 在 `parent` 下创建一个新对象并返回它的 inode 记录。
    ///
    /// 目录得到一个空的目录块，普通文件得到一个索引块和一个数据块，
    /// 符号链接得到一个存放目标路径的块。任何一步失败都会归还已分配的块和 inode。
    pub fn create_object(
        &self,
        guard: &InodeGuard,
        parent: &mut Directory,
        name: &str,
        attrs: &ObjectAttrs,
    ) -> Result<Inode> {
        guard.check(parent.ino())?;
        validate_name(name)?;
        if let ObjectKind::Symlink(target) = &attrs.kind {
            if target.is_empty() || target.len() > SYMLINK_MAX {
                return Err(FileSystemError::InvalidArgument(format!(
                    "symlink target of {} bytes",
                    target.len()
                )));
            }
        }
        if self.find(parent, name)?.is_some() {
            return Err(FileSystemError::AlreadyExists(name.to_string()));
        }

        let ino = Reservation::inode(self, self.allocate_inode()?);
        let first = self.reserve_block()?;
        let mut inode = Inode::new(
            ino.index(),
            attrs.kind.inode_type(),
            attrs.perm,
            attrs.uid,
            attrs.gid,
            first.index(),
        );

        // 数据块的预留要活到函数结束，失败时才能一起回滚
        let mut data = None;
        match &attrs.kind {
            ObjectKind::Directory => {
                splice(&self.store, first.index(), None)?;
            }
            ObjectKind::File => {
                let index = splice(&self.store, first.index(), None)?;
                let block = self.reserve_block()?;
                self.store.get(block.index())?.modify(|b| b.fill(0));
                index.modify(|b| set_index_entry(payload_mut(b), 0, block.index()));
                data = Some(block);
            }
            ObjectKind::Symlink(target) => {
                self.store.get(first.index())?.modify(|b| {
                    b.fill(0);
                    b[..2].copy_from_slice(&(target.len() as u16).to_le_bytes());
                    b[2..2 + target.len()].copy_from_slice(target.as_bytes());
                });
                inode.size = target.len() as u64;
            }
        }

        let slot = self.locate_inode(inode.ino)?;
        slot.write(&inode)?;
        if let Err(e) = self.insert(guard, parent, inode.ino, name) {
            // inode 号会被回滚，槽里不能留下记录
            slot.clear();
            return Err(e);
        }

        if let Some(block) = data {
            block.commit();
        }
        first.commit();
        ino.commit();
        debug!(ino = inode.ino, parent = parent.ino(), name, kind = ?attrs.kind, "created object");
        Ok(inode)
    }

    /// 释放 inode 拥有的全部块，清空记录并归还 inode 号。
    ///
    /// 只处理存储，不修改指向它的目录项；目录必须为空。
    pub fn delete_object(&self, guard: &InodeGuard, ino: u64) -> Result<()> {
        guard.check(ino)?;
        if ino == ROOT_INO {
            return Err(FileSystemError::InvalidArgument(
                "root directory cannot be deleted".to_string(),
            ));
        }

        let slot = self.locate_inode(ino)?;
        let inode = slot.read()?;
        let blocks = self.owned_blocks(&inode)?;
        // 先校验全部块号，之后的释放不会中途失败
        let block_count = self.super_block.snapshot().block_count;
        if let Some(&bad) = blocks
            .iter()
            .find(|&&blkno| blkno <= ROOT_DIR_BLOCK_ID || blkno >= block_count)
        {
            return Err(FileSystemError::Corrupted(format!(
                "inode {} owns invalid block {}",
                ino, bad
            )));
        }

        for blkno in blocks {
            self.free_block(blkno)?;
        }
        slot.clear();
        self.free_inode(ino)?;
        debug!(ino, "deleted object");
        Ok(())
    }

    /// inode 占用的所有块
    fn owned_blocks(&self, inode: &Inode) -> Result<Vec<u64>> {
        let mut blocks = Vec::new();
        match inode.inode_type() {
            Some(InodeType::Directory) => {
                if inode.dentry_count() != 0 {
                    return Err(FileSystemError::InvalidArgument(format!(
                        "directory {} is not empty",
                        inode.ino
                    )));
                }
                for block in iter_chain(&self.store, inode.first_block)? {
                    blocks.push(block?.index());
                }
            }
            Some(InodeType::File) => {
                blocks = self.file_blocks(inode)?;
                for block in iter_chain(&self.store, inode.first_block)? {
                    blocks.push(block?.index());
                }
            }
            Some(InodeType::Symlink) => blocks.push(inode.first_block),
            None => {
                return Err(FileSystemError::Corrupted(format!(
                    "inode {} has unknown mode {:#o}",
                    inode.ino, inode.mode
                )));
            }
        }
        Ok(blocks)
    }

    /// 读取符号链接目标
    pub fn read_link(&self, inode: &Inode) -> Result<String> {
        if inode.inode_type() != Some(InodeType::Symlink) {
            return Err(FileSystemError::InvalidArgument(format!(
                "inode {} is not a symlink",
                inode.ino
            )));
        }
        self.store.get(inode.first_block)?.read(|b| {
            let len = u16::from_le_bytes([b[0], b[1]]) as usize;
            if len > SYMLINK_MAX {
                return Err(FileSystemError::Corrupted(format!(
                    "symlink {} claims {} bytes",
                    inode.ino, len
                )));
            }
            Ok(String::from_utf8_lossy(&b[2..2 + len]).into_owned())
        })
    }

    /// 文件索引块链中记录的全部数据块号
    pub fn file_blocks(&self, inode: &Inode) -> Result<Vec<u64>> {
        if inode.inode_type() != Some(InodeType::File) {
            return Err(FileSystemError::InvalidArgument(format!(
                "inode {} is not a regular file",
                inode.ino
            )));
        }
        let mut blocks = Vec::new();
        for block in iter_chain(&self.store, inode.first_block)? {
            block?.read(|b| {
                let entries = payload(b);
                blocks.extend(
                    (0..INDICES_PER_BLOCK)
                        .map(|slot| index_entry(entries, slot))
                        .filter(|&blkno| blkno != 0),
                );
            });
        }
        Ok(blocks)
    }
}
