use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    disk::BlockRef,
    fs::{
        config::{INODES_PER_TABLE, INODE_SIZE, ROOT_INO},
        error::{FileSystemError, Result},
        linked_block::{payload, payload_mut, splice, walk},
        reservation::Reservation,
        FileSystem,
    },
    utils::current_timestamp,
};

bitflags! {
    /// 文件类型和权限位，布局与 Unix 的 st_mode 相同
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InodeMode: u32 {
        const S_IFMT = 0o170000;
        const S_IFLNK = 0o120000;
        const S_IFREG = 0o100000;
        const S_IFDIR = 0o040000;

        const S_ISUID = 0o4000;
        const S_ISGID = 0o2000;
        const S_ISVTX = 0o1000;

        const S_IRUSR = 0o400;
        const S_IWUSR = 0o200;
        const S_IXUSR = 0o100;
        const S_IRGRP = 0o040;
        const S_IWGRP = 0o020;
        const S_IXGRP = 0o010;
        const S_IROTH = 0o004;
        const S_IWOTH = 0o002;
        const S_IXOTH = 0o001;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    File,      // 普通文件
    Directory, // 目录
    Symlink,   // 符号链接，指向另一个文件路径
}

impl InodeType {
    fn mode_bits(self) -> u32 {
        match self {
            Self::File => InodeMode::S_IFREG.bits(),
            Self::Directory => InodeMode::S_IFDIR.bits(),
            Self::Symlink => InodeMode::S_IFLNK.bits(),
        }
    }
}

impl InodeMode {
    pub fn new(kind: InodeType, perm: u16) -> Self {
        Self::from_bits_retain(kind.mode_bits() | (perm as u32 & 0o7777))
    }

    pub fn inode_type(self) -> Option<InodeType> {
        match self.bits() & Self::S_IFMT.bits() {
            bits if bits == Self::S_IFREG.bits() => Some(InodeType::File),
            bits if bits == Self::S_IFDIR.bits() => Some(InodeType::Directory),
            bits if bits == Self::S_IFLNK.bits() => Some(InodeType::Symlink),
            _ => None,
        }
    }

    pub fn permissions(self) -> u16 {
        (self.bits() & 0o7777) as u16
    }
}

/// inode 表中的一条记录（64 字节，小端序）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub ino: u64,         // inode 编号，空槽为 0
    pub size: u64,        // 文件大小（字节）；目录中是目录项个数
    pub link_count: u32,  // 硬链接数
    pub huid: u16,        // uid 高 16 位
    pub hgid: u16,        // gid 高 16 位
    pub first_block: u64, // 第一个数据/目录/索引块
    pub atime: u64,       // 最后访问时间
    pub ctime: u64,       // 状态改变时间
    pub mtime: u64,       // 最后修改时间
    pub mode: u32,        // 文件类型和权限
    pub uid: u16,         // uid 低 16 位
    pub gid: u16,         // gid 低 16 位
}

impl Inode {
    pub fn new(ino: u64, kind: InodeType, perm: u16, uid: u32, gid: u32, first_block: u64) -> Self {
        let now = current_timestamp();
        let mut inode = Self {
            ino,
            link_count: 1,
            first_block,
            atime: now,
            ctime: now,
            mtime: now,
            mode: InodeMode::new(kind, perm).bits(),
            ..Default::default()
        };
        inode.set_owner(uid, gid);
        inode
    }

    pub fn mode(&self) -> InodeMode {
        InodeMode::from_bits_retain(self.mode)
    }

    pub fn inode_type(&self) -> Option<InodeType> {
        self.mode().inode_type()
    }

    pub fn is_dir(&self) -> bool {
        self.inode_type() == Some(InodeType::Directory)
    }

    pub fn uid(&self) -> u32 {
        (self.huid as u32) << 16 | self.uid as u32
    }

    pub fn gid(&self) -> u32 {
        (self.hgid as u32) << 16 | self.gid as u32
    }

    pub fn set_owner(&mut self, uid: u32, gid: u32) {
        self.huid = (uid >> 16) as u16;
        self.uid = uid as u16;
        self.hgid = (gid >> 16) as u16;
        self.gid = gid as u16;
    }

    /// 目录项个数（仅对目录有意义）
    pub fn dentry_count(&self) -> u64 {
        self.size
    }

    // 更新修改时间和状态改变时间
    pub fn touch(&mut self) {
        let now = current_timestamp();
        self.mtime = now;
        self.ctime = now;
    }

    pub fn inc_link(&mut self) {
        self.link_count += 1;
    }

    pub fn dec_link(&mut self) {
        self.link_count = self.link_count.saturating_sub(1);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != INODE_SIZE {
            return Err(FileSystemError::Corrupted(format!(
                "inode record of {} bytes",
                bytes.len()
            )));
        }
        bincode::deserialize(bytes)
            .map_err(|e| FileSystemError::Corrupted(format!("inode decode: {}", e)))
    }

    pub fn encode_into(&self, bytes: &mut [u8]) -> Result<()> {
        bytes.fill(0);
        bincode::serialize_into(bytes, self)
            .map_err(|e| FileSystemError::Corrupted(format!("inode encode: {}", e)))
    }
}

/// inode 号 -> (inode 表在链表中的位置, 表内槽位)
pub fn inode_position(ino: u64) -> (u64, usize) {
    let index = ino - ROOT_INO;
    (index / INODES_PER_TABLE, (index % INODES_PER_TABLE) as usize)
}

/// inode 记录在缓存中的位置
#[derive(Debug, Clone)]
pub struct InodeSlot {
    pub ino: u64,
    pub block: BlockRef, // 所在的 inode 表块
    pub slot: usize,     // 表内下标
}

impl InodeSlot {
    fn range(&self) -> std::ops::Range<usize> {
        self.slot * INODE_SIZE..(self.slot + 1) * INODE_SIZE
    }

    pub fn read(&self) -> Result<Inode> {
        let inode = self
            .block
            .read(|b| Inode::decode(&payload(b)[self.range()]))?;
        // 刚分配的槽全为 0
        if inode.ino != 0 && inode.ino != self.ino {
            return Err(FileSystemError::Corrupted(format!(
                "slot of inode {} holds inode {}",
                self.ino, inode.ino
            )));
        }
        Ok(inode)
    }

    pub fn write(&self, inode: &Inode) -> Result<()> {
        let range = self.range();
        self.block
            .modify(|b| inode.encode_into(&mut payload_mut(b)[range]))
    }

    pub fn clear(&self) {
        let range = self.range();
        self.block.modify(|b| payload_mut(b)[range].fill(0));
    }
}

impl FileSystem {
    /// 定位 inode 记录。inode 号未分配时返回 `InvalidInode`
    pub fn locate_inode(&self, ino: u64) -> Result<InodeSlot> {
        if ino < ROOT_INO || !self.is_ino_valid(ino)? {
            return Err(FileSystemError::InvalidInode(ino));
        }

        let (position, slot) = inode_position(ino);
        let sb = self.super_block.snapshot();
        if position >= sb.inode_table_count {
            return Err(FileSystemError::Corrupted(format!(
                "inode {} lies beyond the {} inode tables",
                ino, sb.inode_table_count
            )));
        }

        let block = walk(&self.store, sb.inode_table_first, position as i64)?;
        trace!(ino, table = block.index(), slot, "located inode");
        Ok(InodeSlot { ino, block, slot })
    }

    pub fn read_inode(&self, ino: u64) -> Result<Inode> {
        self.locate_inode(ino)?.read()
    }

    /// 写回 inode 记录（只标记脏块）
    pub fn write_inode(&self, inode: &Inode) -> Result<()> {
        self.locate_inode(inode.ino)?.write(inode)
    }

    /// 分配一个 inode 号并清空它的记录槽，必要时追加 inode 表
    pub fn allocate_inode(&self) -> Result<u64> {
        let reservation = Reservation::inode(self, self.allocate_ino()?);
        let ino = reservation.index();

        self.ensure_inode_table(ino)?;
        self.locate_inode(ino)?.clear();

        debug!(ino, "allocated inode");
        Ok(reservation.commit())
    }

    // inode 位图扩展后，新的 inode 号可能落在现有 inode 表之外
    fn ensure_inode_table(&self, ino: u64) -> Result<()> {
        let _tables = self.inode_table_lock.lock();
        let (position, _) = inode_position(ino);

        loop {
            let sb = self.super_block.snapshot();
            if position < sb.inode_table_count {
                return Ok(());
            }

            let reservation = self.reserve_block()?;
            let tail = walk(&self.store, sb.inode_table_first, -1)?;
            splice(&self.store, reservation.index(), Some(&tail))?;
            let table = reservation.commit();

            self.super_block.update(|sb| sb.inode_table_count += 1);
            self.super_block.sync(&self.store, false)?;
            debug!(table, position = sb.inode_table_count, "appended inode table");
        }
    }
}
