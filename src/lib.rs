//! 链式块文件系统的存储引擎：环形链表块、可扩展位图分配器、
//! inode 表寻址和目录项管理。

pub mod disk;
pub mod fs;
pub mod utils;

pub use disk::{BlockDevice, BlockStore, FileDisk, MemDisk};
pub use fs::{
    directory::{DirEntry, Directory},
    error::{FileSystemError, Result},
    format::FormatOptions,
    inode_table::{Inode, InodeMode, InodeType},
    lock::InodeGuard,
    object::{ObjectAttrs, ObjectKind},
    FileSystem, StatFs,
};
