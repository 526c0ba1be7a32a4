use crate::disk::BLOCK_SIZE;

/*
 * 磁盘布局：
 *   0 | 引导块（保留不用）
 *   1 | 超级块
 *   2 | 第一个 inode 表   <-> 其余 inode 表 ...
 *   3 | 第一个块位图      <-> 其余块位图 ...
 *   4 | 第一个 inode 位图 <-> 其余 inode 位图 ...
 *   5 | 根目录的第一个目录块
 *   6 | 其余元数据链表块，然后是数据区
 */

/// 文件系统魔数
pub const MAGIC: u64 = 0x0c3e;

/// 磁盘格式版本（高 8 位主版本号，低 8 位次版本号）
pub const VERSION: u64 = 0x0100;

// 保留块号
pub const BOOT_BLOCK_ID: u64 = 0;
pub const SUPER_BLOCK_BLOCK_ID: u64 = 1;
pub const INODE_TABLE_START_BLOCK_ID: u64 = 2;
pub const BLOCK_BITMAP_START_BLOCK_ID: u64 = 3;
pub const INODE_BITMAP_START_BLOCK_ID: u64 = 4;
pub const ROOT_DIR_BLOCK_ID: u64 = 5;

/// 第一个可以由格式化程序分配给额外链表块的块号
pub const FIRST_FREE_BLOCK_ID: u64 = ROOT_DIR_BLOCK_ID + 1;

/// 根目录 inode 号
pub const ROOT_INO: u64 = 1;

/// 链表块尾部的 prev/next 指针占用的字节数
pub const LINK_TRAILER_SIZE: usize = 16;

/// 链表块中可用的数据区大小
pub const LINKED_PAYLOAD_SIZE: usize = BLOCK_SIZE - LINK_TRAILER_SIZE;

/// 每个位图块可以表示的对象数：4080 * 8 = 32640
pub const BITS_PER_BITMAP: u64 = (LINKED_PAYLOAD_SIZE * 8) as u64;

/// 每个 inode 64 字节，一个 inode 表块存 63 个
pub const INODE_SIZE: usize = 64;
pub const INODES_PER_TABLE: u64 = 63;

/// 每个目录项 64 字节，一个目录块存 63 个
pub const DENTRY_SIZE: usize = 64;
pub const DENTRIES_PER_BLOCK: u64 = 63;

/// 目录项中文件名字段的长度
pub const FILENAME_FIELD: usize = 56;

/// 文件名最大长度（字节），需要给结尾 NUL 留一个字节
pub const FILENAME_MAX: usize = FILENAME_FIELD - 1;

/// 每个文件索引块可以存放的数据块号个数：4080 / 8
pub const INDICES_PER_BLOCK: usize = LINKED_PAYLOAD_SIZE / 8;

/// 符号链接块中目标路径的最大长度
pub const SYMLINK_MAX: usize = BLOCK_SIZE - 2;

/// 卷标的字段长度（包含结尾 NUL）
pub const LABEL_MAX: usize = 32;

/// 超级块中固定字段之后的卷 ID 长度
pub const UUID_SIZE: usize = 16;

/// 默认的 inode 表数：第一个 inode 位图能表示的全部 inode
pub const DEFAULT_INODE_TABLES: u64 = BITS_PER_BITMAP / INODES_PER_TABLE + 1;
