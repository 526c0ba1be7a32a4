use thiserror::Error;

/// 文件系统错误类型
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// 底层块读写失败，不会自动重试
    #[error("Disk I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 链表入口块不在元数据范围内
    #[error("Invalid chain entry block: {0}")]
    InvalidChain(u64),

    /// inode 号没有被分配或超出范围
    #[error("Invalid inode: {0}")]
    InvalidInode(u64),

    /// 块号超出卷的范围
    #[error("Invalid block index: {0}")]
    InvalidBlock(u64),

    /// 不可扩展的位图已经全部分配
    #[error("No free object left in bitmap")]
    ObjectsExhausted,

    #[error("File name too long: {0} bytes")]
    NameTooLong(usize),

    #[error("Empty file name")]
    NameEmpty,

    #[error("File or directory not found: {0}")]
    NotFound(String),

    #[error("File or directory already exists: {0}")]
    AlreadyExists(String),

    #[error("Expected a directory: inode {0}")]
    NotADirectory(u64),

    /// 超级块写回后没有到达稳定存储
    #[error("Super block sync failed")]
    SyncFailed,

    #[error("File system corrupted: {0}")]
    Corrupted(String),

    #[error("Bad magic number: {0:#x}")]
    BadMagic(u64),

    #[error("Unsupported version: {0:#x}")]
    VersionMismatch(u64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 调用者持有的锁不是目标 inode 的锁
    #[error("Exclusive lock on inode {0} not held")]
    LockNotHeld(u64),
}

/// 文件系统统一结果类型
pub type Result<T> = std::result::Result<T, FileSystemError>;
