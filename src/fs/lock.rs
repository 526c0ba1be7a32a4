//! 按 inode 加的互斥锁。修改目录内容的操作要求调用者出示目录 inode 的锁。

use std::collections::HashSet;

use parking_lot::{Condvar, Mutex};

use crate::fs::error::{FileSystemError, Result};

#[derive(Debug, Default)]
pub struct InodeLocks {
    held: Mutex<HashSet<u64>>, // 当前被持有的 inode
    released: Condvar,
}

impl InodeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 阻塞直到拿到 `ino` 的锁
    pub fn lock(&self, ino: u64) -> InodeGuard<'_> {
        let mut held = self.held.lock();
        while held.contains(&ino) {
            self.released.wait(&mut held);
        }
        held.insert(ino);
        InodeGuard { locks: self, ino }
    }

    pub fn try_lock(&self, ino: u64) -> Option<InodeGuard<'_>> {
        let mut held = self.held.lock();
        if !held.insert(ino) {
            return None;
        }
        Some(InodeGuard { locks: self, ino })
    }

    pub fn is_locked(&self, ino: u64) -> bool {
        self.held.lock().contains(&ino)
    }
}

/// 持有某个 inode 的排他锁，离开作用域时释放
#[derive(Debug)]
pub struct InodeGuard<'a> {
    locks: &'a InodeLocks,
    ino: u64,
}

impl InodeGuard<'_> {
    pub fn ino(&self) -> u64 {
        self.ino
    }

    /// 确认这把锁属于 `ino`
    pub fn check(&self, ino: u64) -> Result<()> {
        if self.ino != ino {
            return Err(FileSystemError::LockNotHeld(ino));
        }
        Ok(())
    }
}

impl Drop for InodeGuard<'_> {
    fn drop(&mut self) {
        self.locks.held.lock().remove(&self.ino);
        self.locks.released.notify_all();
    }
}
