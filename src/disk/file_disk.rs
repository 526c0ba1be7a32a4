use std::{
    fs::{File, OpenOptions},
    io::{Error, ErrorKind, Read, Result, Seek, SeekFrom, Write},
    path::Path,
};

use parking_lot::Mutex;
use tracing::debug;

use crate::disk::{
    block_device::BlockDevice,
    types::{Block, BLOCK_SIZE},
};

/// 以镜像文件作为后端的块设备
#[derive(Debug)]
pub struct FileDisk {
    file: Mutex<File>,
    block_count: u64,
}

impl FileDisk {
    /// 创建（或截断扩展）一个镜像文件，大小为 `block_count` 个块
    pub fn create<P: AsRef<Path>>(path: P, block_count: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;

        let disk_size = block_count * BLOCK_SIZE as u64;
        if file.metadata()?.len() < disk_size {
            debug!(path = %path.as_ref().display(), block_count, "allocating disk image");
            file.set_len(disk_size)?;
        }

        Ok(Self {
            file: Mutex::new(file),
            block_count,
        })
    }

    /// 打开已有的镜像文件，块数由文件长度决定
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        let block_count = file.metadata()?.len() / BLOCK_SIZE as u64;

        Ok(Self {
            file: Mutex::new(file),
            block_count,
        })
    }

    fn check_range(&self, block_id: u64) -> Result<()> {
        if block_id >= self.block_count {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("block {} out of range ({} blocks)", block_id, self.block_count),
            ));
        }
        Ok(())
    }
}

impl BlockDevice for FileDisk {
    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()> {
        self.check_range(block_id)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(block_id * BLOCK_SIZE as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&self, block_id: u64, buf: &Block) -> Result<()> {
        self.check_range(block_id)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(block_id * BLOCK_SIZE as u64))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_data()
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }
}
