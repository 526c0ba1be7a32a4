use std::sync::Arc;

use tracing::debug;

use crate::{
    disk::{BlockDevice, BlockStore, BLOCK_SIZE, ZERO_BLOCK},
    fs::{
        bitmap::set_bit,
        config::{
            BITS_PER_BITMAP, BLOCK_BITMAP_START_BLOCK_ID, BOOT_BLOCK_ID, DEFAULT_INODE_TABLES,
            FIRST_FREE_BLOCK_ID, INODE_BITMAP_START_BLOCK_ID, INODE_SIZE,
            INODE_TABLE_START_BLOCK_ID, LABEL_MAX, MAGIC, ROOT_DIR_BLOCK_ID, ROOT_INO,
            SUPER_BLOCK_BLOCK_ID, VERSION,
        },
        directory::write_dentry,
        error::{FileSystemError, Result},
        inode_table::{Inode, InodeType},
        linked_block::{payload_mut, set_next, set_prev},
        super_block::SuperBlock,
        FileSystem,
    },
    utils::generate_uuid,
};

/// 格式化参数
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub label: Option<String>,   // 卷标，少于 32 字节
    pub uuid: Option<[u8; 16]>,  // 不指定时随机生成
    pub inode_tables: u64,       // 初始 inode 表数
    pub inode_bitmaps: u64,      // 初始 inode 位图数
    pub root_uid: u32,           // 根目录属主
    pub root_gid: u32,
    pub zero_data: bool,         // 是否清零数据区
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            label: None,
            uuid: None,
            inode_tables: DEFAULT_INODE_TABLES,
            inode_bitmaps: 1,
            root_uid: 0,
            root_gid: 0,
            zero_data: false,
        }
    }
}

/// 各条元数据链表占用的块号，首块是固定块，其余块从 6 号开始连续分配
#[derive(Debug)]
struct Layout {
    inode_tables: Vec<u64>,
    block_bitmaps: Vec<u64>,
    inode_bitmaps: Vec<u64>,
    metadata_blocks: u64, // 0 .. metadata_blocks 全部是元数据
}

impl Layout {
    fn new(inode_tables: u64, block_bitmaps: u64, inode_bitmaps: u64) -> Self {
        let mut next = FIRST_FREE_BLOCK_ID;
        let mut chain = |first: u64, count: u64| {
            let mut blocks = vec![first];
            blocks.extend(next..next + count - 1);
            next += count - 1;
            blocks
        };
        let inode_tables = chain(INODE_TABLE_START_BLOCK_ID, inode_tables);
        let block_bitmaps = chain(BLOCK_BITMAP_START_BLOCK_ID, block_bitmaps);
        let inode_bitmaps = chain(INODE_BITMAP_START_BLOCK_ID, inode_bitmaps);
        Self {
            inode_tables,
            block_bitmaps,
            inode_bitmaps,
            metadata_blocks: next,
        }
    }
}

fn encode_label(label: Option<&str>) -> Result<[u8; LABEL_MAX]> {
    let mut field = [0u8; LABEL_MAX];
    if let Some(label) = label {
        if label.len() >= LABEL_MAX || label.contains('\0') {
            return Err(FileSystemError::InvalidArgument(format!(
                "label {:?} must be shorter than {} bytes",
                label, LABEL_MAX
            )));
        }
        field[..label.len()].copy_from_slice(label.as_bytes());
    }
    Ok(field)
}

/// 把 `indices` 写成一条环形链表，`fill` 填充每块的数据区
fn write_chain(
    store: &BlockStore,
    indices: &[u64],
    mut fill: impl FnMut(usize, &mut [u8]) -> Result<()>,
) -> Result<()> {
    let len = indices.len();
    for (position, &index) in indices.iter().enumerate() {
        let block = store.get(index)?;
        block.modify(|b| {
            b.fill(0);
            set_prev(b, indices[(position + len - 1) % len]);
            set_next(b, indices[(position + 1) % len]);
            fill(position, payload_mut(b))
        })?;
    }
    Ok(())
}

/// 在设备上创建一个新文件系统并挂载它
pub fn format(device: Arc<dyn BlockDevice>, options: &FormatOptions) -> Result<FileSystem> {
    let block_count = device.block_count();
    if options.inode_tables == 0 || options.inode_bitmaps == 0 {
        return Err(FileSystemError::InvalidArgument(
            "at least one inode table and one inode bitmap are required".to_string(),
        ));
    }
    let label = encode_label(options.label.as_deref())?;

    let block_bitmaps = block_count.div_ceil(BITS_PER_BITMAP).max(1);
    let layout = Layout::new(options.inode_tables, block_bitmaps, options.inode_bitmaps);
    if block_count <= layout.metadata_blocks {
        return Err(FileSystemError::InvalidArgument(format!(
            "volume of {} blocks is too small, metadata alone needs {}",
            block_count, layout.metadata_blocks
        )));
    }

    if options.zero_data {
        for blkno in layout.metadata_blocks..block_count {
            device.write_block(blkno, &ZERO_BLOCK)?;
        }
    }

    let store = BlockStore::new(Arc::clone(&device));
    store.get(BOOT_BLOCK_ID)?.modify(|b| b.fill(0));

    // inode 表：根目录 inode 在第一张表的 0 号槽
    let mut root = Inode::new(
        ROOT_INO,
        InodeType::Directory,
        0o755,
        options.root_uid,
        options.root_gid,
        ROOT_DIR_BLOCK_ID,
    );
    root.size = 2;
    root.link_count = 2;
    write_chain(&store, &layout.inode_tables, |position, tables| {
        if position == 0 {
            root.encode_into(&mut tables[..INODE_SIZE])?;
        }
        Ok(())
    })?;

    // 块位图：元数据块和卷末尾之后的位都预先置 1
    let metadata_blocks = layout.metadata_blocks;
    write_chain(&store, &layout.block_bitmaps, |position, bits| {
        let base = position as u64 * BITS_PER_BITMAP;
        for bit in 0..BITS_PER_BITMAP {
            let blkno = base + bit;
            if blkno < metadata_blocks || blkno >= block_count {
                set_bit(bits, bit as usize);
            }
        }
        Ok(())
    })?;

    // inode 位图：0 号不用，1 号是根目录
    write_chain(&store, &layout.inode_bitmaps, |position, bits| {
        if position == 0 {
            set_bit(bits, 0);
            set_bit(bits, ROOT_INO as usize);
        }
        Ok(())
    })?;

    write_chain(&store, &[ROOT_DIR_BLOCK_ID], |_, entries| {
        write_dentry(entries, 0, ROOT_INO, ".");
        write_dentry(entries, 1, ROOT_INO, "..");
        Ok(())
    })?;

    let super_block = SuperBlock {
        version: VERSION,
        magic: MAGIC,
        block_size: BLOCK_SIZE as u64,
        block_count,
        inode_table_first: INODE_TABLE_START_BLOCK_ID,
        inode_table_count: options.inode_tables,
        block_bitmap_first: BLOCK_BITMAP_START_BLOCK_ID,
        block_bitmap_count: block_bitmaps,
        inode_bitmap_first: INODE_BITMAP_START_BLOCK_ID,
        inode_bitmap_count: options.inode_bitmaps,
        inode_count: 1,
        free_block_count: block_count - metadata_blocks,
        label,
        uuid: options.uuid.unwrap_or_else(generate_uuid),
    };
    store
        .get(SUPER_BLOCK_BLOCK_ID)?
        .modify(|b| super_block.encode_into(b))?;

    store.sync_all()?;
    debug!(
        block_count,
        metadata_blocks,
        inode_tables = options.inode_tables,
        block_bitmaps,
        "formatted volume"
    );

    FileSystem::mount(device)
}
