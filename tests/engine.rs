use std::{collections::HashSet, sync::Arc, thread};

use linked_fs::{
    fs::{
        bitmap::BitmapKind,
        config::{
            BITS_PER_BITMAP, DENTRIES_PER_BLOCK, FILENAME_MAX, INODES_PER_TABLE, INODE_SIZE,
            LINKED_PAYLOAD_SIZE, ROOT_DIR_BLOCK_ID, ROOT_INO, SUPER_BLOCK_BLOCK_ID,
        },
        linked_block::chain_len,
        super_block::SuperBlock,
    },
    BlockDevice, FileDisk, FileSystem, FileSystemError, FormatOptions, InodeType, MemDisk, ObjectAttrs, Result,
};

// 2 张 inode 表、1 个块位图、1 个 inode 位图：0..7 号块是元数据
const METADATA_BLOCKS: u64 = 7;

fn options() -> FormatOptions {
    FormatOptions {
        label: Some("engine".to_string()),
        inode_tables: 2,
        ..Default::default()
    }
}

fn volume(blocks: u64) -> (Arc<MemDisk>, FileSystem) {
    let disk = Arc::new(MemDisk::new(blocks));
    let fs = FileSystem::format(disk.clone(), &options()).unwrap();
    (disk, fs)
}

// 下一个 allocate_block 会拿到的块号
fn next_free_block(fs: &FileSystem) -> Result<u64> {
    let next = fs.allocate_block()?;
    fs.free_block(next)?;
    Ok(next)
}

fn fill_inode_bitmap(fs: &FileSystem) -> Result<()> {
    let sb = fs.super_block();
    for position in 0..sb.inode_bitmap_count as i64 {
        fs.walk(sb.inode_bitmap_first, position)?
            .modify(|b| b[..LINKED_PAYLOAD_SIZE].fill(0xFF));
    }
    Ok(())
}

fn on_disk_super_block(disk: &MemDisk, blocks: u64) -> SuperBlock {
    SuperBlock::decode(&disk.snapshot(SUPER_BLOCK_BLOCK_ID).unwrap(), blocks).unwrap()
}

#[test]
fn format_then_mount_sees_the_same_volume() -> Result<()> {
    let (disk, fs) = volume(1024);
    let stat = fs.statfs();
    assert_eq!(stat.blocks, 1024);
    assert_eq!(stat.free_blocks, 1024 - METADATA_BLOCKS);
    assert_eq!(stat.inodes, 1);
    assert_eq!(stat.free_inodes, BITS_PER_BITMAP - 1);
    assert_eq!(stat.name_max, FILENAME_MAX as u64);
    assert_eq!(stat.label, "engine");
    fs.unmount()?;

    let fs = FileSystem::mount(disk)?;
    assert_eq!(fs.statfs(), stat);
    let root = fs.root()?;
    assert_eq!(root.first_block(), ROOT_DIR_BLOCK_ID);
    let names: Vec<String> = fs.read_dir(&root)?.into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec![".", ".."]);
    assert_eq!(fs.count_free_blocks()?, 1024 - METADATA_BLOCKS);
    Ok(())
}

#[test]
fn mount_rejects_blank_device() {
    let disk = Arc::new(MemDisk::new(64));
    assert!(matches!(
        FileSystem::mount(disk),
        Err(FileSystemError::BadMagic(0))
    ));
}

#[test]
fn format_rejects_tiny_volume_and_long_label() {
    let disk = Arc::new(MemDisk::new(METADATA_BLOCKS));
    assert!(matches!(
        FileSystem::format(disk, &options()),
        Err(FileSystemError::InvalidArgument(_))
    ));

    let disk = Arc::new(MemDisk::new(64));
    let long = FormatOptions {
        label: Some("x".repeat(32)),
        ..options()
    };
    assert!(matches!(
        FileSystem::format(disk, &long),
        Err(FileSystemError::InvalidArgument(_))
    ));
}

#[test]
fn allocated_blocks_test_set_until_freed() -> Result<()> {
    let (_disk, fs) = volume(1024);

    let mut seen = HashSet::new();
    for expected in METADATA_BLOCKS..METADATA_BLOCKS + 100 {
        let blkno = fs.allocate_block()?;
        // 首次适配：按顺序拿到最小的空闲块
        assert_eq!(blkno, expected);
        assert!(seen.insert(blkno));
        assert!(fs.is_block_allocated(blkno)?);
    }

    fs.free_block(50)?;
    assert!(!fs.is_block_allocated(50)?);
    let free = fs.super_block().free_block_count;
    fs.free_block(50)?;
    assert_eq!(fs.super_block().free_block_count, free);

    // 释放过的块会被再次分配
    assert_eq!(fs.allocate_block()?, 50);
    Ok(())
}

#[test]
fn reserved_and_out_of_range_blocks_are_protected() -> Result<()> {
    let (_disk, fs) = volume(1024);
    let free = fs.super_block().free_block_count;

    for reserved in 0..=ROOT_DIR_BLOCK_ID {
        fs.free_block(reserved)?;
        assert!(fs.is_block_allocated(reserved)?);
    }
    assert_eq!(fs.super_block().free_block_count, free);

    assert!(matches!(
        fs.free_block(1024),
        Err(FileSystemError::InvalidBlock(1024))
    ));
    // 块位图之外的对象视为未分配
    assert!(!fs.is_block_allocated(BITS_PER_BITMAP * 3)?);
    Ok(())
}

#[test]
fn block_bitmap_is_not_extendable() -> Result<()> {
    let (_disk, fs) = volume(20);
    let mut blocks = Vec::new();
    for _ in METADATA_BLOCKS..20 {
        blocks.push(fs.allocate_block()?);
    }
    assert!(blocks.iter().all(|&b| b < 20));
    assert!(matches!(
        fs.allocate_block(),
        Err(FileSystemError::ObjectsExhausted)
    ));
    assert_eq!(fs.super_block().block_bitmap_count, 1);
    assert_eq!(fs.super_block().free_block_count, 0);
    Ok(())
}

#[test]
fn free_block_count_tracks_allocations_and_frees() -> Result<()> {
    let (disk, fs) = volume(1024);
    let initial = on_disk_super_block(&disk, 1024).free_block_count;

    let allocated: Vec<u64> = (0..40).map(|_| fs.allocate_block()).collect::<Result<_>>()?;
    for &blkno in allocated.iter().step_by(3) {
        fs.free_block(blkno)?;
    }
    let frees = allocated.iter().step_by(3).count() as u64;

    fs.sync_super(true)?;
    let on_disk = on_disk_super_block(&disk, 1024).free_block_count;
    assert_eq!(on_disk, initial - 40 + frees);
    assert_eq!(fs.count_free_blocks()?, on_disk);
    Ok(())
}

#[test]
fn spliced_chain_is_circular() -> Result<()> {
    let (_disk, fs) = volume(1024);
    let entry = fs.allocate_block()?;
    let head = fs.splice(entry, None)?;

    let mut last = head.index();
    for _ in 0..4 {
        let tail = fs.walk(entry, -1)?;
        last = fs.splice(fs.allocate_block()?, Some(&tail))?.index();
    }

    assert_eq!(chain_len(fs.store(), entry)?, 5);
    assert_eq!(fs.walk(entry, 5)?.index(), entry);
    assert_eq!(fs.walk(entry, -5)?.index(), entry);
    assert_eq!(fs.walk(entry, -1)?.index(), last);

    assert!(matches!(
        fs.walk(1, 0),
        Err(FileSystemError::InvalidChain(1))
    ));
    Ok(())
}

#[test]
fn full_inode_bitmap_extends_by_one_block() -> Result<()> {
    let (_disk, fs) = volume(4096);

    for k in 1..=2u64 {
        // 把现有的位图块全部填满
        let sb = fs.super_block();
        assert_eq!(sb.inode_bitmap_count, k);
        for position in 0..k as i64 {
            fs.walk(sb.inode_bitmap_first, position)?
                .modify(|b| b[..LINKED_PAYLOAD_SIZE].fill(0xFF));
        }
        let (free, tables) = (sb.free_block_count, sb.inode_table_count);

        let ino = fs.allocate_inode()?;
        assert_eq!(ino, k * BITS_PER_BITMAP);

        let sb = fs.super_block();
        assert_eq!(sb.inode_bitmap_count, k + 1);
        assert!(fs.is_ino_valid(ino)?);
        // inode 表跟着增长到能容纳新的 inode
        assert_eq!(sb.inode_table_count, (ino - ROOT_INO) / INODES_PER_TABLE + 1);
        // 一个新位图块加上新追加的 inode 表
        assert_eq!(free - sb.free_block_count, 1 + sb.inode_table_count - tables);
        assert_eq!(fs.read_inode(ino)?.ino, 0);
    }
    assert_eq!(fs.count_free_blocks()?, fs.super_block().free_block_count);
    Ok(())
}

#[test]
fn inode_numbers_address_table_blocks() -> Result<()> {
    let (_disk, fs) = volume(1024);
    let mut last = ROOT_INO;
    while last < ROOT_INO + 3 * INODES_PER_TABLE {
        last = fs.allocate_inode()?;
    }
    let sb = fs.super_block();
    assert_eq!(sb.inode_table_count, 4);
    assert_eq!(sb.inode_count, 1 + 3 * INODES_PER_TABLE);

    for n in 0..4 {
        let ino = ROOT_INO + n * INODES_PER_TABLE;
        let slot = fs.locate_inode(ino)?;
        assert_eq!(slot.slot, 0);
        assert_eq!(slot.block.index(), fs.walk(sb.inode_table_first, n as i64)?.index());
    }
    let slot = fs.locate_inode(ROOT_INO + INODES_PER_TABLE + 5)?;
    assert_eq!(slot.slot, 5);

    assert!(matches!(
        fs.locate_inode(0),
        Err(FileSystemError::InvalidInode(0))
    ));
    assert!(matches!(
        fs.locate_inode(last + 1),
        Err(FileSystemError::InvalidInode(_))
    ));

    fs.free_inode(last)?;
    assert!(!fs.is_ino_valid(last)?);
    assert_eq!(fs.super_block().inode_count, 3 * INODES_PER_TABLE);
    // 0 号和根目录永远不会被释放
    fs.free_inode(0)?;
    fs.free_inode(ROOT_INO)?;
    assert!(fs.is_ino_valid(ROOT_INO)?);
    assert_eq!(fs.super_block().inode_count, 3 * INODES_PER_TABLE);
    Ok(())
}

#[test]
fn dentry_lifecycle() -> Result<()> {
    let (_disk, fs) = volume(1024);
    let mut root = fs.root()?;
    let root_guard = fs.lock_inode(ROOT_INO);
    let dir = fs.create_object(&root_guard, &mut root, "work", &ObjectAttrs::dir(0o755))?;
    drop(root_guard);

    let mut dir = fs.open_dir(dir.ino)?;
    let guard = fs.lock_inode(dir.ino());
    assert_eq!((dir.blocks(), dir.dentry_count()), (1, 0));

    fs.insert(&guard, &mut dir, 42, "a")?;
    assert_eq!(fs.find(&dir, "a")?, Some(42));
    fs.remove(&guard, &mut dir, 42)?;
    assert_eq!(fs.find(&dir, "a")?, None);
    assert_eq!(dir.dentry_count(), 0);

    let count = DENTRIES_PER_BLOCK + 1;
    for i in 0..count {
        fs.insert(&guard, &mut dir, 100 + i, &format!("entry-{}", i))?;
    }
    assert_eq!(dir.blocks(), 2);
    assert_eq!(dir.size(), 2 * 4096);
    assert_eq!(dir.dentry_count(), count);
    assert_eq!(fs.find(&dir, &format!("entry-{}", count - 1))?, Some(100 + count - 1));

    // 计数器已经写回 inode 记录
    let reopened = fs.open_dir(dir.ino())?;
    assert_eq!((reopened.blocks(), reopened.dentry_count()), (2, count));
    assert_eq!(fs.read_dir(&reopened)?.len() as u64, count);

    // 删除后空槽被重用，目录块不回收
    fs.remove(&guard, &mut dir, 100)?;
    fs.insert(&guard, &mut dir, 7, "reused")?;
    assert_eq!(dir.blocks(), 2);
    assert_eq!(fs.read_dir(&dir)?[0].name, "reused");
    Ok(())
}

#[test]
fn invalid_names_leave_volume_untouched() -> Result<()> {
    let (_disk, fs) = volume(1024);
    let mut root = fs.root()?;
    let guard = fs.lock_inode(ROOT_INO);
    let before = fs.super_block();

    assert!(matches!(
        fs.insert(&guard, &mut root, 9, ""),
        Err(FileSystemError::NameEmpty)
    ));
    assert!(matches!(
        fs.insert(&guard, &mut root, 9, &"n".repeat(FILENAME_MAX + 1)),
        Err(FileSystemError::NameTooLong(56))
    ));
    assert!(matches!(
        fs.create_object(&guard, &mut root, "", &ObjectAttrs::file(0o644)),
        Err(FileSystemError::NameEmpty)
    ));

    assert_eq!(fs.super_block(), before);
    assert_eq!(fs.root()?.dentry_count(), 2);

    fs.insert(&guard, &mut root, 9, &"n".repeat(FILENAME_MAX))?;
    assert_eq!(fs.find(&root, &"n".repeat(FILENAME_MAX))?, Some(9));
    Ok(())
}

#[test]
fn dentry_mutation_requires_the_directory_lock() -> Result<()> {
    let (_disk, fs) = volume(1024);
    let mut root = fs.root()?;
    let other = fs.lock_inode(ROOT_INO + 1);
    assert!(matches!(
        fs.insert(&other, &mut root, 9, "x"),
        Err(FileSystemError::LockNotHeld(ROOT_INO))
    ));
    assert!(matches!(
        fs.remove(&other, &mut root, ROOT_INO),
        Err(FileSystemError::LockNotHeld(ROOT_INO))
    ));
    Ok(())
}

#[test]
fn duplicate_names_only_rejected_in_strict_mode() -> Result<()> {
    let (_disk, fs) = volume(1024);
    let mut root = fs.root()?;
    let guard = fs.lock_inode(ROOT_INO);

    fs.insert(&guard, &mut root, 10, "dup")?;
    fs.insert(&guard, &mut root, 11, "dup")?;
    assert_eq!(fs.find(&root, "dup")?, Some(10));
    assert_eq!(root.dentry_count(), 4);

    assert!(matches!(
        fs.insert_unique(&guard, &mut root, 12, "dup"),
        Err(FileSystemError::AlreadyExists(_))
    ));
    fs.insert_unique(&guard, &mut root, 12, "fresh")?;

    assert!(matches!(
        fs.remove(&guard, &mut root, 999),
        Err(FileSystemError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn failed_directory_growth_frees_the_new_block() -> Result<()> {
    let (disk, fs) = volume(1024);
    let mut root = fs.root()?;
    let guard = fs.lock_inode(ROOT_INO);
    for i in root.dentry_count()..DENTRIES_PER_BLOCK {
        fs.insert(&guard, &mut root, 100 + i, &format!("f{}", i))?;
    }

    // 下一个空闲块就是目录扩展要用的块
    let next = fs.allocate_block()?;
    fs.free_block(next)?;
    disk.fail_reads_of(next);
    let before = fs.super_block();

    assert!(matches!(
        fs.insert(&guard, &mut root, 500, "overflow"),
        Err(FileSystemError::Io(_))
    ));
    assert!(!fs.is_block_allocated(next)?);
    assert_eq!(fs.super_block().free_block_count, before.free_block_count);
    assert_eq!(root.blocks(), 1);
    assert_eq!(root.dentry_count(), DENTRIES_PER_BLOCK);

    disk.clear_faults();
    fs.insert(&guard, &mut root, 500, "overflow")?;
    assert_eq!(root.blocks(), 2);
    Ok(())
}

#[test]
fn objects_release_everything_they_own() -> Result<()> {
    let (_disk, fs) = volume(1024);
    let mut root = fs.root()?;
    let guard = fs.lock_inode(ROOT_INO);
    let before = fs.super_block();

    let file = fs.create_object(&guard, &mut root, "data", &ObjectAttrs::file(0o640).owner(70000, 5))?;
    assert_eq!(file.inode_type(), Some(InodeType::File));
    assert_eq!((file.uid(), file.gid()), (70000, 5));
    assert_eq!(fs.file_blocks(&file)?.len(), 1);

    let link = fs.create_object(&guard, &mut root, "link", &ObjectAttrs::symlink("/data"))?;
    assert_eq!(fs.read_link(&link)?, "/data");
    assert_eq!(link.size, 5);

    let sub = fs.create_object(&guard, &mut root, "sub", &ObjectAttrs::dir(0o700))?;
    assert!(fs.open_dir(sub.ino)?.inode().is_dir());
    assert!(matches!(
        fs.create_object(&guard, &mut root, "sub", &ObjectAttrs::dir(0o700)),
        Err(FileSystemError::AlreadyExists(_))
    ));

    // 文件 2 块，符号链接 1 块，目录 1 块
    let sb = fs.super_block();
    assert_eq!(sb.free_block_count, before.free_block_count - 4);
    assert_eq!(sb.inode_count, before.inode_count + 3);

    for (name, ino) in [("data", file.ino), ("link", link.ino), ("sub", sub.ino)] {
        fs.remove(&guard, &mut root, ino)?;
        let object = fs.lock_inode(ino);
        fs.delete_object(&object, ino)?;
        assert!(!fs.is_ino_valid(ino)?);
        assert_eq!(fs.find(&root, name)?, None);
    }

    let sb = fs.super_block();
    assert_eq!(sb.free_block_count, before.free_block_count);
    assert_eq!(sb.inode_count, before.inode_count);
    assert_eq!(fs.count_free_blocks()?, sb.free_block_count);

    assert!(matches!(
        fs.delete_object(&guard, ROOT_INO),
        Err(FileSystemError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn concurrent_allocations_never_collide() -> Result<()> {
    let (_disk, fs) = volume(2048);
    let fs = Arc::new(fs);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let fs = Arc::clone(&fs);
            thread::spawn(move || (0..100).map(|_| fs.allocate_block()).collect::<Result<Vec<u64>>>())
        })
        .collect();

    let mut seen = HashSet::new();
    for worker in workers {
        for blkno in worker.join().unwrap()? {
            assert!(seen.insert(blkno), "block {} allocated twice", blkno);
        }
    }
    assert_eq!(seen.len(), 400);
    assert_eq!(fs.count_free_blocks()?, fs.super_block().free_block_count);
    Ok(())
}

#[test]
fn file_backed_volume_survives_remount() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("volume.img");

    {
        let disk = Arc::new(FileDisk::create(&path, 256)?);
        let fs = FileSystem::format(disk, &options())?;
        let mut root = fs.root()?;
        let guard = fs.lock_inode(ROOT_INO);
        fs.create_object(&guard, &mut root, "kept", &ObjectAttrs::file(0o644))?;
        drop(guard);
        fs.unmount()?;
    }

    let disk = Arc::new(FileDisk::open(&path)?);
    let fs = FileSystem::mount(disk)?;
    let root = fs.root()?;
    let ino = fs.find(&root, "kept")?.expect("entry written before unmount");
    assert_eq!(fs.read_inode(ino)?.inode_type(), Some(InodeType::File));
    assert_eq!(fs.count_free_blocks()?, fs.super_block().free_block_count);
    Ok(())
}

#[test]
fn cleared_inode_zero_bit_is_reported_as_corruption() -> Result<()> {
    let (disk, fs) = volume(256);
    let sb = fs.super_block();
    fs.walk(sb.inode_bitmap_first, 0)?.modify(|b| b[0] &= !1);

    assert!(matches!(
        fs.allocate_inode(),
        Err(FileSystemError::Corrupted(_))
    ));
    // 位图和计数器保持原样
    assert!(!fs.bitmap_test(BitmapKind::Inodes, 0)?);
    assert_eq!(fs.super_block(), sb);

    fs.unmount()?;
    assert!(matches!(
        FileSystem::mount(disk),
        Err(FileSystemError::Corrupted(_))
    ));
    Ok(())
}

#[test]
fn failed_inode_bitmap_extension_frees_the_new_block() -> Result<()> {
    let (disk, fs) = volume(4096);
    fill_inode_bitmap(&fs)?;
    let next = next_free_block(&fs)?;
    disk.fail_reads_of(next);
    let before = fs.super_block();

    assert!(matches!(fs.allocate_inode(), Err(FileSystemError::Io(_))));
    assert_eq!(fs.super_block(), before);
    assert!(!fs.is_block_allocated(next)?);
    assert_eq!(fs.count_free_blocks()?, before.free_block_count);

    disk.clear_faults();
    assert_eq!(fs.allocate_inode()?, BITS_PER_BITMAP);
    assert_eq!(fs.super_block().inode_bitmap_count, 2);
    Ok(())
}

#[test]
fn failed_inode_table_growth_frees_the_new_block() -> Result<()> {
    let (disk, fs) = volume(4096);
    fill_inode_bitmap(&fs)?;
    // 位图扩展用 next，第一张新 inode 表用 next + 1
    let next = next_free_block(&fs)?;
    disk.fail_reads_of(next + 1);
    let before = fs.super_block();

    assert!(matches!(fs.allocate_inode(), Err(FileSystemError::Io(_))));
    let sb = fs.super_block();
    assert_eq!(sb.inode_table_count, before.inode_table_count);
    assert_eq!(sb.inode_count, before.inode_count);
    assert!(!fs.is_ino_valid(BITS_PER_BITMAP)?);
    assert!(!fs.is_block_allocated(next + 1)?);
    // 扩展出来的位图块保留
    assert_eq!(sb.inode_bitmap_count, before.inode_bitmap_count + 1);
    assert!(fs.is_block_allocated(next)?);
    assert_eq!(sb.free_block_count, before.free_block_count - 1);
    assert_eq!(fs.count_free_blocks()?, sb.free_block_count);

    disk.clear_faults();
    assert_eq!(fs.allocate_inode()?, BITS_PER_BITMAP);
    assert!(fs.super_block().inode_table_count > before.inode_table_count);
    Ok(())
}

#[test]
fn delete_checks_every_owned_block_first() -> Result<()> {
    let (_disk, fs) = volume(1024);
    let mut root = fs.root()?;
    let guard = fs.lock_inode(ROOT_INO);
    let file = fs.create_object(&guard, &mut root, "data", &ObjectAttrs::file(0o644))?;
    let data = fs.file_blocks(&file)?[0];

    // 索引块第 1 项指向卷外
    let index = fs.store().get(file.first_block)?;
    index.modify(|b| b[8..16].copy_from_slice(&9999u64.to_le_bytes()));
    let before = fs.super_block();

    let object = fs.lock_inode(file.ino);
    assert!(matches!(
        fs.delete_object(&object, file.ino),
        Err(FileSystemError::Corrupted(_))
    ));
    assert!(fs.is_ino_valid(file.ino)?);
    assert_eq!(fs.read_inode(file.ino)?, file);
    assert!(fs.is_block_allocated(data)?);
    assert!(fs.is_block_allocated(file.first_block)?);
    assert_eq!(fs.super_block(), before);

    index.modify(|b| b[8..16].fill(0));
    fs.delete_object(&object, file.ino)?;
    assert!(!fs.is_ino_valid(file.ino)?);
    assert!(!fs.is_block_allocated(data)?);
    Ok(())
}

#[test]
fn failed_insert_leaves_no_inode_record() -> Result<()> {
    let (disk, fs) = volume(1024);
    let mut root = fs.root()?;
    let guard = fs.lock_inode(ROOT_INO);
    for i in root.dentry_count()..DENTRIES_PER_BLOCK {
        fs.insert(&guard, &mut root, 100 + i, &format!("f{}", i))?;
    }

    // 新目录的第一个块是 next，根目录扩展要用 next + 1
    let next = next_free_block(&fs)?;
    disk.fail_reads_of(next + 1);
    let before = fs.super_block();

    assert!(matches!(
        fs.create_object(&guard, &mut root, "sub", &ObjectAttrs::dir(0o755)),
        Err(FileSystemError::Io(_))
    ));
    let ino = ROOT_INO + 1;
    assert!(!fs.is_ino_valid(ino)?);
    let table = fs.walk(before.inode_table_first, 0)?;
    let slot = (ino - ROOT_INO) as usize * INODE_SIZE;
    assert!(table.read(|b| b[slot..slot + INODE_SIZE].iter().all(|&x| x == 0)));
    assert!(!fs.is_block_allocated(next)?);
    assert_eq!(fs.super_block(), before);
    assert_eq!(root.dentry_count(), DENTRIES_PER_BLOCK);
    Ok(())
}

#[test]
fn device_larger_than_volume_is_clamped() -> Result<()> {
    let (small, fs) = volume(1024);
    fs.unmount()?;
    let disk = Arc::new(MemDisk::new(2048));
    for blkno in 0..1024 {
        if let Some(block) = small.snapshot(blkno) {
            disk.write_block(blkno, &block)?;
        }
    }

    let fs = FileSystem::mount(disk)?;
    let before = fs.super_block();
    assert_eq!(before.block_count, 1024);
    assert!(matches!(
        fs.free_block(1500),
        Err(FileSystemError::InvalidBlock(1500))
    ));
    assert!(fs.is_block_allocated(1500)?);
    assert_eq!(fs.super_block(), before);
    assert!(matches!(
        fs.walk(1500, 0),
        Err(FileSystemError::InvalidChain(1500))
    ));
    Ok(())
}
