//! Concurrency tests: many threads mutating shared directories and the
//! shared block quota.

use std::sync::Arc;

use rand::Rng;
use ramfs::inode::{dirent_size, DIR_BASE_SIZE};
use ramfs::{FsError, FsOptions, Inode, InodeId, RamFs, BLOCK_SIZE, ROOT_INODE};

const THREADS: usize = 8;

/// Expected directory size from its current children.
fn expected_dir_size(dir: &Inode) -> u64 {
    let children: Vec<(String, InodeId)> = dir.as_dir().unwrap().children();
    DIR_BASE_SIZE + children.iter().map(|(name, _)| dirent_size(name)).sum::<u64>()
}

/// Sum of blocks charged by every registered inode.
fn charged_blocks(fs: &RamFs, inodes: &[InodeId]) -> u64 {
    inodes
        .iter()
        .filter_map(|&ino| fs.get_inode(ino))
        .map(|node| node.attr().blocks)
        .sum()
}

#[test]
fn test_parallel_creates_in_one_directory() {
    let fs: RamFs = RamFs::new(FsOptions::default()).unwrap();

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let fs: &RamFs = &fs;
            s.spawn(move || {
                for i in 0..100 {
                    fs.create_file(ROOT_INODE, &format!("t{}-{}", t, i), 0o644, 0, 0)
                        .unwrap();
                }
            });
        }
    });

    let root: Arc<Inode> = fs.get_inode(ROOT_INODE).unwrap();
    assert_eq!(root.as_dir().unwrap().child_count(), THREADS * 100 + 2);
    assert_eq!(root.attr().size, expected_dir_size(&root));
    assert_eq!(root.attr().blocks, root.attr().size.div_ceil(BLOCK_SIZE));
    assert_eq!(fs.inode_count(), THREADS * 100 + 1);
}

#[test]
fn test_racing_add_remove_same_names() {
    let fs: RamFs = RamFs::new(FsOptions::default()).unwrap();
    let dir: Arc<Inode> = fs.mkdir(ROOT_INODE, "race", 0o755, 0, 0).unwrap();

    std::thread::scope(|s| {
        for _ in 0..THREADS {
            let fs: &RamFs = &fs;
            let dir: &Arc<Inode> = &dir;
            s.spawn(move || {
                let mut rng = rand::rng();
                let node = dir.as_dir().unwrap();
                for _ in 0..500 {
                    let name: String = format!("n{}", rng.random_range(0..16));
                    if rng.random_bool(0.5) {
                        match node.add_child(fs, &name, 77) {
                            Ok(()) | Err(FsError::AlreadyExists(_)) => {}
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                    } else {
                        match node.remove_child(fs, &name) {
                            Ok(_) | Err(FsError::NotFound(_)) => {}
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                    }
                }
            });
        }
    });

    assert_eq!(dir.attr().size, expected_dir_size(&dir));
    assert_eq!(dir.attr().blocks, dir.attr().size.div_ceil(BLOCK_SIZE));
}

#[test]
fn test_concurrent_writers_respect_quota() {
    let limit: u64 = 64;
    let fs: RamFs = RamFs::new(FsOptions::default().with_quota_blocks(limit)).unwrap();
    let files: Vec<InodeId> = (0..THREADS)
        .map(|t| fs.create_file(ROOT_INODE, &format!("w{}", t), 0o644, 0, 0).unwrap().ino())
        .collect();

    std::thread::scope(|s| {
        for &ino in &files {
            let fs: &RamFs = &fs;
            s.spawn(move || {
                let chunk: Vec<u8> = vec![0xAB; BLOCK_SIZE as usize];
                let mut offset: u64 = 0;
                loop {
                    match fs.write(ino, offset, &chunk) {
                        Ok(n) => offset += n as u64,
                        Err(FsError::OutOfSpace { .. }) => break,
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            });
        }
    });

    let used: u64 = fs.quota().used();
    assert!(used <= limit);
    assert_eq!(fs.quota().available(), limit - used);

    let mut all: Vec<InodeId> = files.clone();
    all.push(ROOT_INODE);
    assert_eq!(charged_blocks(&fs, &all), used);
}

#[test]
fn test_rmdir_races_create_inside() {
    let fs: RamFs = RamFs::new(FsOptions::default()).unwrap();
    let baseline: u64 = fs.quota().used();

    for _ in 0..200 {
        let dir: InodeId = fs.mkdir(ROOT_INODE, "d", 0o755, 0, 0).unwrap().ino();
        let (removed, created) = std::thread::scope(|s| {
            let fs: &RamFs = &fs;
            let rmdir = s.spawn(move || fs.rmdir(ROOT_INODE, "d"));
            let create = s.spawn(move || fs.create_file(dir, "f", 0o644, 0, 0));
            (rmdir.join().unwrap(), create.join().unwrap())
        });

        match (removed, created) {
            (Ok(()), Ok(_)) => panic!("file created in a removed directory"),
            (Ok(()), Err(e)) => assert!(matches!(
                e,
                FsError::NotFound(_) | FsError::InodeNotFound(_)
            )),
            (Err(FsError::NotEmpty(_)), Ok(_)) => {
                fs.unlink(dir, "f").unwrap();
                fs.rmdir(ROOT_INODE, "d").unwrap();
            }
            (removed, created) => panic!("unexpected results: {:?} {:?}", removed, created.err()),
        }
    }

    assert_eq!(fs.inode_count(), 1);
    assert_eq!(fs.quota().used(), baseline);
}

#[test]
fn test_stat_while_mutating() {
    let fs: RamFs = RamFs::new(FsOptions::default()).unwrap();
    let root: Arc<Inode> = fs.get_inode(ROOT_INODE).unwrap();

    std::thread::scope(|s| {
        let fs_ref: &RamFs = &fs;
        s.spawn(move || {
            for i in 0..500 {
                let name: String = format!("f{}", i);
                fs_ref.create_file(ROOT_INODE, &name, 0o644, 0, 0).unwrap();
                fs_ref.unlink(ROOT_INODE, &name).unwrap();
            }
        });
        let root: &Arc<Inode> = &root;
        s.spawn(move || {
            for _ in 0..2000 {
                let attr = root.attr();
                assert_eq!(attr.blocks, attr.size.div_ceil(BLOCK_SIZE));
            }
        });
    });

    assert_eq!(root.attr().size, expected_dir_size(&root));
    assert_eq!(fs.inode_count(), 1);
}
