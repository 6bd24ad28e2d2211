//! Integration tests for directory children bookkeeping.
//!
//! Operations tested:
//! - add: insert, duplicate rejection, quota rejection with a full quota
//! - remove: size restoration, missing names
//! - update: retarget without size change
//! - is_empty: live, dangling and zero-link children

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use ramfs::inode::{dirent_size, DirNode, DEFAULT_DIR_PERMS};
use ramfs::{FsError, FsOptions, Inode, InodeId, RamFs, BLOCK_SIZE, INO_NOTFOUND, ROOT_INODE};

fn create_fs() -> RamFs {
    RamFs::new(FsOptions::default()).unwrap()
}

/// Standalone directory with inode number 5, not linked into the tree.
fn create_dir(fs: &RamFs) -> DirNode {
    DirNode::new(fs, 5, DEFAULT_DIR_PERMS, 0, 0).unwrap()
}

// ============================================================================
// add_child
// ============================================================================

mod add {
    use super::*;

    #[test]
    fn test_add_then_duplicate() {
        let fs: RamFs = create_fs();
        let dir: DirNode = create_dir(&fs);

        dir.add_child(&fs, "a.txt", 10).unwrap();
        assert_eq!(
            dir.add_child(&fs, "a.txt", 11),
            Err(FsError::AlreadyExists("a.txt".to_string()))
        );
        assert_eq!(dir.child_inode_number_with_name("a.txt"), 10);
    }

    #[test]
    fn test_lookup_missing_returns_sentinel() {
        let fs: RamFs = create_fs();
        let dir: DirNode = create_dir(&fs);
        assert_eq!(dir.child_inode_number_with_name("nothing"), INO_NOTFOUND);
    }

    #[test]
    fn test_add_out_of_space_leaves_counter() {
        let fs: RamFs = RamFs::new(FsOptions::default().with_quota_blocks(1000)).unwrap();
        let root: Arc<Inode> = fs.get_inode(ROOT_INODE).unwrap();
        let dir: &DirNode = root.as_dir().unwrap();

        // Bring the counter to 999 of 1000.
        let used: u64 = fs.quota().used();
        fs.update_used_blocks((999 - used) as i64);
        assert_eq!(fs.quota().used(), 999);

        // An entry that pushes the root two blocks further.
        let size: u64 = dir.meta().size();
        let target_size: u64 = (dir.meta().blocks() + 1) * BLOCK_SIZE + 1;
        let name: String = "n".repeat((target_size - size - dirent_size("")) as usize);

        let result = dir.add_child(&fs, &name, 42);
        assert!(matches!(result, Err(FsError::OutOfSpace { requested: 2, .. })));
        assert_eq!(fs.quota().used(), 999);
        assert_eq!(dir.meta().size(), size);
        assert_eq!(dir.child(&name), None);
    }

    #[test]
    fn test_add_small_entry_when_quota_full() {
        let fs: RamFs = RamFs::new(FsOptions::default().with_quota_blocks(1000)).unwrap();
        let root: Arc<Inode> = fs.get_inode(ROOT_INODE).unwrap();
        let dir: &DirNode = root.as_dir().unwrap();

        let used: u64 = fs.quota().used();
        fs.update_used_blocks((1000 - used) as i64);
        let size: u64 = dir.meta().size();
        let blocks: u64 = dir.meta().blocks();
        // "x" still fits in the root's last block.
        assert!(size + dirent_size("x") <= blocks * BLOCK_SIZE);

        let result = dir.add_child(&fs, "x", 42);
        assert!(matches!(result, Err(FsError::OutOfSpace { requested: 1, available: 0 })));
        assert_eq!(fs.quota().used(), 1000);
        assert_eq!(dir.meta().size(), size);
        assert_eq!(dir.meta().blocks(), blocks);
        assert_eq!(dir.child("x"), None);
    }

    #[test]
    fn test_add_charges_quota() {
        let fs: RamFs = create_fs();
        let dir: DirNode = create_dir(&fs);
        let used: u64 = fs.quota().used();
        let blocks: u64 = dir.meta().blocks();

        let name: String = "x".repeat(1000);
        dir.add_child(&fs, &name, 7).unwrap();
        assert_eq!(fs.quota().used() - used, dir.meta().blocks() - blocks);
    }
}

// ============================================================================
// remove_child / update_child
// ============================================================================

mod remove {
    use super::*;

    #[test]
    fn test_remove_missing() {
        let fs: RamFs = create_fs();
        let dir: DirNode = create_dir(&fs);
        let size: u64 = dir.meta().size();

        assert_eq!(
            dir.remove_child(&fs, "missing"),
            Err(FsError::NotFound("missing".to_string()))
        );
        assert_eq!(dir.meta().size(), size);
    }

    #[test]
    fn test_add_remove_restores_exactly() {
        let fs: RamFs = create_fs();
        let dir: DirNode = create_dir(&fs);
        let used: u64 = fs.quota().used();

        for len in [1usize, 17, 300, 2000] {
            let size: u64 = dir.meta().size();
            let blocks: u64 = dir.meta().blocks();
            let name: String = "q".repeat(len);

            dir.add_child(&fs, &name, 9).unwrap();
            dir.remove_child(&fs, &name).unwrap();

            assert_eq!(dir.meta().size(), size);
            assert_eq!(dir.meta().blocks(), blocks);
        }
        assert_eq!(fs.quota().used(), used);
    }

    #[test]
    fn test_update_keeps_size() {
        let fs: RamFs = create_fs();
        let dir: DirNode = create_dir(&fs);
        dir.add_child(&fs, "x", 1).unwrap();
        let size: u64 = dir.meta().size();

        dir.update_child("x", 2).unwrap();
        assert_eq!(dir.child("x"), Some(2));
        assert_eq!(dir.meta().size(), size);
    }

    #[test]
    fn test_random_sequence_matches_model() {
        let fs: RamFs = create_fs();
        let dir: DirNode = create_dir(&fs);
        let mut model: BTreeMap<String, InodeId> = BTreeMap::new();
        let mut rng = rand::rng();

        for _ in 0..2000 {
            let name: String = format!("f{}", rng.random_range(0..20));
            let ino: InodeId = rng.random_range(2..100);
            match rng.random_range(0..3) {
                0 => {
                    let expected_ok: bool = !model.contains_key(&name);
                    assert_eq!(dir.add_child(&fs, &name, ino).is_ok(), expected_ok);
                    model.entry(name).or_insert(ino);
                }
                1 => {
                    let expected: Option<InodeId> = model.remove(&name);
                    assert_eq!(dir.remove_child(&fs, &name).ok(), expected);
                }
                _ => {
                    let expected_ok: bool = model.contains_key(&name);
                    assert_eq!(dir.update_child(&name, ino).is_ok(), expected_ok);
                    if let Some(slot) = model.get_mut(&name) {
                        *slot = ino;
                    }
                }
            }
            let size: u64 = dir.meta().size();
            assert_eq!(dir.meta().blocks(), size.div_ceil(BLOCK_SIZE));
        }

        let expected: Vec<(String, InodeId)> = model.into_iter().collect();
        assert_eq!(dir.children(), expected);
    }
}

// ============================================================================
// is_empty
// ============================================================================

mod emptiness {
    use super::*;

    #[test]
    fn test_new_directory_is_empty() {
        let fs: RamFs = create_fs();
        let docs: Arc<Inode> = fs.mkdir(ROOT_INODE, "docs", 0o755, 0, 0).unwrap();
        assert!(docs.as_dir().unwrap().is_empty(&fs));
        assert_eq!(docs.as_dir().unwrap().child_count(), 2);
    }

    #[test]
    fn test_live_child_blocks_emptiness() {
        let fs: RamFs = create_fs();
        let docs: Arc<Inode> = fs.mkdir(ROOT_INODE, "docs", 0o755, 0, 0).unwrap();
        let file: Arc<Inode> = fs.create_file(docs.ino(), "a", 0o644, 0, 0).unwrap();
        assert!(!docs.as_dir().unwrap().is_empty(&fs));

        file.meta().dec_nlink();
        assert!(docs.as_dir().unwrap().is_empty(&fs));
    }

    #[test]
    fn test_dangling_child_does_not_block() {
        let fs: RamFs = create_fs();
        let dir: DirNode = create_dir(&fs);
        dir.add_child(&fs, ".", 5).unwrap();
        dir.add_child(&fs, "..", ROOT_INODE).unwrap();
        dir.add_child(&fs, "ghost", 12345).unwrap();
        assert!(dir.is_empty(&fs));
    }

    #[test]
    fn test_root_subdirectory_blocks_emptiness() {
        let fs: RamFs = create_fs();
        fs.mkdir(ROOT_INODE, "sub", 0o755, 0, 0).unwrap();
        let root: Arc<Inode> = fs.get_inode(ROOT_INODE).unwrap();
        assert!(!root.as_dir().unwrap().is_empty(&fs));
    }
}
