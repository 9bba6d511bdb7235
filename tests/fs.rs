//! End-to-end tests driving whole filesystems on throwaway disk images.

use std::path::PathBuf;
use t2fs::{Disk, Error, FileType, Mbr, T2fs};
use tempfile::TempDir;

/// The default test image size, in sectors.
const IMAGE_SECTORS: u64 = 8192;

/// Creates a partitioned image file inside `dir`.
fn new_image(dir: &TempDir, sectors: u64) -> PathBuf {
    let path = dir.path().join("disk.img");
    let mut disk = Disk::create(&path, sectors).unwrap();
    let mbr = Mbr::single_partition(sectors, "test").unwrap();
    mbr.write(&mut disk).unwrap();
    path
}

/// Creates and formats a fresh filesystem.
fn fresh_fs(dir: &TempDir, sectors_per_block: u8) -> T2fs {
    let path = new_image(dir, IMAGE_SECTORS);
    T2fs::format(Disk::open(&path).unwrap(), 0, sectors_per_block).unwrap()
}

/// Returns the names listed by `readdir` on `path`, in order.
fn list(fs: &mut T2fs, path: &str) -> Vec<String> {
    let fd = fs.opendir(path).unwrap();
    let mut names = Vec::new();
    while let Some(entry) = fs.readdir(fd).unwrap() {
        names.push(entry.name);
    }
    fs.closedir(fd).unwrap();
    names
}

#[test]
fn format_creates_root_with_dot_entries() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);

    let fd = fs.opendir("/").unwrap();
    let first = fs.readdir(fd).unwrap().unwrap();
    assert_eq!(first.name, ".");
    assert_eq!(first.kind, FileType::Directory);
    let second = fs.readdir(fd).unwrap().unwrap();
    assert_eq!(second.name, "..");
    assert_eq!(second.kind, FileType::Directory);
    assert!(fs.readdir(fd).unwrap().is_none());
    fs.closedir(fd).unwrap();

    // `.` and `..` both refer to the root itself.
    let meta = fs.stat("/").unwrap();
    assert_eq!(meta.kind, FileType::Directory);
    assert_eq!(meta.links, 2);
}

#[test]
fn mount_requires_format() {
    let dir = TempDir::new().unwrap();
    let path = new_image(&dir, IMAGE_SECTORS);
    let mut disk = Disk::open(&path).unwrap();
    assert!(!T2fs::probe(&mut disk, 0).unwrap());
    assert!(matches!(T2fs::mount(disk, 0), Err(Error::BadSuperblock)));

    let fs = T2fs::format(Disk::open(&path).unwrap(), 0, 1).unwrap();
    let mut disk = fs.into_disk();
    assert!(T2fs::probe(&mut disk, 0).unwrap());
    assert!(T2fs::mount(disk, 0).is_ok());
}

#[test]
fn format_rejects_bad_block_sizes() {
    let dir = TempDir::new().unwrap();
    let path = new_image(&dir, IMAGE_SECTORS);
    for spb in [0u8, 129] {
        let disk = Disk::open(&path).unwrap();
        assert!(matches!(
            T2fs::format(disk, 0, spb),
            Err(Error::BadGeometry)
        ));
    }
}

#[test]
fn create_write_read_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);

    let fd = fs.create("/a.txt").unwrap();
    assert!(fd > 0);
    assert_eq!(fs.write(fd, b"hello").unwrap(), 5);
    fs.seek(fd, 0).unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 5);
    assert_eq!(&buf, b"hello");
    // The position is at the end again: nothing more to read.
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 0);
    fs.close(fd).unwrap();

    assert_eq!(fs.stat("/a.txt").unwrap().size, 5);
}

#[test]
fn create_truncates_existing_file() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 1);
    let before = fs.statfs().unwrap();

    let fd = fs.create("/f").unwrap();
    fs.write(fd, &[7u8; 2000]).unwrap();
    fs.close(fd).unwrap();
    assert_eq!(fs.stat("/f").unwrap().size, 2000);

    let fd = fs.create("/f").unwrap();
    let meta = fs.stat("/f").unwrap();
    assert_eq!(meta.size, 0);
    assert_eq!(meta.blocks, 0);
    // All data and index blocks went back to the bitmap.
    let after = fs.statfs().unwrap();
    assert_eq!(after.blocks_used, before.blocks_used);
    fs.close(fd).unwrap();
}

#[test]
fn nested_directories() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);
    let before = fs.statfs().unwrap();

    fs.mkdir("/d").unwrap();
    let fd = fs.create("/d/x").unwrap();
    fs.close(fd).unwrap();
    assert_eq!(list(&mut fs, "/d"), vec![".", "..", "x"]);

    // A populated directory cannot be removed.
    assert!(matches!(fs.rmdir("/d"), Err(Error::NotEmpty)));
    fs.unlink("/d/x").unwrap();
    fs.rmdir("/d").unwrap();

    assert_eq!(list(&mut fs, "/"), vec![".", ".."]);
    assert!(matches!(fs.stat("/d"), Err(Error::NotFound)));
    // Bitmap accounting is restored exactly.
    let after = fs.statfs().unwrap();
    assert_eq!(after.inodes_used, before.inodes_used);
    assert_eq!(after.blocks_used, before.blocks_used);
}

#[test]
fn rmdir_guards() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);

    fs.mkdir("/d").unwrap();
    let fd = fs.create("/f").unwrap();
    fs.close(fd).unwrap();

    assert!(matches!(fs.rmdir("/"), Err(Error::Busy)));
    assert!(matches!(fs.rmdir("/f"), Err(Error::NotADirectory)));
    fs.chdir("/d").unwrap();
    assert!(matches!(fs.rmdir("/d"), Err(Error::Busy)));
    fs.chdir("/").unwrap();
    fs.rmdir("/d").unwrap();
}

#[test]
fn getcwd_walks_back_to_root() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);

    assert_eq!(fs.getcwd().unwrap(), "/");
    fs.mkdir("/a").unwrap();
    fs.mkdir("/a/b").unwrap();
    fs.chdir("/a/b").unwrap();
    assert_eq!(fs.getcwd().unwrap(), "/a/b");
    fs.chdir("..").unwrap();
    assert_eq!(fs.getcwd().unwrap(), "/a");

    // Relative resolution starts at the current directory.
    fs.chdir("b").unwrap();
    assert_eq!(fs.getcwd().unwrap(), "/a/b");
    fs.chdir("/").unwrap();
    assert_eq!(fs.getcwd().unwrap(), "/");
}

#[test]
fn symlink_resolution() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);

    let fd = fs.create("/a.txt").unwrap();
    fs.write(fd, b"payload").unwrap();
    fs.close(fd).unwrap();

    fs.symlink("/a.txt", "/l").unwrap();
    assert_eq!(fs.stat("/l").unwrap().kind, FileType::Symlink);

    // Opening through the link lands on the target's bytes.
    let fd = fs.open("/l").unwrap();
    let mut buf = [0u8; 7];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 7);
    assert_eq!(&buf, b"payload");
    fs.close(fd).unwrap();

    // A link in the middle of a path is always followed.
    fs.mkdir("/d").unwrap();
    let fd = fs.create("/d/f").unwrap();
    fs.close(fd).unwrap();
    fs.symlink("/d", "/ld").unwrap();
    assert_eq!(fs.stat("/ld/f").unwrap().kind, FileType::Regular);

    // Removing the link leaves the target alone.
    fs.unlink("/l").unwrap();
    assert!(matches!(fs.stat("/l"), Err(Error::NotFound)));
    assert_eq!(fs.stat("/a.txt").unwrap().size, 7);
}

#[test]
fn symlink_through_dangling_target() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);

    fs.symlink("/missing", "/l").unwrap();
    assert!(matches!(fs.open("/l"), Err(Error::NotFound)));
    // Creating through the link creates the target.
    let fd = fs.create("/l").unwrap();
    fs.close(fd).unwrap();
    assert_eq!(fs.stat("/missing").unwrap().kind, FileType::Regular);
}

#[test]
fn symlink_can_be_repointed() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);

    for name in ["/one", "/two"] {
        let fd = fs.create(name).unwrap();
        fs.write(fd, name.as_bytes()).unwrap();
        fs.close(fd).unwrap();
    }
    fs.symlink("/one", "/l").unwrap();
    fs.symlink("/two", "/l").unwrap();

    let fd = fs.open("/l").unwrap();
    let mut buf = [0u8; 4];
    fs.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"/two");
    fs.close(fd).unwrap();
}

#[test]
fn symlink_cycle_terminates() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);

    fs.symlink("/y", "/x").unwrap();
    fs.symlink("/x", "/y").unwrap();
    assert!(matches!(fs.open("/x"), Err(Error::TooManyLinks)));
    assert!(matches!(fs.stat("/x/tail"), Err(Error::TooManyLinks)));
}

#[test]
fn growth_across_indirection_boundaries() {
    let dir = TempDir::new().unwrap();
    // One sector per block: 3 direct blocks, then a fan-out of 64.
    let mut fs = fresh_fs(&dir, 1);

    // Three direct blocks, the whole singly indirect tree and one block of
    // the doubly indirect tree.
    let blocks = 3 + 64 + 1;
    let pattern: Vec<u8> = (0..blocks * 256).map(|i| (i * 31 % 251) as u8).collect();

    let fd = fs.create("/big").unwrap();
    assert_eq!(fs.write(fd, &pattern).unwrap(), pattern.len());
    let meta = fs.stat("/big").unwrap();
    assert_eq!(meta.size, pattern.len() as u32);
    assert_eq!(meta.blocks, blocks as u32);

    fs.seek(fd, 0).unwrap();
    let mut back = vec![0u8; pattern.len()];
    assert_eq!(fs.read(fd, &mut back).unwrap(), back.len());
    assert_eq!(back, pattern);

    // Reading straddling a block boundary inside the indirect region.
    fs.seek(fd, 250).unwrap();
    let mut slice = [0u8; 600];
    assert_eq!(fs.read(fd, &mut slice).unwrap(), 600);
    assert_eq!(&slice[..], &pattern[250..850]);
    fs.close(fd).unwrap();
}

#[test]
fn truncate_frees_tail_blocks() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 1);
    let empty = fs.statfs().unwrap();

    let fd = fs.create("/f").unwrap();
    fs.write(fd, &[1u8; 1000]).unwrap();
    // 4 data blocks: 3 direct plus 1 behind the singly indirect index.
    assert_eq!(fs.stat("/f").unwrap().blocks, 4);
    assert_eq!(fs.statfs().unwrap().blocks_used, empty.blocks_used + 5);

    fs.seek(fd, 300).unwrap();
    fs.truncate(fd).unwrap();
    let meta = fs.stat("/f").unwrap();
    assert_eq!(meta.size, 300);
    assert_eq!(meta.blocks, 2);
    // The emptied index block is released along with the data blocks.
    assert_eq!(fs.statfs().unwrap().blocks_used, empty.blocks_used + 2);

    // Truncating at the current size is a no-op.
    fs.truncate(fd).unwrap();
    let again = fs.stat("/f").unwrap();
    assert_eq!(again.size, 300);
    assert_eq!(again.blocks, 2);

    // Truncating at zero releases everything.
    fs.seek(fd, 0).unwrap();
    fs.truncate(fd).unwrap();
    assert_eq!(fs.stat("/f").unwrap().blocks, 0);
    assert_eq!(fs.statfs().unwrap().blocks_used, empty.blocks_used);
    fs.close(fd).unwrap();
}

#[test]
fn truncate_clamps_other_descriptors() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 1);

    let fd = fs.create("/f").unwrap();
    fs.write(fd, &[9u8; 600]).unwrap();
    let other = fs.open("/f").unwrap();
    fs.seek(other, 500).unwrap();

    fs.seek(fd, 100).unwrap();
    fs.truncate(fd).unwrap();
    // The second descriptor was pulled back to the new end: reading from it
    // yields nothing instead of stale bytes.
    let mut buf = [0u8; 16];
    assert_eq!(fs.read(other, &mut buf).unwrap(), 0);
    fs.close(other).unwrap();
    fs.close(fd).unwrap();
}

#[test]
fn seek_bounds() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);

    let fd = fs.create("/f").unwrap();
    fs.write(fd, b"0123456789").unwrap();

    assert!(matches!(fs.seek(fd, 11), Err(Error::BadOffset)));
    assert!(matches!(fs.seek(fd, -2), Err(Error::BadOffset)));
    fs.seek(fd, 10).unwrap();
    assert_eq!(fs.read(fd, &mut [0u8; 4]).unwrap(), 0);

    // -1 goes to the end of the file.
    fs.seek(fd, -1).unwrap();
    fs.write(fd, b"ab").unwrap();
    assert_eq!(fs.stat("/f").unwrap().size, 12);
    fs.close(fd).unwrap();
}

#[test]
fn unlink_of_open_file_releases_descriptor() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);
    let before = fs.statfs().unwrap();

    let fd = fs.create("/a.txt").unwrap();
    fs.write(fd, b"data").unwrap();
    fs.unlink("/a.txt").unwrap();

    // The descriptor died with the inode.
    assert!(matches!(fs.read(fd, &mut [0u8; 4]), Err(Error::BadDescriptor)));
    assert!(matches!(fs.close(fd), Err(Error::BadDescriptor)));
    // Inode and blocks are back in the bitmaps.
    let after = fs.statfs().unwrap();
    assert_eq!(after.inodes_used, before.inodes_used);
    assert_eq!(after.blocks_used, before.blocks_used);
}

#[test]
fn hard_links_share_the_inode() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);

    let fd = fs.create("/a").unwrap();
    fs.write(fd, b"shared").unwrap();
    fs.close(fd).unwrap();

    fs.link("/a", "/b").unwrap();
    assert_eq!(fs.stat("/a").unwrap().links, 2);
    let used = fs.statfs().unwrap().inodes_used;

    // Dropping one name leaves the contents reachable through the other.
    fs.unlink("/a").unwrap();
    let meta = fs.stat("/b").unwrap();
    assert_eq!(meta.links, 1);
    assert_eq!(meta.size, 6);
    assert_eq!(fs.statfs().unwrap().inodes_used, used);

    let fd = fs.open("/b").unwrap();
    let mut buf = [0u8; 6];
    fs.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"shared");
    fs.close(fd).unwrap();

    fs.unlink("/b").unwrap();
    assert_eq!(fs.statfs().unwrap().inodes_used, used - 1);
}

#[test]
fn hard_link_rejects_directories() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);
    fs.mkdir("/d").unwrap();
    assert!(matches!(fs.link("/d", "/l"), Err(Error::IsADirectory)));
    assert!(matches!(fs.link("/missing", "/l"), Err(Error::NotFound)));
}

#[test]
fn descriptor_pools_are_bounded() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);

    let fd = fs.create("/f").unwrap();
    fs.close(fd).unwrap();
    let fds: Vec<_> = (0..10).map(|_| fs.open("/f").unwrap()).collect();
    assert!(matches!(fs.open("/f"), Err(Error::TooManyOpenFiles)));

    // Only one directory may be open at a time.
    let dfd = fs.opendir("/").unwrap();
    assert!(matches!(fs.opendir("/"), Err(Error::TooManyOpenFiles)));
    fs.closedir(dfd).unwrap();
    assert!(fs.opendir("/").is_ok());

    for fd in fds {
        fs.close(fd).unwrap();
    }
    assert!(fs.open("/f").is_ok());
}

#[test]
fn descriptor_kind_checks() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);

    let fd = fs.create("/f").unwrap();
    assert!(matches!(fs.readdir(fd), Err(Error::BadDescriptor)));
    assert!(matches!(fs.closedir(fd), Err(Error::BadDescriptor)));
    fs.close(fd).unwrap();
    // A handle does not survive its close.
    assert!(matches!(fs.close(fd), Err(Error::BadDescriptor)));
    assert!(matches!(fs.seek(fd, 0), Err(Error::BadDescriptor)));
}

#[test]
fn readdir_spans_directory_blocks() {
    let dir = TempDir::new().unwrap();
    // One sector per block: 7 records per directory block.
    let mut fs = fresh_fs(&dir, 1);

    let mut expected = vec![".".to_owned(), "..".to_owned()];
    for i in 0..20 {
        let name = format!("file{i:02}");
        let fd = fs.create(&format!("/{name}")).unwrap();
        fs.close(fd).unwrap();
        expected.push(name);
    }
    let mut names = list(&mut fs, "/");
    names.sort();
    expected.sort();
    assert_eq!(names, expected);
}

#[test]
fn readdir_skips_deleted_records() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 1);

    for name in ["/a", "/b", "/c"] {
        let fd = fs.create(name).unwrap();
        fs.close(fd).unwrap();
    }
    fs.unlink("/b").unwrap();
    assert_eq!(list(&mut fs, "/"), vec![".", "..", "a", "c"]);

    // A freed slot is reused by the next insertion.
    let fd = fs.create("/d").unwrap();
    fs.close(fd).unwrap();
    assert_eq!(list(&mut fs, "/"), vec![".", "..", "a", "d", "c"]);
}

#[test]
fn contents_survive_remount() {
    let dir = TempDir::new().unwrap();
    let path = new_image(&dir, IMAGE_SECTORS);

    let mut fs = T2fs::format(Disk::open(&path).unwrap(), 0, 2).unwrap();
    fs.mkdir("/d").unwrap();
    let fd = fs.create("/d/f").unwrap();
    fs.write(fd, b"persistent").unwrap();
    fs.close(fd).unwrap();
    fs.symlink("/d/f", "/l").unwrap();
    drop(fs);

    let mut fs = T2fs::mount(Disk::open(&path).unwrap(), 0).unwrap();
    assert_eq!(list(&mut fs, "/d"), vec![".", "..", "f"]);
    let fd = fs.open("/l").unwrap();
    let mut buf = [0u8; 10];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 10);
    assert_eq!(&buf, b"persistent");
    fs.close(fd).unwrap();
}

#[test]
fn path_edge_cases() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);

    let fd = fs.create("/a.txt").unwrap();
    fs.close(fd).unwrap();
    fs.mkdir("/d").unwrap();

    // Consecutive and trailing slashes collapse.
    assert_eq!(fs.stat("//d//").unwrap().kind, FileType::Directory);
    assert!(fs.opendir("/d/").is_ok());

    assert!(matches!(fs.open(""), Err(Error::BadPath)));
    // A regular file cannot appear in the middle of a path.
    assert!(matches!(fs.open("/a.txt/x"), Err(Error::BadPath)));
    assert!(matches!(fs.stat("/a.txt/"), Err(Error::BadPath)));
    // A missing directory in the middle invalidates the path.
    assert!(matches!(fs.create("/nope/x"), Err(Error::BadPath)));

    assert!(matches!(fs.mkdir("/d"), Err(Error::AlreadyExists)));
    assert!(matches!(fs.open("/d"), Err(Error::IsADirectory)));
    assert!(matches!(fs.opendir("/a.txt"), Err(Error::NotADirectory)));
}

#[test]
fn names_are_bounded() {
    let dir = TempDir::new().unwrap();
    let mut fs = fresh_fs(&dir, 4);

    let long = "x".repeat(31);
    let fd = fs.create(&format!("/{long}")).unwrap();
    fs.close(fd).unwrap();
    assert_eq!(fs.stat(&format!("/{long}")).unwrap().kind, FileType::Regular);

    let too_long = "x".repeat(32);
    assert!(matches!(
        fs.create(&format!("/{too_long}")),
        Err(Error::BadName)
    ));
}
