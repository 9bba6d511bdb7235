//! T2FS, a user-space filesystem living inside one partition of a disk
//! image.
//!
//! The on-disk layout of a formatted partition is
//! `[superblock | inode table | inode bitmap | block bitmap | data blocks]`.
//! Files are inodes addressing logical blocks through direct and multi-level
//! indirect pointers; directories are files of packed `{name, inode}`
//! records; symbolic links store their target path in their single data
//! block.
//!
//! A filesystem is a plain value: open a [`Disk`], then [`T2fs::format`] or
//! [`T2fs::mount`] a partition of it. All state (superblock, current
//! directory, open descriptors) lives in the [`T2fs`] value, so several
//! filesystems can be driven from the same process.

mod alloc;
mod bitmap;
mod data;
mod dir;
mod disk;
mod error;
mod fd;
mod inode;
mod mbr;
mod path;
mod raw;
mod superblock;
mod volume;

pub use disk::Disk;
pub use error::{Error, Result};
pub use fd::Fd;
pub use inode::{FileType, ROOT_INODE};
pub use mbr::{Mbr, PartitionEntry};
pub use superblock::Superblock;

use fd::DescTable;
use log::debug;
use volume::Volume;

/// The size of a disk sector in bytes.
pub const SECTOR_SIZE: usize = 256;
/// The maximum length of a file name, terminator included.
pub const NAME_MAX: usize = 32;
/// The maximum length of a path, terminator included.
pub const PATH_MAX: usize = 1024;
/// The number of direct block pointers in an inode.
pub const NUM_DIRECT: usize = 3;
/// The number of indirection levels (singly, doubly, ... indirect).
pub const NUM_INDIRECT_LVL: usize = 3;
/// The maximum number of regular files open at once.
pub const MAX_OPEN_FILES: usize = 10;
/// The maximum number of symbolic link expansions in one resolution.
pub const MAX_SYMLINK_DEPTH: usize = 128;

/// Returns the identification of the library.
pub fn identify() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}

/// An entry returned by [`T2fs::readdir`].
#[derive(Debug)]
pub struct DirEntry {
    /// The name of the file.
    pub name: String,
    /// The type of the file.
    pub kind: FileType,
    /// The size of the file in bytes.
    pub size: u32,
}

/// Information about a file, returned by [`T2fs::stat`].
#[derive(Debug, Clone, Copy)]
pub struct Metadata {
    /// The type of the file.
    pub kind: FileType,
    /// The size of the file in bytes.
    pub size: u32,
    /// The number of logical blocks allocated to the file.
    pub blocks: u32,
    /// The number of directory entries referring to the file.
    pub links: u8,
}

/// Filesystem occupancy, returned by [`T2fs::statfs`].
#[derive(Debug, Clone, Copy)]
pub struct Usage {
    /// Inodes in use.
    pub inodes_used: u32,
    /// Total inodes.
    pub num_inodes: u32,
    /// Data blocks in use.
    pub blocks_used: u32,
    /// Total data blocks.
    pub num_blocks: u32,
}

/// A mounted T2FS filesystem.
pub struct T2fs {
    /// The mounted partition.
    vol: Volume,
    /// The inode of the current working directory.
    cwd: u32,
    /// The table of open files.
    fds: DescTable,
}

impl T2fs {
    /// Formats the `partition`th partition of `disk` with logical blocks of
    /// `sectors_per_block` sectors, then mounts it.
    ///
    /// Everything on the partition is lost. The root directory is created at
    /// inode 1 with its `.` and `..` entries.
    pub fn format(mut disk: Disk, partition: usize, sectors_per_block: u8) -> Result<Self> {
        let mbr = Mbr::read(&mut disk)?;
        let part = mbr.partition(partition)?;
        if part.last_sector as u64 >= disk.num_sectors() {
            return Err(Error::BadPartition);
        }
        let sb = Superblock::build(part.first_sector, part.num_sectors(), sectors_per_block)?;
        // Zero the inode table and both bitmaps, then install the superblock.
        let first = sb.first_sector as u64;
        let zero = [0u8; SECTOR_SIZE];
        for sector in sb.it_offset..sb.blocks_offset {
            disk.write_sector(first + sector as u64, &zero)?;
        }
        disk.write_sector(first, &sb.encode())?;
        let (num_blocks, block_size, num_inodes) = (sb.num_blocks, sb.block_size, sb.num_inodes);
        debug!(
            "formatted partition {partition}: {num_blocks} block(s) of {block_size} byte(s), \
             {num_inodes} inode(s)"
        );
        let mut fs = Self {
            vol: Volume { disk, sb },
            cwd: ROOT_INODE,
            fds: DescTable::default(),
        };
        let root = fs.vol.use_new_inode(FileType::Directory)?;
        if root != ROOT_INODE {
            return Err(Error::Corrupted);
        }
        fs.dir_insert(root, ".", root)?;
        fs.dir_insert(root, "..", root)?;
        Ok(fs)
    }

    /// Mounts the `partition`th partition of `disk`, which must have been
    /// formatted before.
    pub fn mount(disk: Disk, partition: usize) -> Result<Self> {
        let vol = Volume::mount(disk, partition)?;
        let (num_blocks, block_size) = (vol.sb.num_blocks, vol.sb.block_size);
        debug!("mounted partition {partition}: {num_blocks} block(s) of {block_size} byte(s)");
        Ok(Self {
            vol,
            cwd: ROOT_INODE,
            fds: DescTable::default(),
        })
    }

    /// Tells whether the `partition`th partition of `disk` carries a T2FS
    /// superblock.
    pub fn probe(disk: &mut Disk, partition: usize) -> Result<bool> {
        let mbr = Mbr::read(disk)?;
        let part = mbr.partition(partition)?;
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sector(part.first_sector as u64, &mut buf)?;
        Ok(Superblock::decode(&buf).is_ok())
    }

    /// Unmounts the filesystem, giving the disk back.
    pub fn into_disk(self) -> Disk {
        self.vol.disk
    }

    /// Returns a copy of the superblock of the mounted partition.
    pub fn geometry(&self) -> Superblock {
        self.vol.sb
    }

    /// Creates a regular file and opens it.
    ///
    /// An existing regular file at the same path is truncated to zero bytes
    /// instead.
    pub fn create(&mut self, path: &str) -> Result<Fd> {
        let res = self.vol.resolve(self.cwd, path, true)?;
        let ino = match res.node {
            None => {
                let ino = self.vol.use_new_inode(FileType::Regular)?;
                if let Err(e) = self.dir_insert(res.parent, &res.name, ino) {
                    let _ = self.vol.free_inode(ino);
                    return Err(e);
                }
                ino
            }
            Some((ino, FileType::Regular)) => {
                self.fds.clamp_positions(ino, 0);
                self.vol.deallocate_blocks(ino, None)?;
                let mut inode = self.vol.read_inode(ino)?;
                inode.bytes_size = 0;
                self.vol.write_inode(ino, &inode)?;
                ino
            }
            Some(_) => return Err(Error::IsADirectory),
        };
        self.fds.open(ino, FileType::Regular)
    }

    /// Opens an existing regular file, following symbolic links.
    pub fn open(&mut self, path: &str) -> Result<Fd> {
        let res = self.vol.resolve(self.cwd, path, true)?;
        match res.node {
            Some((ino, FileType::Regular)) => self.fds.open(ino, FileType::Regular),
            Some((_, FileType::Directory)) => Err(Error::IsADirectory),
            Some((_, FileType::Symlink)) => Err(Error::BadPath),
            None => Err(Error::NotFound),
        }
    }

    /// Closes an open regular file.
    pub fn close(&mut self, fd: Fd) -> Result<()> {
        if self.fds.release(fd, FileType::Regular) {
            Ok(())
        } else {
            Err(Error::BadDescriptor)
        }
    }

    /// Reads from the current position of the open file `fd` into `buf`,
    /// advancing the position by the number of bytes read.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let (ino, pos) = self
            .fds
            .get(fd, FileType::Regular)
            .map(|d| (d.inode, d.pos))
            .ok_or(Error::BadDescriptor)?;
        let n = self.vol.read_data(ino, pos, buf)?;
        if let Some(d) = self.fds.get(fd, FileType::Regular) {
            d.pos += n as u32;
        }
        Ok(n)
    }

    /// Writes `buf` at the current position of the open file `fd`, advancing
    /// the position by the number of bytes written.
    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize> {
        let (ino, pos) = self
            .fds
            .get(fd, FileType::Regular)
            .map(|d| (d.inode, d.pos))
            .ok_or(Error::BadDescriptor)?;
        let n = self.vol.write_data(ino, pos, buf)?;
        if let Some(d) = self.fds.get(fd, FileType::Regular) {
            d.pos += n as u32;
        }
        Ok(n)
    }

    /// Moves the position of the open file `fd` to `off` bytes from the
    /// start. `-1` moves to the end of the file; any other offset must not
    /// exceed the file size.
    pub fn seek(&mut self, fd: Fd, off: i64) -> Result<()> {
        let ino = self
            .fds
            .get(fd, FileType::Regular)
            .map(|d| d.inode)
            .ok_or(Error::BadDescriptor)?;
        let size = self.vol.read_inode(ino)?.bytes_size;
        let pos = if off == -1 {
            size
        } else {
            if off < 0 || off > size as i64 {
                return Err(Error::BadOffset);
            }
            off as u32
        };
        if let Some(d) = self.fds.get(fd, FileType::Regular) {
            d.pos = pos;
        }
        Ok(())
    }

    /// Cuts the open file `fd` down to its current position, releasing the
    /// blocks past it and clamping every open descriptor on the same inode.
    pub fn truncate(&mut self, fd: Fd) -> Result<()> {
        let (ino, pos) = self
            .fds
            .get(fd, FileType::Regular)
            .map(|d| (d.inode, d.pos))
            .ok_or(Error::BadDescriptor)?;
        let mut inode = self.vol.read_inode(ino)?;
        let count = if pos == 0 {
            None
        } else {
            Some(inode.num_blocks - pos.div_ceil(self.vol.block_size() as u32))
        };
        inode.bytes_size = pos;
        self.vol.write_inode(ino, &inode)?;
        self.fds.clamp_positions(ino, pos);
        self.vol.deallocate_blocks(ino, count)
    }

    /// Removes a regular file or a symbolic link. The terminal symbolic link
    /// is not followed: removing a link removes the link itself.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let res = self.vol.resolve(self.cwd, path, false)?;
        match res.node {
            Some((_, FileType::Directory)) => Err(Error::IsADirectory),
            Some(_) => self.dir_remove(res.parent, &res.name),
            None => Err(Error::NotFound),
        }
    }

    /// Creates a directory, with its `.` and `..` entries.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let res = self.vol.resolve(self.cwd, path, true)?;
        if res.node.is_some() {
            return Err(Error::AlreadyExists);
        }
        let ino = self.vol.use_new_inode(FileType::Directory)?;
        if let Err(e) = self.dir_insert(ino, ".", ino) {
            let _ = self.vol.free_inode(ino);
            return Err(e);
        }
        if let Err(e) = self.dir_insert(ino, "..", res.parent) {
            let _ = self.dir_remove(ino, ".");
            return Err(e);
        }
        if let Err(e) = self.dir_insert(res.parent, &res.name, ino) {
            let _ = self.dir_remove(ino, "..");
            let _ = self.dir_remove(ino, ".");
            return Err(e);
        }
        Ok(())
    }

    /// Removes an empty directory. The root and the current working
    /// directory are refused.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let res = self.vol.resolve(self.cwd, path, false)?;
        let Some((ino, kind)) = res.node else {
            return Err(Error::NotFound);
        };
        if kind != FileType::Directory {
            return Err(Error::NotADirectory);
        }
        if ino == ROOT_INODE || ino == self.cwd {
            return Err(Error::Busy);
        }
        if !self.vol.dir_is_empty(ino)? {
            return Err(Error::NotEmpty);
        }
        // Dropping `..`, `.` and the parent entry drives the directory's
        // hard-link count to zero, which frees the inode.
        self.dir_remove(ino, "..")?;
        self.dir_remove(ino, ".")?;
        self.dir_remove(res.parent, &res.name)
    }

    /// Changes the current working directory.
    pub fn chdir(&mut self, path: &str) -> Result<()> {
        let res = self.vol.resolve(self.cwd, path, true)?;
        match res.node {
            Some((ino, FileType::Directory)) => {
                self.cwd = ino;
                Ok(())
            }
            Some(_) => Err(Error::NotADirectory),
            None => Err(Error::NotFound),
        }
    }

    /// Returns the absolute path of the current working directory, rebuilt by
    /// walking `..` entries up to the root.
    pub fn getcwd(&mut self) -> Result<String> {
        let mut parts = Vec::new();
        let mut ino = self.cwd;
        while ino != ROOT_INODE {
            let parent = self.vol.lookup(ino, "..")?.ok_or(Error::Corrupted)?;
            let name = self.vol.name_of(parent, ino)?.ok_or(Error::Corrupted)?;
            parts.push(name);
            ino = parent;
            if parts.len() > PATH_MAX / 2 {
                return Err(Error::Corrupted);
            }
        }
        let mut out = String::new();
        for name in parts.iter().rev() {
            out.push('/');
            out.push_str(name);
        }
        if out.is_empty() {
            out.push('/');
        }
        if out.len() >= PATH_MAX {
            return Err(Error::BadPath);
        }
        Ok(out)
    }

    /// Opens a directory for enumeration.
    pub fn opendir(&mut self, path: &str) -> Result<Fd> {
        let res = self.vol.resolve(self.cwd, path, true)?;
        match res.node {
            Some((ino, FileType::Directory)) => self.fds.open(ino, FileType::Directory),
            Some(_) => Err(Error::NotADirectory),
            None => Err(Error::NotFound),
        }
    }

    /// Returns the next entry of the open directory `fd`, or `None` once
    /// every entry has been returned. Free record slots are skipped.
    pub fn readdir(&mut self, fd: Fd) -> Result<Option<DirEntry>> {
        let (ino, mut pos) = self
            .fds
            .get(fd, FileType::Directory)
            .map(|d| (d.inode, d.pos))
            .ok_or(Error::BadDescriptor)?;
        let size = self.vol.read_inode(ino)?.bytes_size;
        let bs = self.vol.block_size() as u32;
        let record_size = dir::RECORD_SIZE as u32;
        let entry = loop {
            if pos + record_size > size {
                break None;
            }
            let mut buf = [0u8; dir::RECORD_SIZE];
            let n = self.vol.read_data(ino, pos, &mut buf)?;
            if n < dir::RECORD_SIZE {
                break None;
            }
            pos += record_size;
            // A record never straddles blocks: skip an unusable block tail.
            let left = bs - pos % bs;
            if left < record_size {
                pos += left;
            }
            let record: dir::DirRecord = raw::from_bytes(&buf);
            if record.inode == 0 {
                continue;
            }
            let inode = self.vol.read_inode(record.inode)?;
            break Some(DirEntry {
                name: dir::unpack_name(&record.name),
                kind: inode.file_type()?,
                size: inode.bytes_size,
            });
        };
        if let Some(d) = self.fds.get(fd, FileType::Directory) {
            d.pos = pos;
        }
        Ok(entry)
    }

    /// Closes an open directory.
    pub fn closedir(&mut self, fd: Fd) -> Result<()> {
        if self.fds.release(fd, FileType::Directory) {
            Ok(())
        } else {
            Err(Error::BadDescriptor)
        }
    }

    /// Creates a symbolic link at `link` holding the path `target`, or
    /// repoints an existing symbolic link. The target may dangle; it must fit
    /// one data block, terminator included.
    pub fn symlink(&mut self, target: &str, link: &str) -> Result<()> {
        if target.is_empty()
            || target.len() >= PATH_MAX
            || target.len() >= self.vol.block_size()
            || target.as_bytes().contains(&0)
        {
            return Err(Error::BadPath);
        }
        let res = self.vol.resolve(self.cwd, link, false)?;
        let ino = match res.node {
            None => {
                let ino = self.vol.use_new_inode(FileType::Symlink)?;
                if let Err(e) = self.dir_insert(res.parent, &res.name, ino) {
                    let _ = self.vol.free_inode(ino);
                    return Err(e);
                }
                if let Err(e) = self.vol.allocate_new_block(ino) {
                    let _ = self.dir_remove(res.parent, &res.name);
                    return Err(e);
                }
                ino
            }
            Some((ino, FileType::Symlink)) => ino,
            Some(_) => return Err(Error::AlreadyExists),
        };
        let inode = self.vol.read_inode(ino)?;
        if inode.pointers[0] == 0 {
            return Err(Error::Corrupted);
        }
        let mut buf = vec![0u8; self.vol.block_size()];
        buf[..target.len()].copy_from_slice(target.as_bytes());
        self.vol.write_block(inode.pointers[0], &buf)
    }

    /// Creates a hard link at `link` to the regular file at `target`.
    /// Symbolic links in the target path are followed.
    pub fn link(&mut self, target: &str, link: &str) -> Result<()> {
        let target_res = self.vol.resolve(self.cwd, target, true)?;
        let ino = match target_res.node {
            Some((ino, FileType::Regular)) => ino,
            Some((_, FileType::Directory)) => return Err(Error::IsADirectory),
            Some((_, FileType::Symlink)) => return Err(Error::BadPath),
            None => return Err(Error::NotFound),
        };
        let res = self.vol.resolve(self.cwd, link, false)?;
        if res.node.is_some() {
            return Err(Error::AlreadyExists);
        }
        self.dir_insert(res.parent, &res.name, ino)
    }

    /// Returns information about the file at `path`. The terminal symbolic
    /// link is not followed.
    pub fn stat(&mut self, path: &str) -> Result<Metadata> {
        let res = self.vol.resolve(self.cwd, path, false)?;
        let Some((ino, kind)) = res.node else {
            return Err(Error::NotFound);
        };
        let inode = self.vol.read_inode(ino)?;
        Ok(Metadata {
            kind,
            size: inode.bytes_size,
            blocks: inode.num_blocks,
            links: inode.hl_count,
        })
    }

    /// Returns the occupancy of the filesystem, counted from the bitmaps.
    pub fn statfs(&mut self) -> Result<Usage> {
        let (inodes_used, blocks_used) = self.vol.bitmap_usage()?;
        Ok(Usage {
            inodes_used,
            num_inodes: self.vol.sb.num_inodes,
            blocks_used,
            num_blocks: self.vol.sb.num_blocks,
        })
    }
}
