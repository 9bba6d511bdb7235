//! On-disk inode records.
//!
//! Inodes live in a packed table right after the superblock. A record holds
//! the file type, the hard-link count, the size in bytes and the block
//! pointers: [`NUM_DIRECT`] direct pointers followed by one pointer per
//! indirection level.

use crate::error::{Error, Result};
use crate::volume::Volume;
use crate::{NUM_DIRECT, NUM_INDIRECT_LVL, SECTOR_SIZE, raw};
use std::mem::size_of;

/// The total number of block pointers in an inode.
pub(crate) const NUM_INODE_PTR: usize = NUM_DIRECT + NUM_INDIRECT_LVL;
/// The size of an inode record on disk, in bytes.
pub(crate) const INODE_SIZE: usize = size_of::<Inode>();
/// The inode of the root directory.
pub const ROOT_INODE: u32 = 1;

/// The type of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    /// A regular file.
    Regular,
    /// A directory.
    Directory,
    /// A symbolic link.
    Symlink,
}

impl FileType {
    /// Decodes the type field of an inode. `0` marks a free record and yields
    /// `None`.
    pub(crate) fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Regular),
            2 => Some(Self::Directory),
            3 => Some(Self::Symlink),
            _ => None,
        }
    }

    /// Encodes the type for the inode record.
    pub(crate) fn to_raw(self) -> u8 {
        match self {
            Self::Regular => 1,
            Self::Directory => 2,
            Self::Symlink => 3,
        }
    }
}

/// An inode record, as stored in the inode table.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub(crate) struct Inode {
    /// The file type; `0` marks a free record.
    pub kind: u8,
    /// The number of directory entries referring to this inode.
    pub hl_count: u8,
    /// Reserved bytes.
    reserved: [u8; 2],
    /// The size of the file in bytes.
    pub bytes_size: u32,
    /// The number of logical blocks allocated to the file.
    pub num_blocks: u32,
    /// Direct pointers, then singly, doubly, ... indirect pointers. `0` means
    /// "no block".
    pub pointers: [u32; NUM_INODE_PTR],
}

impl Inode {
    /// Returns a zeroed record of the given type.
    pub fn new(kind: FileType) -> Self {
        Self {
            kind: kind.to_raw(),
            ..Default::default()
        }
    }

    /// Returns the decoded file type, or an error for a free or mangled
    /// record.
    pub fn file_type(&self) -> Result<FileType> {
        FileType::from_raw(self.kind).ok_or(Error::Corrupted)
    }
}

/// Returns the sector (relative to the inode table) and the byte offset of
/// the `n`th inode record.
fn inode_position(n: u32) -> (u32, usize) {
    let per_sector = (SECTOR_SIZE / INODE_SIZE) as u32;
    (n / per_sector, (n % per_sector) as usize * INODE_SIZE)
}

impl Volume {
    /// Reads the `n`th inode record from the inode table.
    pub(crate) fn read_inode(&mut self, n: u32) -> Result<Inode> {
        if n == 0 || n >= self.sb.num_inodes {
            return Err(Error::OutOfRange);
        }
        let (sector, byte) = inode_position(n);
        let mut buf = [0u8; INODE_SIZE];
        self.read_sector_slice(self.sb.it_offset + sector, byte, &mut buf)?;
        Ok(raw::from_bytes(&buf))
    }

    /// Writes the `n`th inode record to the inode table.
    pub(crate) fn write_inode(&mut self, n: u32, inode: &Inode) -> Result<()> {
        if n == 0 || n >= self.sb.num_inodes {
            return Err(Error::OutOfRange);
        }
        let (sector, byte) = inode_position(n);
        self.write_sector_slice(self.sb.it_offset + sector, byte, raw::as_bytes(inode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout() {
        // 1 + 1 + 2 + 4 + 4 + 6 * 4, without padding.
        assert_eq!(INODE_SIZE, 36);
        assert_eq!(SECTOR_SIZE / INODE_SIZE, 7);
    }

    #[test]
    fn table_positions() {
        assert_eq!(inode_position(0), (0, 0));
        assert_eq!(inode_position(6), (0, 6 * INODE_SIZE));
        assert_eq!(inode_position(7), (1, 0));
        assert_eq!(inode_position(15), (2, INODE_SIZE));
    }
}
