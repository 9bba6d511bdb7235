//! The inode and block bitmaps.
//!
//! One bit per inode and one bit per data block, a set bit meaning "in use".
//! Index 0 is reserved in both maps: inode 0 and block 0 stand for "none" and
//! are never handed out.

use crate::error::{Error, Result};
use crate::inode::{FileType, Inode};
use crate::volume::Volume;
use crate::SECTOR_SIZE;

/// Which of the two bitmaps an operation addresses.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum BitmapKind {
    Inode,
    Block,
}

/// Returns the position of bit `n` in a bitmap region: the sector offset
/// within the region, the byte within the sector and the bit within the byte.
fn bit_position(n: u32) -> (u32, usize, u8) {
    let bits_per_sector = 8 * SECTOR_SIZE as u32;
    (
        n / bits_per_sector,
        (n % bits_per_sector) as usize / 8,
        (n % 8) as u8,
    )
}

impl Volume {
    /// Returns the base sector and entry count of the given bitmap.
    fn bitmap_region(&self, kind: BitmapKind) -> (u32, u32) {
        match kind {
            BitmapKind::Inode => (self.sb.ib_offset, self.sb.num_inodes),
            BitmapKind::Block => (self.sb.bb_offset, self.sb.num_blocks),
        }
    }

    /// Tells whether entry `n` of the given bitmap is in use.
    pub(crate) fn bitmap_get(&mut self, kind: BitmapKind, n: u32) -> Result<bool> {
        let (base, num) = self.bitmap_region(kind);
        if n >= num {
            return Err(Error::OutOfRange);
        }
        let (sector, byte, bit) = bit_position(n);
        let mut data = [0u8; 1];
        self.read_sector_slice(base + sector, byte, &mut data)?;
        Ok(data[0] & (1 << bit) != 0)
    }

    /// Marks entry `n` of the given bitmap as used or free.
    pub(crate) fn bitmap_set(&mut self, kind: BitmapKind, n: u32, used: bool) -> Result<()> {
        let (base, num) = self.bitmap_region(kind);
        if n >= num {
            return Err(Error::OutOfRange);
        }
        let (sector, byte, bit) = bit_position(n);
        let mut data = [0u8; 1];
        self.read_sector_slice(base + sector, byte, &mut data)?;
        if used {
            data[0] |= 1 << bit;
        } else {
            data[0] &= !(1 << bit);
        }
        self.write_sector_slice(base + sector, byte, &data)
    }

    /// Scans the given bitmap for the first free entry, skipping the reserved
    /// index 0.
    fn first_free(&mut self, kind: BitmapKind) -> Result<Option<u32>> {
        let (_, num) = self.bitmap_region(kind);
        for n in 1..num {
            if !self.bitmap_get(kind, n)? {
                return Ok(Some(n));
            }
        }
        Ok(None)
    }

    /// Allocates a free data block and returns its number.
    pub(crate) fn find_new_block(&mut self) -> Result<u32> {
        let block = self
            .first_free(BitmapKind::Block)?
            .ok_or(Error::NoFreeBlock)?;
        self.bitmap_set(BitmapKind::Block, block, true)?;
        Ok(block)
    }

    /// Allocates a free inode, stamps a zeroed record of the given type on it
    /// and returns its number.
    pub(crate) fn use_new_inode(&mut self, kind: FileType) -> Result<u32> {
        let ino = self
            .first_free(BitmapKind::Inode)?
            .ok_or(Error::NoFreeInode)?;
        self.write_inode(ino, &Inode::new(kind))?;
        self.bitmap_set(BitmapKind::Inode, ino, true)?;
        Ok(ino)
    }

    /// Clears the record and the bitmap bit of an inode whose hard-link count
    /// never became positive. Used to roll back a failed creation.
    pub(crate) fn free_inode(&mut self, ino: u32) -> Result<()> {
        self.write_inode(ino, &Inode::default())?;
        self.bitmap_set(BitmapKind::Inode, ino, false)
    }

    /// Counts the used entries in both bitmaps: `(inodes, blocks)`.
    pub(crate) fn bitmap_usage(&mut self) -> Result<(u32, u32)> {
        let mut counts = [0u32; 2];
        for (i, kind) in [BitmapKind::Inode, BitmapKind::Block].into_iter().enumerate() {
            let (_, num) = self.bitmap_region(kind);
            for n in 1..num {
                if self.bitmap_get(kind, n)? {
                    counts[i] += 1;
                }
            }
        }
        Ok((counts[0], counts[1]))
    }
}
