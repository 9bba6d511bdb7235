//! The superblock of a formatted partition.
//!
//! The first sector of the partition describes the whole on-disk layout:
//! `[superblock | inode table | inode bitmap | block bitmap | data blocks]`.
//! All offsets are partition-relative and expressed in sectors.

use crate::error::{Error, Result};
use crate::inode::INODE_SIZE;
use crate::{SECTOR_SIZE, raw};

/// The magic string identifying a formatted partition.
const SIGNATURE: &[u8] = b"os sisopeiros";
/// The length of the signature field, in bytes.
const SIGNATURE_LEN: usize = 15;

/// The superblock structure, stored in the first sector of the partition.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Superblock {
    /// The number of disk sectors per logical data block.
    pub sectors_per_block: u8,
    /// The magic string, NUL-padded.
    signature: [u8; SIGNATURE_LEN],
    /// The size of a sector in bytes.
    pub sector_size: u16,
    /// The size of a logical data block in bytes.
    pub block_size: u32,
    /// The first sector of the partition on the disk.
    pub first_sector: u32,
    /// The number of sectors in the partition.
    pub num_sectors: u32,
    /// The number of logical data blocks.
    pub num_blocks: u32,
    /// The number of inodes.
    pub num_inodes: u32,
    /// The sector offset of the inode table.
    pub it_offset: u32,
    /// The sector offset of the inode bitmap.
    pub ib_offset: u32,
    /// The sector offset of the block bitmap.
    pub bb_offset: u32,
    /// The sector offset of the data block region.
    pub blocks_offset: u32,
}

/// Returns the largest number of logical blocks that fits in `avail` sectors
/// together with a bitmap large enough to describe them.
///
/// `sectors_per_block` is the number of sectors in a logical block.
fn max_blocks(sectors_per_block: u32, avail: u32) -> u32 {
    // Sectors consumed by `blocks` data blocks plus their bitmap.
    let cost = |blocks: u64| -> u64 {
        1 + (blocks - 1) / (8 * SECTOR_SIZE as u64) + sectors_per_block as u64 * blocks
    };
    let (mut low, mut high) = (2u64, avail as u64);
    while high - low > 1 {
        let mid = low + (high - low) / 2;
        if cost(mid) <= avail as u64 {
            low = mid;
        } else {
            high = mid;
        }
    }
    if cost(high) <= avail as u64 {
        high as u32
    } else if cost(low) <= avail as u64 {
        low as u32
    } else {
        0
    }
}

impl Superblock {
    /// Computes the layout of a partition spanning `num_sectors` sectors from
    /// `first_sector`, with logical blocks of `sectors_per_block` sectors.
    ///
    /// Roughly 1% of the partition is reserved for the inode table, which
    /// fixes the number of inodes; the rest is split between the bitmaps and
    /// the data block region.
    pub fn build(first_sector: u32, num_sectors: u32, sectors_per_block: u8) -> Result<Self> {
        if !(1..=128).contains(&sectors_per_block) {
            return Err(Error::BadGeometry);
        }
        if num_sectors < 2 * sectors_per_block as u32 + 4 {
            return Err(Error::BadGeometry);
        }

        // The superblock takes the first sector.
        let mut remaining = num_sectors - 1;
        let it_sectors = (remaining / 100).max(1);
        remaining -= it_sectors;

        let inodes_per_sector = (SECTOR_SIZE / INODE_SIZE) as u32;
        let num_inodes = it_sectors * inodes_per_sector;
        let ib_sectors = 1 + (num_inodes - 1) / (8 * SECTOR_SIZE as u32);
        remaining -= ib_sectors;

        // Block 0 is reserved, so fewer than two blocks leaves no usable one.
        let num_blocks = max_blocks(sectors_per_block as u32, remaining);
        if num_blocks < 2 {
            return Err(Error::BadGeometry);
        }
        let bb_sectors = 1 + (num_blocks - 1) / (8 * SECTOR_SIZE as u32);

        let mut signature = [0u8; SIGNATURE_LEN];
        signature[..SIGNATURE.len()].copy_from_slice(SIGNATURE);
        Ok(Self {
            sectors_per_block,
            signature,
            sector_size: SECTOR_SIZE as u16,
            block_size: sectors_per_block as u32 * SECTOR_SIZE as u32,
            first_sector,
            num_sectors,
            num_blocks,
            num_inodes,
            it_offset: 1,
            ib_offset: 1 + it_sectors,
            bb_offset: 1 + it_sectors + ib_sectors,
            blocks_offset: 1 + it_sectors + ib_sectors + bb_sectors,
        })
    }

    /// Decodes the superblock from the first sector of a partition, checking
    /// the signature.
    pub fn decode(buf: &[u8; SECTOR_SIZE]) -> Result<Self> {
        let sb: Self = raw::from_bytes(buf);
        let mut signature = [0u8; SIGNATURE_LEN];
        signature[..SIGNATURE.len()].copy_from_slice(SIGNATURE);
        if sb.signature != signature {
            return Err(Error::BadSuperblock);
        }
        Ok(sb)
    }

    /// Encodes the superblock into a full sector, the tail filled with zeros.
    pub fn encode(&self) -> [u8; SECTOR_SIZE] {
        let mut buf = [0u8; SECTOR_SIZE];
        let bytes = raw::as_bytes(self);
        buf[..bytes.len()].copy_from_slice(bytes);
        buf
    }
}
