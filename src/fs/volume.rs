//! Partition-relative sector and block transfer.
//!
//! This layer bridges the fixed 256-byte sector interface of the disk and the
//! variable logical block size chosen at format time. Sector accesses may
//! address a slice of a sector; block accesses always move whole blocks.

use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::mbr::Mbr;
use crate::superblock::Superblock;
use crate::SECTOR_SIZE;

/// A mounted partition: the disk plus its superblock.
pub struct Volume {
    /// The backing disk.
    pub(crate) disk: Disk,
    /// The superblock of the mounted partition.
    pub(crate) sb: Superblock,
}

impl Volume {
    /// Loads the superblock of the `partition`th partition of `disk`.
    pub(crate) fn mount(mut disk: Disk, partition: usize) -> Result<Self> {
        let mbr = Mbr::read(&mut disk)?;
        let part = mbr.partition(partition)?;
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sector(part.first_sector as u64, &mut buf)?;
        let sb = Superblock::decode(&buf)?;
        Ok(Self { disk, sb })
    }

    /// Returns the size of a logical block in bytes.
    pub(crate) fn block_size(&self) -> usize {
        self.sb.block_size as usize
    }

    /// Reads `buf.len()` bytes from the partition-relative `sector`, starting
    /// at byte `offset` within the sector.
    pub(crate) fn read_sector_slice(
        &mut self,
        sector: u32,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<()> {
        if sector >= self.sb.num_sectors || offset + buf.len() > SECTOR_SIZE {
            return Err(Error::OutOfRange);
        }
        let abs = self.sb.first_sector as u64 + sector as u64;
        let mut scratch = [0u8; SECTOR_SIZE];
        self.disk.read_sector(abs, &mut scratch)?;
        buf.copy_from_slice(&scratch[offset..offset + buf.len()]);
        Ok(())
    }

    /// Writes `buf` to the partition-relative `sector`, starting at byte
    /// `offset` within the sector. The rest of the sector is preserved.
    pub(crate) fn write_sector_slice(
        &mut self,
        sector: u32,
        offset: usize,
        buf: &[u8],
    ) -> Result<()> {
        if sector >= self.sb.num_sectors || offset + buf.len() > SECTOR_SIZE {
            return Err(Error::OutOfRange);
        }
        let abs = self.sb.first_sector as u64 + sector as u64;
        let mut scratch = [0u8; SECTOR_SIZE];
        self.disk.read_sector(abs, &mut scratch)?;
        scratch[offset..offset + buf.len()].copy_from_slice(buf);
        self.disk.write_sector(abs, &scratch)
    }

    /// Returns the absolute sector of the first sector of the data block
    /// `block`.
    fn block_sector(&self, block: u32) -> Result<u64> {
        if block >= self.sb.num_blocks {
            return Err(Error::OutOfRange);
        }
        Ok(self.sb.first_sector as u64
            + self.sb.blocks_offset as u64
            + block as u64 * self.sb.sectors_per_block as u64)
    }

    /// Reads the data block `block` into `buf`, which must be exactly one
    /// block large.
    pub(crate) fn read_block(&mut self, block: u32, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.block_size() {
            return Err(Error::OutOfRange);
        }
        let first = self.block_sector(block)?;
        for (i, chunk) in buf.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            let mut scratch = [0u8; SECTOR_SIZE];
            self.disk.read_sector(first + i as u64, &mut scratch)?;
            chunk.copy_from_slice(&scratch);
        }
        Ok(())
    }

    /// Writes `buf`, which must be exactly one block large, to the data block
    /// `block`.
    pub(crate) fn write_block(&mut self, block: u32, buf: &[u8]) -> Result<()> {
        if buf.len() != self.block_size() {
            return Err(Error::OutOfRange);
        }
        let first = self.block_sector(block)?;
        for (i, chunk) in buf.chunks_exact(SECTOR_SIZE).enumerate() {
            let mut scratch = [0u8; SECTOR_SIZE];
            scratch.copy_from_slice(chunk);
            self.disk.write_sector(first + i as u64, &scratch)?;
        }
        Ok(())
    }

    /// Writes a zero-filled block to the data block `block`.
    pub(crate) fn zero_block(&mut self, block: u32) -> Result<()> {
        let buf = vec![0u8; self.block_size()];
        self.write_block(block, &buf)
    }
}
