//! Block allocation and the per-block iterator.
//!
//! An inode addresses its logical blocks through [`NUM_DIRECT`] direct
//! pointers followed by one pointer per indirection level: the pointer at
//! level `L` names an index block whose entries are themselves at level
//! `L - 1`. Everything here is generic over the indirection depth, so the
//! directory layer and byte-granularity I/O never look at pointers
//! themselves.

use crate::T2fs;
use crate::bitmap::BitmapKind;
use crate::error::{Error, Result};
use crate::inode::{FileType, Inode, NUM_INODE_PTR};
use crate::volume::Volume;
use crate::{NUM_DIRECT, NUM_INDIRECT_LVL};
use log::trace;
use std::mem::size_of;

/// What the per-block callback wants the iteration to do next.
pub(crate) enum Walk {
    /// The callback succeeded; stop iterating.
    Stop,
    /// Move on to the next logical block.
    Continue,
}

/// Returns the indirection level of the `i`th pointer slot of an inode:
/// 0 for the direct slots, then 1, 2, ...
fn slot_level(i: usize) -> usize {
    i.saturating_sub(NUM_DIRECT - 1)
}

/// Reads the `i`th entry of an index block.
fn entry(index: &[u8], i: usize) -> u32 {
    let off = i * size_of::<u32>();
    u32::from_le_bytes(index[off..off + 4].try_into().unwrap())
}

/// Writes the `i`th entry of an index block.
fn set_entry(index: &mut [u8], i: usize, value: u32) {
    let off = i * size_of::<u32>();
    index[off..off + 4].copy_from_slice(&value.to_le_bytes());
}

impl Volume {
    /// Returns the number of entries in an index block.
    fn fan_out(&self) -> u64 {
        (self.block_size() / size_of::<u32>()) as u64
    }

    /// Returns the number of data blocks addressed by a whole pointer tree of
    /// the given level.
    fn level_capacity(&self, level: usize) -> u64 {
        self.fan_out().pow(level as u32)
    }

    /// Applies `f` to every data block of the inode `ino`, in logical order
    /// and through any indirection depth.
    ///
    /// Iteration ends as soon as `f` returns [`Walk::Stop`] (yielding
    /// `Ok(true)`) or an error. A zero pointer marks the logical tail of the
    /// file and stops the descent; if the tail is reached without a stop, the
    /// function yields `Ok(false)`.
    pub(crate) fn walk_blocks<F>(&mut self, ino: u32, f: &mut F) -> Result<bool>
    where
        F: FnMut(&mut Volume, u32) -> Result<Walk>,
    {
        let inode = self.read_inode(ino)?;
        for (i, block) in inode.pointers.into_iter().enumerate() {
            if block == 0 {
                break;
            }
            if self.walk_indirect(block, slot_level(i), f)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Descends `level` levels of indirection below `block`, applying `f` to
    /// each data block. Each frame reads its index block into its own scratch
    /// buffer.
    fn walk_indirect<F>(&mut self, block: u32, level: usize, f: &mut F) -> Result<bool>
    where
        F: FnMut(&mut Volume, u32) -> Result<Walk>,
    {
        if level == 0 {
            return match f(self, block)? {
                Walk::Stop => Ok(true),
                Walk::Continue => Ok(false),
            };
        }
        let mut index = vec![0u8; self.block_size()];
        self.read_block(block, &mut index)?;
        for i in 0..self.fan_out() as usize {
            let child = entry(&index, i);
            if child == 0 {
                break;
            }
            if self.walk_indirect(child, level - 1, f)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Allocates the data block `count` positions below `slot` at the given
    /// indirection level, growing index blocks on the way down as needed.
    ///
    /// At level 0, `slot` receives a fresh data block directly. Returns the
    /// new data block.
    fn allocate_indirect(&mut self, slot: &mut u32, level: usize, count: u64) -> Result<u32> {
        if level == 0 {
            let block = self.find_new_block()?;
            *slot = block;
            return Ok(block);
        }
        let mut index = vec![0u8; self.block_size()];
        if *slot == 0 {
            // Fresh index block: every entry starts out invalid.
            *slot = self.find_new_block()?;
        } else {
            self.read_block(*slot, &mut index)?;
        }
        let level_blocks = self.level_capacity(level - 1);
        let i = (count / level_blocks) as usize;
        let mut child = entry(&index, i);
        let block = self.allocate_indirect(&mut child, level - 1, count % level_blocks)?;
        set_entry(&mut index, i, child);
        self.write_block(*slot, &index)?;
        Ok(block)
    }

    /// Deallocates data blocks below `slot` from the highest logical position
    /// downwards, until `remaining` hits zero. An index block whose first
    /// entry becomes zero is itself released.
    fn deallocate_indirect(&mut self, slot: &mut u32, level: usize, remaining: &mut u32) -> Result<()> {
        if *slot == 0 || *remaining == 0 {
            return Ok(());
        }
        if level == 0 {
            self.bitmap_set(BitmapKind::Block, *slot, false)?;
            *slot = 0;
            *remaining -= 1;
            return Ok(());
        }
        let mut index = vec![0u8; self.block_size()];
        self.read_block(*slot, &mut index)?;
        for i in (0..self.fan_out() as usize).rev() {
            if *remaining == 0 {
                break;
            }
            let mut child = entry(&index, i);
            self.deallocate_indirect(&mut child, level - 1, remaining)?;
            set_entry(&mut index, i, child);
        }
        if entry(&index, 0) == 0 {
            self.bitmap_set(BitmapKind::Block, *slot, false)?;
            *slot = 0;
        } else {
            self.write_block(*slot, &index)?;
        }
        Ok(())
    }

    /// Appends one logical block to the inode `ino` and returns its number.
    ///
    /// For directories and symbolic links the new block is zeroed and counted
    /// into `bytes_size` immediately, since their whole allocation is
    /// structured payload.
    pub(crate) fn allocate_new_block(&mut self, ino: u32) -> Result<u32> {
        let mut inode = self.read_inode(ino)?;
        let block;
        if (inode.num_blocks as usize) < NUM_DIRECT {
            let i = inode.num_blocks as usize;
            let mut slot = inode.pointers[i];
            block = self.allocate_indirect(&mut slot, 0, 0)?;
            inode.pointers[i] = slot;
        } else {
            let mut rem = inode.num_blocks as u64 - NUM_DIRECT as u64;
            let mut allocated = None;
            for level in 1..=NUM_INDIRECT_LVL {
                let level_blocks = self.level_capacity(level);
                if rem < level_blocks {
                    let i = NUM_DIRECT + level - 1;
                    let mut slot = inode.pointers[i];
                    allocated = Some(self.allocate_indirect(&mut slot, level, rem)?);
                    inode.pointers[i] = slot;
                    break;
                }
                rem -= level_blocks;
            }
            block = allocated.ok_or(Error::FileTooBig)?;
        }
        if matches!(inode.file_type()?, FileType::Directory | FileType::Symlink) {
            self.zero_block(block)?;
            inode.bytes_size += self.block_size() as u32;
        }
        inode.num_blocks += 1;
        self.write_inode(ino, &inode)?;
        trace!("inode {ino}: allocated block {block}");
        Ok(block)
    }

    /// Deallocates the last `count` logical blocks of the inode `ino`, or all
    /// of them when `count` is `None`.
    pub(crate) fn deallocate_blocks(&mut self, ino: u32, count: Option<u32>) -> Result<()> {
        let mut inode = self.read_inode(ino)?;
        let want = count.unwrap_or(inode.num_blocks).min(inode.num_blocks);
        if want == 0 {
            return Ok(());
        }
        let mut remaining = want;
        let mut result = Ok(());
        for i in (0..NUM_INODE_PTR).rev() {
            if remaining == 0 {
                break;
            }
            let mut slot = inode.pointers[i];
            result = self.deallocate_indirect(&mut slot, slot_level(i), &mut remaining);
            inode.pointers[i] = slot;
            if result.is_err() {
                break;
            }
        }
        // Account only the blocks actually released.
        inode.num_blocks -= want - remaining;
        if matches!(inode.file_type()?, FileType::Directory | FileType::Symlink) {
            inode.bytes_size = inode.num_blocks * self.block_size() as u32;
        }
        self.write_inode(ino, &inode)?;
        trace!("inode {ino}: released {} block(s)", want - remaining);
        result
    }

    /// Returns the data block at logical position `n` of the given inode, or
    /// 0 if that position is not allocated.
    pub(crate) fn get_nth_block(&mut self, inode: &Inode, n: u32) -> Result<u32> {
        if (n as usize) < NUM_DIRECT {
            return Ok(inode.pointers[n as usize]);
        }
        let mut rem = n as u64 - NUM_DIRECT as u64;
        for level in 1..=NUM_INDIRECT_LVL {
            let level_blocks = self.level_capacity(level);
            if rem >= level_blocks {
                rem -= level_blocks;
                continue;
            }
            let mut block = inode.pointers[NUM_DIRECT + level - 1];
            for l in (1..=level).rev() {
                if block == 0 {
                    return Ok(0);
                }
                let below = self.level_capacity(l - 1);
                let mut index = vec![0u8; self.block_size()];
                self.read_block(block, &mut index)?;
                block = entry(&index, (rem / below) as usize);
                rem %= below;
            }
            return Ok(block);
        }
        Ok(0)
    }

    /// Increments the hard-link counter of the inode `ino`.
    pub(crate) fn inc_hl_count(&mut self, ino: u32) -> Result<()> {
        let mut inode = self.read_inode(ino)?;
        inode.hl_count = inode.hl_count.checked_add(1).ok_or(Error::Corrupted)?;
        self.write_inode(ino, &inode)
    }
}

impl T2fs {
    /// Decrements the hard-link counter of the inode `ino`.
    ///
    /// When the counter reaches zero the inode dies: its blocks are released,
    /// every open descriptor on it is closed and its record and bitmap bit
    /// are cleared.
    pub(crate) fn dec_hl_count(&mut self, ino: u32) -> Result<()> {
        let mut inode = self.vol.read_inode(ino)?;
        inode.hl_count = inode.hl_count.saturating_sub(1);
        if inode.hl_count == 0 {
            self.vol.deallocate_blocks(ino, None)?;
            self.fds.close_all(ino);
            self.vol.free_inode(ino)
        } else {
            self.vol.write_inode(ino, &inode)
        }
    }
}
