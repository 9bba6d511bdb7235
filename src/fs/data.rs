//! Byte-granularity file contents.
//!
//! Reads and writes gather and scatter over whole blocks located through the
//! indirect-block engine. A read stops at `bytes_size` or at the first
//! unallocated block; a write grows the file one logical block at a time
//! when the cursor reaches the allocated tail, then records the furthest
//! written byte in `bytes_size`.

use crate::error::Result;
use crate::volume::Volume;

impl Volume {
    /// Reads up to `buf.len()` bytes of the inode `ino` from byte position
    /// `pos`, returning how many bytes were read.
    pub(crate) fn read_data(&mut self, ino: u32, pos: u32, buf: &mut [u8]) -> Result<usize> {
        let inode = self.read_inode(ino)?;
        if pos >= inode.bytes_size || buf.is_empty() {
            return Ok(0);
        }
        let bs = self.block_size() as u32;
        let total = buf.len().min((inode.bytes_size - pos) as usize);
        let mut block_buf = vec![0u8; bs as usize];
        let mut done = 0;
        while done < total {
            let cursor = pos + done as u32;
            let offset = (cursor % bs) as usize;
            let block = self.get_nth_block(&inode, cursor / bs)?;
            if block == 0 {
                // An unallocated block behaves like the end of the file.
                break;
            }
            let len = (total - done).min(bs as usize - offset);
            self.read_block(block, &mut block_buf)?;
            buf[done..done + len].copy_from_slice(&block_buf[offset..offset + len]);
            done += len;
        }
        Ok(done)
    }

    /// Writes `buf` into the inode `ino` at byte position `pos`, returning
    /// how many bytes made it to disk. The count falls short of `buf.len()`
    /// only when the filesystem or the inode runs out of blocks.
    pub(crate) fn write_data(&mut self, ino: u32, pos: u32, buf: &[u8]) -> Result<usize> {
        let mut inode = self.read_inode(ino)?;
        let bs = self.block_size() as u32;
        let mut block_buf = vec![0u8; bs as usize];
        let mut done = 0;
        while done < buf.len() {
            let Some(cursor) = pos.checked_add(done as u32) else {
                break;
            };
            let offset = (cursor % bs) as usize;
            let mut block = self.get_nth_block(&inode, cursor / bs)?;
            if block == 0 {
                // Grow the tail by one logical block and retry the lookup.
                match self.allocate_new_block(ino) {
                    Ok(_) => {
                        inode = self.read_inode(ino)?;
                        block = self.get_nth_block(&inode, cursor / bs)?;
                        if block == 0 {
                            continue;
                        }
                    }
                    Err(e) if done == 0 => return Err(e),
                    Err(_) => break,
                }
            }
            let len = (buf.len() - done).min(bs as usize - offset);
            self.read_block(block, &mut block_buf)?;
            block_buf[offset..offset + len].copy_from_slice(&buf[done..done + len]);
            self.write_block(block, &block_buf)?;
            done += len;
        }
        if done > 0 {
            let mut inode = self.read_inode(ino)?;
            inode.bytes_size = inode.bytes_size.max(pos + done as u32);
            self.write_inode(ino, &inode)?;
        }
        Ok(done)
    }
}
