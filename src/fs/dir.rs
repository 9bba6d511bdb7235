//! Directory contents.
//!
//! A directory block is a packed array of fixed-size records `{name, inode}`,
//! a zero inode marking a free slot. Every operation here is a callback
//! composed with the per-block iterator, so directories of any size and
//! indirection depth are handled alike. The first two valid records of every
//! directory are `.` and `..`.

use crate::T2fs;
use crate::alloc::Walk;
use crate::error::{Error, Result};
use crate::volume::Volume;
use crate::{NAME_MAX, raw};
use std::mem::size_of;

/// A directory record, as stored in a directory block.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct DirRecord {
    /// The file name, NUL-padded.
    pub name: [u8; NAME_MAX],
    /// The inode of the file; 0 marks an unused slot.
    pub inode: u32,
}

/// The size of a directory record on disk, in bytes.
pub(crate) const RECORD_SIZE: usize = size_of::<DirRecord>();

/// Encodes a file name into its NUL-padded on-disk form.
///
/// Rejects empty names, names that do not fit with their terminator and
/// names containing `/` or NUL.
pub(crate) fn pack_name(name: &str) -> Result<[u8; NAME_MAX]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() >= NAME_MAX || bytes.contains(&b'/') || bytes.contains(&0) {
        return Err(Error::BadName);
    }
    let mut buf = [0u8; NAME_MAX];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

/// Decodes a NUL-padded on-disk name.
pub(crate) fn unpack_name(name: &[u8; NAME_MAX]) -> String {
    let len = name.iter().position(|b| *b == 0).unwrap_or(NAME_MAX);
    String::from_utf8_lossy(&name[..len]).into_owned()
}

/// Reads the `i`th record of a directory block.
fn record_at(block: &[u8], i: usize) -> DirRecord {
    raw::from_bytes(&block[i * RECORD_SIZE..])
}

/// Writes the `i`th record of a directory block.
fn set_record_at(block: &mut [u8], i: usize, record: &DirRecord) {
    block[i * RECORD_SIZE..(i + 1) * RECORD_SIZE].copy_from_slice(raw::as_bytes(record));
}

impl Volume {
    /// Returns the number of records a directory block holds.
    fn records_per_block(&self) -> usize {
        self.block_size() / RECORD_SIZE
    }

    /// Writes `{name, ino}` into the first free slot of the directory block
    /// `block`. Asks to continue when the block is full.
    fn insert_in_block(&mut self, block: u32, name: &[u8; NAME_MAX], ino: u32) -> Result<Walk> {
        let mut buf = vec![0u8; self.block_size()];
        self.read_block(block, &mut buf)?;
        for i in 0..self.records_per_block() {
            if record_at(&buf, i).inode == 0 {
                set_record_at(&mut buf, i, &DirRecord { name: *name, inode: ino });
                self.write_block(block, &buf)?;
                return Ok(Walk::Stop);
            }
        }
        Ok(Walk::Continue)
    }

    /// Inserts the entry `{name, ino}` into the directory `dir`, growing it
    /// by one block when every existing block is full.
    ///
    /// The hard-link count of `ino` is not touched; see [`T2fs::dir_insert`].
    pub(crate) fn insert_raw(&mut self, dir: u32, name: &str, ino: u32) -> Result<()> {
        let packed = pack_name(name)?;
        let inserted =
            self.walk_blocks(dir, &mut |vol, block| vol.insert_in_block(block, &packed, ino))?;
        if !inserted {
            // Every block scanned is full: insert into a fresh one directly.
            let block = self.allocate_new_block(dir)?;
            if let Walk::Continue = self.insert_in_block(block, &packed, ino)? {
                return Err(Error::Corrupted);
            }
        }
        Ok(())
    }

    /// Looks the name up in the directory `dir`, returning the inode of the
    /// matching entry.
    pub(crate) fn lookup(&mut self, dir: u32, name: &str) -> Result<Option<u32>> {
        let packed = pack_name(name)?;
        let mut found = None;
        self.walk_blocks(dir, &mut |vol, block| {
            let mut buf = vec![0u8; vol.block_size()];
            vol.read_block(block, &mut buf)?;
            for i in 0..vol.records_per_block() {
                let record = record_at(&buf, i);
                if record.inode != 0 && record.name == packed {
                    found = Some(record.inode);
                    return Ok(Walk::Stop);
                }
            }
            Ok(Walk::Continue)
        })?;
        Ok(found)
    }

    /// Searches the directory `dir` for an entry referring to the inode `ino`
    /// and returns its name.
    pub(crate) fn name_of(&mut self, dir: u32, ino: u32) -> Result<Option<String>> {
        let mut found = None;
        self.walk_blocks(dir, &mut |vol, block| {
            let mut buf = vec![0u8; vol.block_size()];
            vol.read_block(block, &mut buf)?;
            for i in 0..vol.records_per_block() {
                let record = record_at(&buf, i);
                if record.inode != 0 && record.inode == ino {
                    found = Some(unpack_name(&record.name));
                    return Ok(Walk::Stop);
                }
            }
            Ok(Walk::Continue)
        })?;
        Ok(found)
    }

    /// Removes the entry with the given name from the directory `dir` and
    /// returns the inode it referred to.
    ///
    /// The hard-link count is not touched; see [`T2fs::dir_remove`].
    pub(crate) fn remove_raw(&mut self, dir: u32, name: &str) -> Result<Option<u32>> {
        let packed = pack_name(name)?;
        let mut removed = None;
        self.walk_blocks(dir, &mut |vol, block| {
            let mut buf = vec![0u8; vol.block_size()];
            vol.read_block(block, &mut buf)?;
            for i in 0..vol.records_per_block() {
                let record = record_at(&buf, i);
                if record.inode != 0 && record.name == packed {
                    removed = Some(record.inode);
                    set_record_at(&mut buf, i, &DirRecord { name: [0; NAME_MAX], inode: 0 });
                    vol.write_block(block, &buf)?;
                    return Ok(Walk::Stop);
                }
            }
            Ok(Walk::Continue)
        })?;
        Ok(removed)
    }

    /// Tells whether the directory `dir` holds no valid entry besides `.` and
    /// `..`.
    pub(crate) fn dir_is_empty(&mut self, dir: u32) -> Result<bool> {
        let dot = pack_name(".")?;
        let dotdot = pack_name("..")?;
        let occupied = self.walk_blocks(dir, &mut |vol, block| {
            let mut buf = vec![0u8; vol.block_size()];
            vol.read_block(block, &mut buf)?;
            for i in 0..vol.records_per_block() {
                let record = record_at(&buf, i);
                if record.inode != 0 && record.name != dot && record.name != dotdot {
                    return Ok(Walk::Stop);
                }
            }
            Ok(Walk::Continue)
        })?;
        Ok(!occupied)
    }
}

impl T2fs {
    /// Inserts an entry and bumps the hard-link count of its inode, undoing
    /// the insertion if the bump fails.
    pub(crate) fn dir_insert(&mut self, dir: u32, name: &str, ino: u32) -> Result<()> {
        self.vol.insert_raw(dir, name, ino)?;
        if let Err(e) = self.vol.inc_hl_count(ino) {
            let _ = self.vol.remove_raw(dir, name);
            return Err(e);
        }
        Ok(())
    }

    /// Removes an entry and drops the hard-link count of its inode, freeing
    /// the inode when this was the last reference.
    pub(crate) fn dir_remove(&mut self, dir: u32, name: &str) -> Result<()> {
        if let Some(ino) = self.vol.remove_raw(dir, name)? {
            self.dec_hl_count(ino)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout() {
        assert_eq!(RECORD_SIZE, NAME_MAX + 4);
    }

    #[test]
    fn name_codec() {
        let packed = pack_name("hello.txt").unwrap();
        assert_eq!(unpack_name(&packed), "hello.txt");
        assert!(pack_name("").is_err());
        assert!(pack_name("a/b").is_err());
        assert!(pack_name("a\0b").is_err());
        // 31 characters fit with the terminator, 32 do not.
        assert!(pack_name(&"x".repeat(31)).is_ok());
        assert!(pack_name(&"x".repeat(32)).is_err());
    }

    #[test]
    fn block_records() {
        let mut block = vec![0u8; 256];
        let record = DirRecord {
            name: pack_name("file").unwrap(),
            inode: 42,
        };
        set_record_at(&mut block, 3, &record);
        assert_eq!(record_at(&block, 3).inode, 42);
        assert_eq!(record_at(&block, 2).inode, 0);
        assert_eq!(unpack_name(&record_at(&block, 3).name), "file");
    }
}
