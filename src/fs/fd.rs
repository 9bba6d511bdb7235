//! The open-file descriptor table.
//!
//! A bounded slab: slot 0 is reserved for the single open directory, the
//! remaining [`MAX_OPEN_FILES`](crate::MAX_OPEN_FILES) slots form the
//! regular-file pool. A handle packs the slot index and a per-slot
//! generation counter into a positive integer, so a handle kept across a
//! close can never alias a descriptor opened later into the same slot.

use crate::MAX_OPEN_FILES;
use crate::error::{Error, Result};
use crate::inode::FileType;

/// An open-file handle. Always positive while valid.
pub type Fd = i32;

/// Bits of the handle used for the slot index.
const SLOT_BITS: u32 = 4;
/// Highest generation value still yielding a positive handle.
const MAX_GENERATION: u32 = (i32::MAX >> SLOT_BITS) as u32;

/// An open file.
pub(crate) struct Descriptor {
    /// The kind of handle: a regular file or a directory.
    pub kind: FileType,
    /// The current position, in bytes from the start of the file.
    pub pos: u32,
    /// The inode of the open file.
    pub inode: u32,
}

/// One slab slot.
struct Slot {
    /// Bumped every time the slot is (re)used.
    generation: u32,
    desc: Option<Descriptor>,
}

/// The table of open files.
pub(crate) struct DescTable {
    slots: [Slot; 1 + MAX_OPEN_FILES],
}

impl Default for DescTable {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot {
                generation: 0,
                desc: None,
            }),
        }
    }
}

impl DescTable {
    /// Opens a descriptor on the inode `ino`, respecting the directory /
    /// regular-file split of the table.
    pub fn open(&mut self, ino: u32, kind: FileType) -> Result<Fd> {
        let index = match kind {
            FileType::Directory => self.slots[0].desc.is_none().then_some(0),
            _ => (1..self.slots.len()).find(|i| self.slots[*i].desc.is_none()),
        }
        .ok_or(Error::TooManyOpenFiles)?;
        let slot = &mut self.slots[index];
        slot.generation = if slot.generation >= MAX_GENERATION {
            1
        } else {
            slot.generation + 1
        };
        slot.desc = Some(Descriptor {
            kind,
            pos: 0,
            inode: ino,
        });
        Ok(((slot.generation << SLOT_BITS) | index as u32) as Fd)
    }

    /// Decodes a handle into its slot index, checking the generation.
    fn slot_of(&self, fd: Fd) -> Option<usize> {
        if fd <= 0 {
            return None;
        }
        let index = (fd as u32 & ((1 << SLOT_BITS) - 1)) as usize;
        let generation = fd as u32 >> SLOT_BITS;
        (index < self.slots.len()
            && self.slots[index].generation == generation
            && self.slots[index].desc.is_some())
        .then_some(index)
    }

    /// Returns the live descriptor behind `fd`, if it is of the given kind.
    pub fn get(&mut self, fd: Fd, kind: FileType) -> Option<&mut Descriptor> {
        let index = self.slot_of(fd)?;
        let desc = self.slots[index].desc.as_mut()?;
        (desc.kind == kind).then_some(desc)
    }

    /// Releases the descriptor behind `fd` if it is of the given kind,
    /// telling whether anything was released.
    pub fn release(&mut self, fd: Fd, kind: FileType) -> bool {
        match self.slot_of(fd) {
            Some(index) if self.slots[index].desc.as_ref().is_some_and(|d| d.kind == kind) => {
                self.slots[index].desc = None;
                true
            }
            _ => false,
        }
    }

    /// Releases every descriptor open on the inode `ino`. Called when the
    /// inode is deallocated, so no handle can read a recycled inode.
    pub fn close_all(&mut self, ino: u32) {
        for slot in &mut self.slots {
            if slot.desc.as_ref().is_some_and(|d| d.inode == ino) {
                slot.desc = None;
            }
        }
    }

    /// Clamps the position of every descriptor open on the inode `ino` to at
    /// most `limit`. Called when the file shrinks.
    pub fn clamp_positions(&mut self, ino: u32, limit: u32) {
        for slot in &mut self.slots {
            if let Some(desc) = slot.desc.as_mut() {
                if desc.inode == ino {
                    desc.pos = desc.pos.min(limit);
                }
            }
        }
    }
}
