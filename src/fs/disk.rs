//! Raw access to the backing disk image.
//!
//! The device is addressed in fixed-size sectors of [`SECTOR_SIZE`] bytes.
//! The image is usually a regular file, but a block device works as well.

use crate::error::{Error, Result};
use crate::SECTOR_SIZE;
use libc::ioctl;
use std::ffi::c_long;
use std::fs::{File, OpenOptions};
use std::io;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

/// ioctl macro: Command.
macro_rules! ioc {
    ($a:expr, $b:expr, $c:expr, $d:expr) => {
        (($a) << 30) | (($b) << 8) | ($c) | (($d) << 16)
    };
}

/// ioctl macro: Read command.
macro_rules! ior {
    ($a:expr, $b:expr, $c:ty) => {
        ioc!(2, $a, $b, std::mem::size_of::<$c>() as c_long)
    };
}

/// ioctl command: Get size of disk in bytes.
const BLKGETSIZE64: c_long = ior!(0x12, 114, u64);

/// Returns the size of the given device in sectors.
fn device_sectors(file: &File) -> io::Result<u64> {
    let metadata = file.metadata()?;
    let file_type = metadata.file_type();
    if file_type.is_block_device() || file_type.is_char_device() {
        let mut size: u64 = 0;
        let ret = unsafe { ioctl(file.as_raw_fd(), BLKGETSIZE64 as _, &mut size) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(size / SECTOR_SIZE as u64)
    } else {
        Ok(metadata.len() / SECTOR_SIZE as u64)
    }
}

/// A disk image, read and written one sector at a time.
pub struct Disk {
    /// The backing file.
    file: File,
    /// The number of sectors on the device.
    num_sectors: u64,
}

impl Disk {
    /// Opens the device or image file at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let num_sectors = device_sectors(&file)?;
        Ok(Self { file, num_sectors })
    }

    /// Creates a zero-filled image file of `num_sectors` sectors at the given path.
    ///
    /// An existing file at the same path is truncated.
    pub fn create<P: AsRef<Path>>(path: P, num_sectors: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(num_sectors * SECTOR_SIZE as u64)?;
        Ok(Self { file, num_sectors })
    }

    /// Returns the number of sectors on the device.
    pub fn num_sectors(&self) -> u64 {
        self.num_sectors
    }

    /// Reads the sector `sector` into `buf`.
    pub fn read_sector(&mut self, sector: u64, buf: &mut [u8; SECTOR_SIZE]) -> Result<()> {
        if sector >= self.num_sectors {
            return Err(Error::OutOfRange);
        }
        self.file
            .seek(SeekFrom::Start(sector * SECTOR_SIZE as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Writes `buf` to the sector `sector`.
    pub fn write_sector(&mut self, sector: u64, buf: &[u8; SECTOR_SIZE]) -> Result<()> {
        if sector >= self.num_sectors {
            return Err(Error::OutOfRange);
        }
        self.file
            .seek(SeekFrom::Start(sector * SECTOR_SIZE as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }
}
