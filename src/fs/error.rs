//! Errors reported by the filesystem.

use std::io;
use std::{error, fmt};

/// An error returned by a filesystem operation.
#[derive(Debug)]
pub enum Error {
    /// An I/O error on the backing device.
    Io(io::Error),
    /// The MBR is malformed or has an unsupported geometry.
    BadMbr,
    /// The partition index is out of range or the entry is malformed.
    BadPartition,
    /// The partition does not carry a valid superblock.
    BadSuperblock,
    /// Invalid block size or partition too small to be formatted.
    BadGeometry,
    /// A sector, block or inode index is out of bounds.
    OutOfRange,
    /// An on-disk structure does not pass sanity checks.
    Corrupted,
    /// A file name is empty, too long or contains an illegal character.
    BadName,
    /// A path cannot be followed.
    BadPath,
    /// Too many symbolic link expansions in a single resolution.
    TooManyLinks,
    /// The file does not exist.
    NotFound,
    /// The file already exists.
    AlreadyExists,
    /// The file is not a directory.
    NotADirectory,
    /// The file is a directory.
    IsADirectory,
    /// The directory is not empty.
    NotEmpty,
    /// The directory is the root or the current working directory.
    Busy,
    /// Every inode is in use.
    NoFreeInode,
    /// Every data block is in use.
    NoFreeBlock,
    /// The file already spans every block its inode can address.
    FileTooBig,
    /// The descriptor table is full.
    TooManyOpenFiles,
    /// The descriptor does not refer to an open file of the expected kind.
    BadDescriptor,
    /// A seek offset lands outside of the file.
    BadOffset,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::BadMbr => write!(f, "invalid master boot record"),
            Self::BadPartition => write!(f, "invalid partition"),
            Self::BadSuperblock => write!(f, "partition is not formatted"),
            Self::BadGeometry => write!(f, "invalid filesystem geometry"),
            Self::OutOfRange => write!(f, "index out of range"),
            Self::Corrupted => write!(f, "corrupted filesystem structure"),
            Self::BadName => write!(f, "invalid file name"),
            Self::BadPath => write!(f, "invalid path"),
            Self::TooManyLinks => write!(f, "too many levels of symbolic links"),
            Self::NotFound => write!(f, "no such file or directory"),
            Self::AlreadyExists => write!(f, "file exists"),
            Self::NotADirectory => write!(f, "not a directory"),
            Self::IsADirectory => write!(f, "is a directory"),
            Self::NotEmpty => write!(f, "directory not empty"),
            Self::Busy => write!(f, "directory is busy"),
            Self::NoFreeInode => write!(f, "no free inode left"),
            Self::NoFreeBlock => write!(f, "no free block left"),
            Self::FileTooBig => write!(f, "file too big"),
            Self::TooManyOpenFiles => write!(f, "too many open files"),
            Self::BadDescriptor => write!(f, "bad file descriptor"),
            Self::BadOffset => write!(f, "offset out of bounds"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Result alias for filesystem operations.
pub type Result<T> = std::result::Result<T, Error>;
