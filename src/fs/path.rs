//! Path resolution.
//!
//! Paths are UNIX-style, absolute or relative to the current working
//! directory. Symbolic links found in the middle of a path are always
//! expanded; a link in the terminal position is expanded only on demand.
//! Expansion rebuilds the path string and restarts the walk, bounded by
//! [`MAX_SYMLINK_DEPTH`](crate::MAX_SYMLINK_DEPTH) expansions per resolution.

use crate::error::{Error, Result};
use crate::inode::{FileType, ROOT_INODE};
use crate::volume::Volume;
use crate::{MAX_SYMLINK_DEPTH, PATH_MAX};

/// The outcome of a successful path resolution.
///
/// The path being followable does not imply the file exists: `node` is `None`
/// for a valid path whose last component is absent, in which case `parent`
/// and `name` say where the file would be created.
pub(crate) struct Resolved {
    /// The basename of the file.
    pub name: String,
    /// The inode of the parent directory.
    pub parent: u32,
    /// The inode and type of the file, if it exists.
    pub node: Option<(u32, FileType)>,
}

/// Collapses consecutive slashes and turns a trailing slash into an explicit
/// `.` component, so `".//file"` walks like `"./file"` and `"a/"` like
/// `"a/."`.
fn clean(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' && prev_slash {
            continue;
        }
        prev_slash = c == '/';
        out.push(c);
    }
    if out.ends_with('/') {
        out.push('.');
    }
    out
}

impl Volume {
    /// Follows `path` starting from the directory `cwd` when relative.
    ///
    /// `follow_last` tells whether a symbolic link in the terminal position
    /// is expanded as well.
    pub(crate) fn resolve(&mut self, cwd: u32, path: &str, follow_last: bool) -> Result<Resolved> {
        let mut path = path.to_owned();
        'expansion: for _ in 0..=MAX_SYMLINK_DEPTH {
            if path.is_empty() || path.len() >= PATH_MAX {
                return Err(Error::BadPath);
            }
            path = clean(&path);
            if path == "/." {
                return Ok(Resolved {
                    name: "/".to_owned(),
                    parent: ROOT_INODE,
                    node: Some((ROOT_INODE, FileType::Directory)),
                });
            }
            let absolute = path.starts_with('/');
            let mut dir = if absolute { ROOT_INODE } else { cwd };
            let components: Vec<String> = path
                .strip_prefix('/')
                .unwrap_or(&path)
                .split('/')
                .map(str::to_owned)
                .collect();
            for (i, component) in components.iter().enumerate() {
                let last = i + 1 == components.len();
                let Some(ino) = self.lookup(dir, component)? else {
                    if last {
                        // Valid path, absent file.
                        return Ok(Resolved {
                            name: component.clone(),
                            parent: dir,
                            node: None,
                        });
                    }
                    return Err(Error::BadPath);
                };
                let kind = self.read_inode(ino)?.file_type()?;
                if last && (kind != FileType::Symlink || !follow_last) {
                    return Ok(Resolved {
                        name: component.clone(),
                        parent: dir,
                        node: Some((ino, kind)),
                    });
                }
                match kind {
                    FileType::Directory => dir = ino,
                    FileType::Regular => return Err(Error::BadPath),
                    FileType::Symlink => {
                        let target = self.read_link_target(ino)?;
                        path = if last {
                            target
                        } else {
                            format!("{target}/{}", components[i + 1..].join("/"))
                        };
                        continue 'expansion;
                    }
                }
            }
            // Every component either returns or restarts the walk.
            return Err(Error::BadPath);
        }
        Err(Error::TooManyLinks)
    }

    /// Reads the target path stored in the single data block of the symbolic
    /// link `ino`.
    pub(crate) fn read_link_target(&mut self, ino: u32) -> Result<String> {
        let inode = self.read_inode(ino)?;
        if inode.file_type()? != FileType::Symlink || inode.pointers[0] == 0 {
            return Err(Error::Corrupted);
        }
        let mut buf = vec![0u8; self.block_size()];
        self.read_block(inode.pointers[0], &mut buf)?;
        let len = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
        buf.truncate(len);
        String::from_utf8(buf).map_err(|_| Error::Corrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_collapses_slashes() {
        assert_eq!(clean(".//file"), "./file");
        assert_eq!(clean("a///b//c"), "a/b/c");
        assert_eq!(clean("/usr/bin"), "/usr/bin");
    }

    #[test]
    fn clean_expands_trailing_slash() {
        assert_eq!(clean("/"), "/.");
        assert_eq!(clean("///"), "/.");
        assert_eq!(clean("a/"), "a/.");
        assert_eq!(clean("/d//"), "/d/.");
    }
}
