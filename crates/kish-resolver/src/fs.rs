//! Filesystem collaborator.
//!
//! The resolver reaches the filesystem only through this trait: `stat`,
//! whole-file reads, and `realpath`. Nothing is ever opened for writing.
//! Callers treat any failure of a primitive as "not present".

use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};

/// The subset of `stat` the resolver consumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStat {
    pub is_file: bool,
    pub is_dir: bool,
    pub is_fifo: bool,
}

impl FileStat {
    /// True for anything that can be loaded as a module: regular files and
    /// named pipes.
    #[must_use]
    pub fn is_loadable(&self) -> bool {
        self.is_file || self.is_fifo
    }
}

/// Narrow filesystem interface consumed by the resolver.
pub trait FileSystem: Send + Sync + Debug {
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// Read a whole file as text.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Resolve symlinks to the canonical path.
    fn realpath(&self, path: &Path) -> io::Result<PathBuf>;
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let file_type = std::fs::metadata(path)?.file_type();

        #[cfg(unix)]
        let is_fifo = {
            use std::os::unix::fs::FileTypeExt;
            file_type.is_fifo()
        };
        #[cfg(not(unix))]
        let is_fifo = false;

        Ok(FileStat {
            is_file: file_type.is_file(),
            is_dir: file_type.is_dir(),
            is_fifo,
        })
    }

    /// Reads lossily; invalid UTF-8 in a manifest surfaces as a parse error
    /// downstream, not an IO error.
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }
}
