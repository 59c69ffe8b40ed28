//! Lazy directory listings.
//!
//! Three flavors share one reader: [`ls`] yields interned full paths,
//! [`direct_ls`] adds the file type reported by `readdir` (possibly
//! [`FileType::Unknown`]), and [`stat_ls`] asks `fstatat` for a type that is
//! always right. `.` and `..` are never produced. A read error ends the
//! listing early; it is logged, not returned.

use std::ffi::OsStr;
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use tracing::{debug, trace};

use crate::error::{io_result, FileError, Result};
use crate::path::PATH_MAX;
use crate::stat::{FileType, Stat};
use crate::stringshare::{intern, SharedStr};
use crate::sys::{self, dir::DirStream};

/// One directory entry. Borrowed from the listing and overwritten by the
/// next call to `advance`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectInfo {
    path: Vec<u8>,
    name_start: usize,
    file_type: FileType,
}

impl DirectInfo {
    /// Full path of the entry: the listed directory joined with the name.
    pub fn path(&self) -> &Path {
        Path::new(OsStr::from_bytes(&self.path))
    }

    pub fn path_bytes(&self) -> &[u8] {
        &self.path
    }

    pub fn name(&self) -> &OsStr {
        OsStr::from_bytes(self.name_bytes())
    }

    pub fn name_bytes(&self) -> &[u8] {
        &self.path[self.name_start..]
    }

    pub fn path_length(&self) -> usize {
        self.path.len()
    }

    pub fn name_length(&self) -> usize {
        self.path.len() - self.name_start
    }

    /// Offset of the name inside [`DirectInfo::path_bytes`].
    pub fn name_start(&self) -> usize {
        self.name_start
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }
}

struct Reader {
    stream: DirStream,
    /// Directory path with a trailing separator.
    base: Vec<u8>,
    /// Name of the current entry.
    name: Vec<u8>,
    done: bool,
}

impl Reader {
    fn open(dir: &Path) -> Result<Self> {
        if dir.as_os_str().is_empty() {
            return Err(FileError::InvalidArgument);
        }
        let stream = io_result("opendir", DirStream::open(dir))?;
        let mut base = dir.as_os_str().as_bytes().to_vec();
        if base.last() != Some(&b'/') {
            base.push(b'/');
        }
        Ok(Self {
            stream,
            base,
            name: Vec::new(),
            done: false,
        })
    }

    /// Move to the next entry worth reporting and return its `d_type`. The
    /// name is left in `self.name`.
    fn next_entry(&mut self) -> Option<FileType> {
        if self.done {
            return None;
        }
        let file_type = loop {
            match self.stream.next_entry() {
                Ok(Some((name, file_type))) => {
                    let name = name.to_bytes();
                    if name == b"." || name == b".." {
                        continue;
                    }
                    if self.base.len() + name.len() >= PATH_MAX {
                        trace!(len = self.base.len() + name.len(), "skipping overlong path");
                        continue;
                    }
                    self.name.clear();
                    self.name.extend_from_slice(name);
                    break file_type;
                }
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(error) => {
                    debug!(%error, "directory read failed, ending the listing");
                    self.done = true;
                    return None;
                }
            }
        };
        Some(file_type)
    }
}

/// Entries of `dir` as interned full paths.
pub fn ls(dir: impl AsRef<Path>) -> Result<DirNames> {
    Ok(DirNames {
        reader: Reader::open(dir.as_ref())?,
    })
}

/// Entries of `dir` with the file type `readdir` reports.
pub fn direct_ls(dir: impl AsRef<Path>) -> Result<DirectLs> {
    Ok(DirectLs {
        reader: Reader::open(dir.as_ref())?,
        info: DirectInfo::default(),
    })
}

/// Entries of `dir` with the file type from `fstatat`. Symlinks are
/// reported as symlinks.
pub fn stat_ls(dir: impl AsRef<Path>) -> Result<StatLs> {
    Ok(StatLs {
        reader: Reader::open(dir.as_ref())?,
        info: DirectInfo::default(),
    })
}

/// Full paths of the entries of a directory. See [`ls`].
#[derive(Debug)]
pub struct DirNames {
    reader: Reader,
}

impl Iterator for DirNames {
    type Item = SharedStr;

    fn next(&mut self) -> Option<SharedStr> {
        self.reader.next_entry()?;
        let mut path = String::from_utf8_lossy(&self.reader.base).into_owned();
        path.push_str(&String::from_utf8_lossy(&self.reader.name));
        Some(intern(&path))
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("dir", &String::from_utf8_lossy(&self.base))
            .field("done", &self.done)
            .finish()
    }
}

fn fill(info: &mut DirectInfo, reader: &Reader, file_type: FileType) {
    info.path.clear();
    info.path.extend_from_slice(&reader.base);
    info.path.extend_from_slice(&reader.name);
    info.name_start = reader.base.len();
    info.file_type = file_type;
}

/// Lending listing with `readdir` file types. See [`direct_ls`].
#[derive(Debug)]
pub struct DirectLs {
    reader: Reader,
    info: DirectInfo,
}

impl DirectLs {
    pub fn advance(&mut self) -> Option<&DirectInfo> {
        let file_type = self.reader.next_entry()?;
        fill(&mut self.info, &self.reader, file_type);
        Some(&self.info)
    }

    /// `stat` of `info` relative to the listed directory, following symlinks.
    pub fn stat_at(&self, info: &DirectInfo) -> Result<Stat> {
        stat_at(&self.reader, info)
    }
}

/// Lending listing with `fstatat` file types. See [`stat_ls`].
#[derive(Debug)]
pub struct StatLs {
    reader: Reader,
    info: DirectInfo,
}

impl StatLs {
    pub fn advance(&mut self) -> Option<&DirectInfo> {
        loop {
            self.reader.next_entry()?;
            match sys::fstatat(self.reader.stream.fd(), &self.reader.name, true) {
                Ok(st) => {
                    fill(&mut self.info, &self.reader, st.file_type());
                    return Some(&self.info);
                }
                Err(error) => {
                    trace!(%error, "entry vanished before stat, skipping");
                }
            }
        }
    }

    /// `stat` of `info` relative to the listed directory, following symlinks.
    pub fn stat_at(&self, info: &DirectInfo) -> Result<Stat> {
        stat_at(&self.reader, info)
    }
}

fn stat_at(reader: &Reader, info: &DirectInfo) -> Result<Stat> {
    io_result(
        "fstatat",
        sys::fstatat(reader.stream.fd(), info.name_bytes(), false),
    )
}

/// Call `visitor(name, dir)` for every entry of `dir`, descending into
/// subdirectories when `recursive` is set. Subdirectories that cannot be
/// opened are skipped.
pub fn dir_list<F>(dir: impl AsRef<Path>, recursive: bool, mut visitor: F) -> Result<()>
where
    F: FnMut(&str, &Path),
{
    list_into(dir.as_ref(), recursive, &mut visitor)
}

fn list_into(dir: &Path, recursive: bool, visitor: &mut dyn FnMut(&str, &Path)) -> Result<()> {
    let mut entries = stat_ls(dir)?;
    while let Some(info) = entries.advance() {
        visitor(&info.name().to_string_lossy(), dir);
        if recursive && info.file_type().is_dir() {
            let sub = info.path().to_path_buf();
            if let Err(error) = list_into(&sub, recursive, visitor) {
                debug!(dir = %sub.display(), %error, "skipping subdirectory");
            }
        }
    }
    Ok(())
}
