use std::ffi::CStr;
use std::io;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::ptr::NonNull;

use super::{errno, path_cstring, set_errno};
use crate::stat::FileType;

// Not exported by libc on every target; the value is shared by Linux and the BSDs.
const DT_WHT: u8 = 14;

/// An open `DIR*` stream.
pub(crate) struct DirStream {
    dirp: NonNull<libc::DIR>,
}

// A `DIR*` may move between threads as long as only one of them uses it at a
// time, which `&mut self` on `next_entry` guarantees.
unsafe impl Send for DirStream {}

impl DirStream {
    pub(crate) fn open(path: &Path) -> io::Result<Self> {
        let cpath = path_cstring(path)?;
        let dirp = unsafe { libc::opendir(cpath.as_ptr()) };
        NonNull::new(dirp)
            .map(|dirp| Self { dirp })
            .ok_or_else(io::Error::last_os_error)
    }

    /// Descriptor of the stream, valid for `*at` calls while `self` lives.
    pub(crate) fn fd(&self) -> RawFd {
        unsafe { libc::dirfd(self.dirp.as_ptr()) }
    }

    /// Next raw entry, `.` and `..` included. `Ok(None)` at the end.
    pub(crate) fn next_entry(&mut self) -> io::Result<Option<(&CStr, FileType)>> {
        set_errno(0);
        let ent = unsafe { libc::readdir(self.dirp.as_ptr()) };
        if ent.is_null() {
            let err = errno();
            if err == 0 {
                return Ok(None);
            }
            return Err(io::Error::from_raw_os_error(err));
        }
        let (name, d_type) = unsafe {
            (
                CStr::from_ptr((*ent).d_name.as_ptr()),
                (*ent).d_type,
            )
        };
        Ok(Some((name, file_type_from_dirent(d_type))))
    }
}

impl Drop for DirStream {
    fn drop(&mut self) {
        unsafe { libc::closedir(self.dirp.as_ptr()) };
    }
}

fn file_type_from_dirent(d_type: u8) -> FileType {
    match d_type {
        libc::DT_FIFO => FileType::Fifo,
        libc::DT_CHR => FileType::CharDevice,
        libc::DT_DIR => FileType::Directory,
        libc::DT_BLK => FileType::BlockDevice,
        libc::DT_REG => FileType::Regular,
        libc::DT_LNK => FileType::Symlink,
        libc::DT_SOCK => FileType::Socket,
        DT_WHT => FileType::Whiteout,
        _ => FileType::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_sees_pseudo_entries_and_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"x").unwrap();

        let mut stream = DirStream::open(dir.path()).unwrap();
        assert!(stream.fd() >= 0);
        let mut names = Vec::new();
        while let Some((name, _)) = stream.next_entry().unwrap() {
            names.push(name.to_bytes().to_vec());
        }
        names.sort();
        assert_eq!(names, vec![b".".to_vec(), b"..".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn missing_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirStream::open(&dir.path().join("missing")).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn dirent_types_decode() {
        assert_eq!(file_type_from_dirent(libc::DT_DIR), FileType::Directory);
        assert_eq!(file_type_from_dirent(libc::DT_REG), FileType::Regular);
        assert_eq!(file_type_from_dirent(libc::DT_UNKNOWN), FileType::Unknown);
    }
}
