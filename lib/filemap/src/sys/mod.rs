//! Thin wrappers around the libc calls the rest of the crate needs.
//!
//! Everything that touches raw pointers or file descriptors lives below this
//! module; callers above it only see slices, `io::Result`s and owned types.

pub(crate) mod dir;
#[cfg(feature = "fault-handler")]
pub(crate) mod fault;
pub(crate) mod mmap;
pub(crate) mod xattr;

use std::ffi::CString;
use std::io;
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

use crate::stat::Stat;

pub(crate) fn cstring(bytes: &[u8]) -> io::Result<CString> {
    CString::new(bytes).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "name contains NUL"))
}

pub(crate) fn path_cstring(path: &Path) -> io::Result<CString> {
    cstring(path.as_os_str().as_bytes())
}

pub(crate) fn fstat(fd: RawFd) -> io::Result<Stat> {
    let mut st = unsafe { mem::zeroed::<libc::stat>() };
    let res = unsafe { libc::fstat(fd, &mut st) };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(stat_from_libc(&st))
}

pub(crate) fn fstatat(dirfd: RawFd, name: &[u8], nofollow: bool) -> io::Result<Stat> {
    let cstr = cstring(name)?;
    let mut st = unsafe { mem::zeroed::<libc::stat>() };
    let flags = if nofollow {
        libc::AT_SYMLINK_NOFOLLOW
    } else {
        0
    };
    let res = unsafe { libc::fstatat(dirfd, cstr.as_ptr(), &mut st, flags) };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(stat_from_libc(&st))
}

/// Set or clear `FD_CLOEXEC` on `fd`.
pub fn close_on_exec(fd: &impl AsRawFd, on: bool) -> io::Result<()> {
    let fd = fd.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let flags = if on {
        flags | libc::FD_CLOEXEC
    } else {
        flags & !libc::FD_CLOEXEC
    };
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn page_size() -> usize {
    region::page::size()
}

fn stat_from_libc(st: &libc::stat) -> Stat {
    let (atime, mtime, ctime) = stat_times(st);
    Stat {
        dev: st.st_dev as u64,
        ino: st.st_ino as u64,
        mode: st.st_mode as u32,
        nlink: st.st_nlink as u64,
        uid: st.st_uid,
        gid: st.st_gid,
        rdev: st.st_rdev as u64,
        size: st.st_size as u64,
        blksize: st.st_blksize as u64,
        blocks: st.st_blocks as u64,
        atime: atime.0,
        atimensec: atime.1,
        mtime: mtime.0,
        mtimensec: mtime.1,
        ctime: ctime.0,
        ctimensec: ctime.1,
    }
}

#[cfg(target_os = "macos")]
fn stat_times(st: &libc::stat) -> ((i64, u32), (i64, u32), (i64, u32)) {
    (
        (st.st_atime as i64, st.st_atime_nsec as u32),
        (st.st_mtime as i64, st.st_mtime_nsec as u32),
        (st.st_birthtime as i64, st.st_birthtime_nsec as u32),
    )
}

#[cfg(not(target_os = "macos"))]
fn stat_times(st: &libc::stat) -> ((i64, u32), (i64, u32), (i64, u32)) {
    (
        (st.st_atime as i64, st.st_atime_nsec as u32),
        (st.st_mtime as i64, st.st_mtime_nsec as u32),
        (st.st_ctime as i64, st.st_ctime_nsec as u32),
    )
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) fn errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

#[cfg(any(target_os = "macos", target_os = "freebsd"))]
pub(crate) fn errno() -> i32 {
    unsafe { *libc::__error() }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) fn set_errno(val: i32) {
    unsafe {
        *libc::__errno_location() = val;
    }
}

#[cfg(any(target_os = "macos", target_os = "freebsd"))]
pub(crate) fn set_errno(val: i32) {
    unsafe {
        *libc::__error() = val;
    }
}
