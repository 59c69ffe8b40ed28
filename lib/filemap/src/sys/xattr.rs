//! `flistxattr`/`fgetxattr`/`fsetxattr` with the size-probe dance.

use std::ffi::CStr;
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;

use super::cstring;

/// All attribute names of `fd`, NUL-separated as the kernel returns them.
pub(crate) fn list(fd: RawFd) -> io::Result<Vec<u8>> {
    loop {
        let res = unsafe { flistxattr(fd, ptr::null_mut(), 0) };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        if res == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; res as usize];
        let res = unsafe { flistxattr(fd, buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
        if res < 0 {
            let err = io::Error::last_os_error();
            // The list grew between the two calls.
            if err.raw_os_error() == Some(libc::ERANGE) {
                continue;
            }
            return Err(err);
        }
        buf.truncate(res as usize);
        return Ok(buf);
    }
}

pub(crate) fn get(fd: RawFd, name: &CStr) -> io::Result<Vec<u8>> {
    loop {
        let res = unsafe { fgetxattr(fd, name.as_ptr(), ptr::null_mut(), 0) };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        let mut buf = vec![0u8; res as usize];
        let res = unsafe {
            fgetxattr(
                fd,
                name.as_ptr(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if res < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ERANGE) {
                continue;
            }
            return Err(err);
        }
        buf.truncate(res as usize);
        return Ok(buf);
    }
}

pub(crate) fn set(fd: RawFd, name: &[u8], value: &[u8]) -> io::Result<()> {
    let name = cstring(name)?;
    let res = unsafe {
        fsetxattr(
            fd,
            name.as_ptr(),
            value.as_ptr() as *const libc::c_void,
            value.len(),
        )
    };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn flistxattr(fd: RawFd, buf: *mut libc::c_char, size: usize) -> isize {
    unsafe { libc::flistxattr(fd, buf, size) }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn fgetxattr(
    fd: RawFd,
    name: *const libc::c_char,
    buf: *mut libc::c_void,
    size: usize,
) -> isize {
    unsafe { libc::fgetxattr(fd, name, buf, size) }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn fsetxattr(
    fd: RawFd,
    name: *const libc::c_char,
    value: *const libc::c_void,
    size: usize,
) -> i32 {
    unsafe { libc::fsetxattr(fd, name, value, size, 0) }
}

#[cfg(target_os = "macos")]
unsafe fn flistxattr(fd: RawFd, buf: *mut libc::c_char, size: usize) -> isize {
    unsafe { libc::flistxattr(fd, buf, size, 0) }
}

#[cfg(target_os = "macos")]
unsafe fn fgetxattr(
    fd: RawFd,
    name: *const libc::c_char,
    buf: *mut libc::c_void,
    size: usize,
) -> isize {
    unsafe { libc::fgetxattr(fd, name, buf, size, 0, 0) }
}

#[cfg(target_os = "macos")]
unsafe fn fsetxattr(
    fd: RawFd,
    name: *const libc::c_char,
    value: *const libc::c_void,
    size: usize,
) -> i32 {
    unsafe { libc::fsetxattr(fd, name, value, size, 0, 0) }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
unsafe fn flistxattr(_fd: RawFd, _buf: *mut libc::c_char, _size: usize) -> isize {
    super::set_errno(libc::ENOTSUP);
    -1
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
unsafe fn fgetxattr(
    _fd: RawFd,
    _name: *const libc::c_char,
    _buf: *mut libc::c_void,
    _size: usize,
) -> isize {
    super::set_errno(libc::ENOTSUP);
    -1
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
unsafe fn fsetxattr(
    _fd: RawFd,
    _name: *const libc::c_char,
    _value: *const libc::c_void,
    _size: usize,
) -> i32 {
    super::set_errno(libc::ENOTSUP);
    -1
}
