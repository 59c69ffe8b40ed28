//! Whole-file copy with progress reporting.

use std::fmt;
use std::fs::{File, OpenOptions, Permissions};
use std::io::{self, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use bitflags::bitflags;
use tracing::{debug, trace};

use crate::config::CopyConfig;
use crate::error::{io_result, FileError, Result};
use crate::sys;
use crate::xattr;

bitflags! {
    /// What to copy besides the data, which is always copied.
    pub struct CopyFlags: u32 {
        /// Copy the permission bits.
        const PERMISSIONS = 1 << 0;
        /// Copy the extended attributes.
        const XATTR = 1 << 1;
    }
}

type Progress<'a> = Box<dyn FnMut(u64, u64) -> bool + 'a>;

/// Builder for a file copy, in the spirit of [`std::fs::OpenOptions`].
///
/// ```no_run
/// use filemap::{CopyFlags, FileCopy};
///
/// FileCopy::new()
///     .flags(CopyFlags::PERMISSIONS)
///     .progress(|done, total| {
///         println!("{done}/{total}");
///         true
///     })
///     .copy("/tmp/a", "/tmp/b")?;
/// # Ok::<(), filemap::FileError>(())
/// ```
pub struct FileCopy<'a> {
    flags: CopyFlags,
    config: CopyConfig,
    progress: Option<Progress<'a>>,
}

impl<'a> FileCopy<'a> {
    pub fn new() -> Self {
        Self::with_config(&CopyConfig::default())
    }

    pub fn with_config(config: &CopyConfig) -> Self {
        Self {
            flags: CopyFlags::empty(),
            config: config.clone(),
            progress: None,
        }
    }

    pub fn flags(&mut self, flags: CopyFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    pub fn permissions(&mut self, on: bool) -> &mut Self {
        self.flags.set(CopyFlags::PERMISSIONS, on);
        self
    }

    pub fn xattr(&mut self, on: bool) -> &mut Self {
        self.flags.set(CopyFlags::XATTR, on);
        self
    }

    /// Called with `(done, total)` after every chunk. Returning `false`
    /// aborts the copy.
    pub fn progress(&mut self, progress: impl FnMut(u64, u64) -> bool + 'a) -> &mut Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Copy `src` to `dst`, replacing `dst`. On any failure, including an
    /// abort from the progress callback, `dst` is removed.
    pub fn copy(&mut self, src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
        let (src, dst) = (src.as_ref(), dst.as_ref());
        if src.as_os_str().is_empty() || dst.as_os_str().is_empty() {
            return Err(FileError::InvalidArgument);
        }
        let source = io_result("open", File::open(src))?;
        let st = io_result("fstat", sys::fstat(source.as_raw_fd()))?;
        let target = io_result(
            "create",
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(dst),
        )?;

        let result = self.copy_open(&source, &target, st.size, st.permissions());
        drop(target);
        if let Err(error) = result {
            debug!(dst = %dst.display(), %error, "copy failed, removing the destination");
            if let Err(error) = std::fs::remove_file(dst) {
                debug!(dst = %dst.display(), %error, "unable to remove the destination");
            }
            return Err(error);
        }
        Ok(())
    }

    fn copy_open(&mut self, source: &File, target: &File, total: u64, mode: u32) -> Result<()> {
        self.copy_data(source, target, total)?;
        if self.flags.contains(CopyFlags::PERMISSIONS) {
            io_result(
                "fchmod",
                target.set_permissions(Permissions::from_mode(mode)),
            )?;
        }
        if self.flags.contains(CopyFlags::XATTR) {
            xattr::copy_all(source, target)?;
        }
        Ok(())
    }

    fn copy_data(&mut self, mut source: &File, mut target: &File, total: u64) -> Result<()> {
        let chunk_size = self.config.chunk_size.max(1);
        let mut fast_path = self.config.fast_path;
        let mut buf = Vec::new();
        let mut done = 0u64;

        loop {
            let copied = if fast_path {
                match retry_interrupted(|| copy_range(source, target, chunk_size)) {
                    Ok(n) => n,
                    Err(error) => {
                        debug!(%error, "copy_file_range unavailable, falling back to read/write");
                        fast_path = false;
                        continue;
                    }
                }
            } else {
                if buf.is_empty() {
                    buf.resize(chunk_size, 0);
                }
                let n = io_result("read", retry_interrupted(|| source.read(&mut buf)))?;
                io_result("write", target.write_all(&buf[..n]))?;
                n
            };
            if copied == 0 {
                break;
            }

            done += copied as u64;
            trace!(done, total, "copied chunk");
            if let Some(progress) = self.progress.as_mut() {
                if !progress(done, total) {
                    debug!(done, total, "copy aborted by progress callback");
                    return Err(FileError::Aborted);
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FileCopy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCopy")
            .field("flags", &self.flags)
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Default for FileCopy<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy `src` to `dst` with default settings and no progress reporting.
pub fn copy(src: impl AsRef<Path>, dst: impl AsRef<Path>, flags: CopyFlags) -> Result<()> {
    FileCopy::new().flags(flags).copy(src, dst)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn copy_range(source: &File, target: &File, len: usize) -> io::Result<usize> {
    let res = unsafe {
        libc::copy_file_range(
            source.as_raw_fd(),
            std::ptr::null_mut(),
            target.as_raw_fd(),
            std::ptr::null_mut(),
            len,
            0,
        )
    };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(res as usize)
}

/// Run `op` again for as long as it fails with `EINTR`.
fn retry_interrupted<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                trace!("interrupted system call, retrying");
            }
            result => return result,
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn copy_range(_source: &File, _target: &File, _len: usize) -> io::Result<usize> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn interrupted_calls_are_retried() {
        let mut attempts = 0;
        let result = retry_interrupted(|| {
            attempts += 1;
            if attempts < 3 {
                Err(io::Error::from(io::ErrorKind::Interrupted))
            } else {
                Ok(attempts)
            }
        });
        assert_eq!(result.unwrap(), 3);

        let err = retry_interrupted(|| -> io::Result<()> { Err(io::Error::other("boom")) })
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn flags_toggle() {
        let mut copy = FileCopy::new();
        copy.permissions(true).xattr(true);
        assert_eq!(copy.flags, CopyFlags::PERMISSIONS | CopyFlags::XATTR);
        copy.xattr(false);
        assert_eq!(copy.flags, CopyFlags::PERMISSIONS);
    }

    #[test]
    #[traced_test]
    fn read_write_fallback_copies_everything() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        let data: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        std::fs::write(&src, &data).unwrap();

        let config = CopyConfig {
            chunk_size: 4096,
            fast_path: false,
        };
        let mut calls = Vec::new();
        FileCopy::with_config(&config)
            .progress(|done, total| {
                calls.push((done, total));
                true
            })
            .copy(&src, &dst)
            .unwrap();

        assert_eq!(std::fs::read(&dst).unwrap(), data);
        assert_eq!(calls, vec![(4096, 10_000), (8192, 10_000), (10_000, 10_000)]);
        assert!(logs_contain("copied chunk"));
    }

    #[test]
    fn missing_source_leaves_no_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("dst");
        let err = copy(dir.path().join("missing"), &dst, CopyFlags::empty()).unwrap_err();
        assert_eq!(err, FileError::NotFound);
        assert!(!dst.exists());
    }
}
