//! Read-only file mappings and the madvise family.

use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::slice;

use crate::map::PopulateRule;

/// Round `addr` down to the nearest multiple of `page_size`.
fn round_down_to_page_size(addr: usize, page_size: usize) -> usize {
    addr & !(page_size - 1)
}

/// A read-only, shared mapping of `[offset, offset + len)` of a file.
///
/// The OS mapping starts at the page boundary below `offset`; `skew` is the
/// distance between that boundary and the first requested byte.
#[derive(Debug)]
pub(crate) struct FileMapping {
    // Note that this is stored as a `usize` instead of a `*const` or `*mut`
    // pointer to allow this structure to be natively `Send` and `Sync` without
    // `unsafe impl`. The mapping is read-only and never moves.
    base: usize,
    map_len: usize,
    skew: usize,
}

impl FileMapping {
    /// An empty mapping that owns no OS resources.
    pub(crate) fn empty() -> Self {
        // Rust's slices require non-null pointers, even when empty. `Vec`
        // contains code to create a non-null dangling pointer value when
        // constructed empty, so we reuse that here.
        let empty = Vec::<u8>::new();
        Self {
            base: empty.as_ptr() as usize,
            map_len: 0,
            skew: 0,
        }
    }

    pub(crate) fn new(fd: RawFd, offset: u64, len: usize) -> io::Result<Self> {
        // Mmap may return EINVAL if the size is zero, so just
        // special-case that.
        if len == 0 {
            return Ok(Self::empty());
        }

        let page_size = super::page_size() as u64;
        let aligned = offset & !(page_size - 1);
        let skew = (offset - aligned) as usize;
        let map_len = len
            .checked_add(skew)
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;
        let file_offset = libc::off_t::try_from(aligned)
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                fd,
                file_offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            base: ptr as usize,
            map_len,
            skew,
        })
    }

    /// Address of the first requested byte.
    pub(crate) fn as_ptr(&self) -> *const u8 {
        (self.base + self.skew) as *const u8
    }

    /// Number of requested bytes (without the page skew).
    pub(crate) fn len(&self) -> usize {
        self.map_len - self.skew
    }

    /// The whole OS mapping, as `(start, len)`.
    pub(crate) fn os_range(&self) -> (usize, usize) {
        (self.base, self.map_len)
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.as_ptr(), self.len()) }
    }
}

impl Drop for FileMapping {
    fn drop(&mut self) {
        if self.map_len != 0 {
            #[cfg(feature = "fault-handler")]
            debug_assert!(
                !super::fault::is_watched(self.base),
                "unmapping a range that is still watched for faults"
            );
            let r = unsafe { libc::munmap(self.base as *mut libc::c_void, self.map_len) };
            if r != 0 {
                tracing::warn!(
                    error = %io::Error::last_os_error(),
                    len = self.map_len,
                    "munmap failed"
                );
            }
        }
    }
}

fn _assert() {
    fn _assert_send_sync<T: Send + Sync>() {}
    _assert_send_sync::<FileMapping>();
}

/// Apply an access hint or a release request to `bytes`, which must lie
/// inside a file mapping created by [`FileMapping::new`].
pub(crate) fn advise(bytes: &[u8], rule: PopulateRule) -> io::Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    if rule == PopulateRule::Populate {
        touch_pages(bytes);
        return Ok(());
    }

    let page_size = super::page_size();
    let start = round_down_to_page_size(bytes.as_ptr() as usize, page_size);
    let len = bytes.as_ptr() as usize + bytes.len() - start;
    let advice = match rule {
        PopulateRule::Random => libc::MADV_RANDOM,
        PopulateRule::Sequential => libc::MADV_SEQUENTIAL,
        PopulateRule::WillNeed => libc::MADV_WILLNEED,
        PopulateRule::DontNeed => libc::MADV_DONTNEED,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        PopulateRule::Remove => libc::MADV_REMOVE,
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        PopulateRule::Remove => libc::MADV_DONTNEED,
        PopulateRule::Populate => unreachable!(),
    };
    let r = unsafe { libc::madvise(start as *mut libc::c_void, len, advice) };
    if r != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Fault in every page of `bytes` by reading one byte per page.
pub(crate) fn touch_pages(bytes: &[u8]) -> u8 {
    let page_size = super::page_size();
    let mut acc = 0u8;
    for offset in (0..bytes.len()).step_by(page_size) {
        acc ^= unsafe { ptr::read_volatile(bytes.as_ptr().add(offset)) };
    }
    if let Some(last) = bytes.last() {
        acc ^= unsafe { ptr::read_volatile(last) };
    }
    std::hint::black_box(acc)
}
