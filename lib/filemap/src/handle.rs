//! File handles: reference-counted, real or virtual, mappable files.

use std::fmt;
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{io_result, FileError, Result};
use crate::lines::MapLines;
use crate::map::{MapRef, PopulateRule, Region, RegionKey, RegionTable};
use crate::registry::RegistryShared;
use crate::stat::Stat;
use crate::stringshare::{intern, SharedStr};
use crate::sys::{self, mmap::FileMapping};
use crate::xattr::{XattrNames, XattrValues};

static NEXT_VIRTUAL_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a file, used for deduplication of shared handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileId {
    Real { dev: u64, ino: u64 },
    Virtual(u64),
}

enum Source {
    Real(File),
    Virtual(VirtualData),
}

enum VirtualData {
    Owned(Bytes),
    Borrowed { ptr: usize, len: usize },
}

impl VirtualData {
    fn as_bytes(&self) -> &[u8] {
        match self {
            VirtualData::Owned(bytes) => bytes,
            VirtualData::Borrowed { ptr, len } => unsafe {
                std::slice::from_raw_parts(*ptr as *const u8, *len)
            },
        }
    }
}

pub(crate) struct FileInner {
    // Regions are declared first so they are torn down before the file closes.
    regions: RegionTable,
    id: FileId,
    filename: SharedStr,
    source: Source,
    size: AtomicU64,
    mtime: AtomicI64,
    mtime_nsec: AtomicU32,
    #[cfg_attr(not(feature = "fault-handler"), allow(dead_code))]
    watch_faults: bool,
    registry: Option<Arc<RegistryShared>>,
}

impl FileInner {
    pub(crate) fn real(
        filename: SharedStr,
        file: File,
        st: &Stat,
        watch_faults: bool,
        registry: Option<Arc<RegistryShared>>,
    ) -> Self {
        Self {
            regions: RegionTable::default(),
            id: FileId::Real {
                dev: st.dev,
                ino: st.ino,
            },
            filename,
            source: Source::Real(file),
            size: AtomicU64::new(st.size),
            mtime: AtomicI64::new(st.mtime),
            mtime_nsec: AtomicU32::new(st.mtimensec),
            watch_faults,
            registry,
        }
    }

    /// Whether the cached snapshot still describes `st`.
    pub(crate) fn matches(&self, st: &Stat) -> bool {
        self.size.load(Ordering::Acquire) == st.size
            && self.mtime.load(Ordering::Acquire) == st.mtime
            && self.mtime_nsec.load(Ordering::Acquire) == st.mtimensec
    }
}

impl Drop for FileInner {
    fn drop(&mut self) {
        trace!(file = %self.filename, "closing file handle");
        if let (Some(registry), FileId::Real { dev, ino }) = (&self.registry, self.id) {
            registry.forget((dev, ino), self as *const FileInner);
        }
    }
}

/// An open file, real or virtual.
///
/// Cloning (or [`FileHandle::duplicate`]) produces another owner of the same
/// handle; the file is closed and every region unmapped when the last owner
/// is dropped.
#[derive(Clone)]
pub struct FileHandle {
    pub(crate) inner: Arc<FileInner>,
}

impl FileHandle {
    pub(crate) fn from_inner(inner: Arc<FileInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<FileInner> {
        Arc::downgrade(&self.inner)
    }

    /// A virtual file holding a private copy of `data`.
    pub fn virtualize_copy(name: Option<&str>, data: &[u8]) -> FileHandle {
        Self::virtualize_bytes(name, Bytes::copy_from_slice(data))
    }

    /// A virtual file backed by `data`, without copying.
    pub fn virtualize_bytes(name: Option<&str>, data: Bytes) -> FileHandle {
        Self::new_virtual(name, VirtualData::Owned(data))
    }

    /// A virtual file aliasing caller memory.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes, and the memory must
    /// neither move, change nor be freed while any owner of the returned
    /// handle (or any region mapped from it) is alive.
    pub unsafe fn virtualize_borrowed(name: Option<&str>, ptr: *const u8, len: usize) -> FileHandle {
        Self::new_virtual(
            name,
            VirtualData::Borrowed {
                ptr: ptr as usize,
                len,
            },
        )
    }

    fn new_virtual(name: Option<&str>, data: VirtualData) -> FileHandle {
        let id = NEXT_VIRTUAL_ID.fetch_add(1, Ordering::Relaxed);
        let filename = match name {
            Some(name) => intern(name),
            None => intern(&format!("virtual://{id}")),
        };
        let size = data.as_bytes().len() as u64;
        debug!(file = %filename, size, "virtual file created");
        FileHandle::from_inner(Arc::new(FileInner {
            regions: RegionTable::default(),
            id: FileId::Virtual(id),
            filename,
            source: Source::Virtual(data),
            size: AtomicU64::new(size),
            mtime: AtomicI64::new(0),
            mtime_nsec: AtomicU32::new(0),
            watch_faults: false,
            registry: None,
        }))
    }

    /// Another owner of this handle.
    pub fn duplicate(&self) -> FileHandle {
        self.clone()
    }

    /// Give up this owner. The last close tears the handle down.
    pub fn close(self) {}

    pub fn id(&self) -> FileId {
        self.inner.id
    }

    pub fn filename(&self) -> &SharedStr {
        &self.inner.filename
    }

    /// Size in bytes, as of open time or the last [`FileHandle::refresh`].
    pub fn size(&self) -> u64 {
        self.inner.size.load(Ordering::Acquire)
    }

    /// Modification time as `(seconds, nanoseconds)`. Zero for virtual files.
    pub fn mtime(&self) -> (i64, u32) {
        (
            self.inner.mtime.load(Ordering::Acquire),
            self.inner.mtime_nsec.load(Ordering::Acquire),
        )
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.inner.source, Source::Virtual(_))
    }

    /// Whether this handle takes part in deduplication.
    pub fn is_shared(&self) -> bool {
        self.inner.registry.is_some()
    }

    /// Number of owners of this handle.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// True if both values own the same handle.
    pub fn same_handle(&self, other: &FileHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of distinct live regions.
    pub fn region_count(&self) -> usize {
        self.inner.regions.len()
    }

    pub(crate) fn regions(&self) -> &RegionTable {
        &self.inner.regions
    }

    pub(crate) fn file(&self) -> Result<&File> {
        match &self.inner.source {
            Source::Real(file) => Ok(file),
            Source::Virtual(_) => Err(FileError::Unsupported),
        }
    }

    /// Re-read size and mtime from the file system. Live regions are not
    /// remapped; they keep showing the range they were created for.
    ///
    /// Returns whether anything changed.
    pub fn refresh(&self) -> Result<bool> {
        let file = match &self.inner.source {
            Source::Real(file) => file,
            Source::Virtual(_) => return Ok(false),
        };
        let st = io_result("fstat", sys::fstat(file.as_raw_fd()))?;
        if self.inner.matches(&st) {
            return Ok(false);
        }
        self.inner.size.store(st.size, Ordering::Release);
        self.inner.mtime.store(st.mtime, Ordering::Release);
        self.inner.mtime_nsec.store(st.mtimensec, Ordering::Release);
        debug!(file = %self.inner.filename, size = st.size, "file changed on disk");
        Ok(true)
    }

    /// Map the whole file.
    pub fn map_all(&self, rule: PopulateRule) -> Result<MapRef<'_>> {
        self.map_range(rule, 0, self.size())
    }

    /// Map `[offset, offset + length)`. The range must lie inside the file
    /// as currently known.
    pub fn map_range(&self, rule: PopulateRule, offset: u64, length: u64) -> Result<MapRef<'_>> {
        let end = offset.checked_add(length).ok_or(FileError::OutOfRange)?;
        if end > self.size() {
            return Err(FileError::OutOfRange);
        }
        let len = usize::try_from(length).map_err(|_| FileError::OutOfRange)?;
        let key = RegionKey {
            offset,
            len,
            class: rule.class(),
        };

        let region = self.inner.regions.acquire(key, || self.create_region(key))?;
        let map = MapRef::new(self, region);
        map.apply(rule);
        Ok(map)
    }

    fn create_region(&self, key: RegionKey) -> Result<Region> {
        match &self.inner.source {
            Source::Virtual(data) => {
                let start = key.offset as usize;
                let bytes = data
                    .as_bytes()
                    .get(start..start + key.len)
                    .ok_or(FileError::OutOfRange)?;
                Ok(Region::memory(key, bytes))
            }
            Source::Real(file) => {
                let mapping =
                    FileMapping::new(file.as_raw_fd(), key.offset, key.len).map_err(|error| {
                        debug!(
                            file = %self.inner.filename,
                            offset = key.offset,
                            len = key.len,
                            %error,
                            "mmap failed"
                        );
                        FileError::MapFailed
                    })?;
                #[allow(unused_mut)]
                let mut region = Region::file(key, mapping);
                #[cfg(feature = "fault-handler")]
                if self.inner.watch_faults && key.len != 0 {
                    sys::fault::install();
                    region.watch_faults();
                }
                Ok(region)
            }
        }
    }

    /// Release `map`. Equivalent to dropping it.
    pub fn unmap(&self, map: MapRef<'_>) {
        debug_assert!(
            map.belongs_to(self),
            "region released through a handle that does not own it"
        );
        drop(map);
    }

    /// Whether an access to `map` raised a fault since it was mapped.
    pub fn map_faulted(&self, map: &MapRef<'_>) -> bool {
        debug_assert!(map.belongs_to(self));
        map.is_faulted()
    }

    /// Map the whole file sequentially and walk it line by line.
    pub fn map_lines(&self) -> Result<MapLines<'_>> {
        Ok(MapLines::new(self.map_all(PopulateRule::Sequential)?))
    }

    /// Names of the extended attributes of the underlying file.
    pub fn xattr_names(&self) -> Result<XattrNames> {
        XattrNames::new(self.file()?)
    }

    /// Names and values of the extended attributes of the underlying file.
    /// Values are read one at a time as the iterator advances.
    pub fn xattr_values(&self) -> Result<XattrValues<'_>> {
        XattrValues::new(self.file()?)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("filename", &self.inner.filename)
            .field("id", &self.inner.id)
            .field("size", &self.size())
            .field("shared", &self.is_shared())
            .finish()
    }
}

fn _assert() {
    fn _assert_send_sync<T: Send + Sync>() {}
    _assert_send_sync::<FileHandle>();
    _assert_send_sync::<MapRef<'static>>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn copied_virtual_file_is_independent() {
        let mut data = b"hello world".to_vec();
        let handle = FileHandle::virtualize_copy(Some("greeting"), &data);
        data[0] = b'J';

        let map = handle.map_all(PopulateRule::Populate).unwrap();
        assert_eq!(&*map, b"hello world");
        assert_eq!(handle.filename(), "greeting");
        assert!(handle.is_virtual());
        assert!(!handle.is_shared());
    }

    #[test]
    fn borrowed_virtual_file_aliases_the_buffer() {
        let mut data = b"abc".to_vec();
        let ptr = data.as_mut_ptr();
        let handle = unsafe { FileHandle::virtualize_borrowed(None, ptr, data.len()) };
        unsafe { *ptr = b'x' };
        let map = handle.map_all(PopulateRule::Random).unwrap();
        assert_eq!(&*map, b"xbc");
        assert!(handle.filename().starts_with("virtual://"));
        drop(map);
        drop(handle);
        drop(data);
    }

    #[test]
    fn virtual_files_have_distinct_ids() {
        let a = FileHandle::virtualize_copy(None, b"");
        let b = FileHandle::virtualize_copy(None, b"");
        assert_ne!(a.id(), b.id());
        assert_ne!(a.filename(), b.filename());
    }

    #[test]
    fn virtual_refresh_and_xattr() {
        let handle = FileHandle::virtualize_bytes(None, Bytes::from_static(b"data"));
        assert_eq!(handle.refresh(), Ok(false));
        assert_eq!(handle.xattr_names().err(), Some(FileError::Unsupported));
        assert_eq!(handle.xattr_values().err(), Some(FileError::Unsupported));
        assert_eq!(handle.mtime(), (0, 0));
    }

    #[test]
    fn duplicate_shares_the_handle() {
        let handle = FileHandle::virtualize_copy(None, b"123");
        let dup = handle.duplicate();
        assert!(dup.same_handle(&handle));
        assert_eq!(handle.ref_count(), 2);
        dup.close();
        assert_eq!(handle.ref_count(), 1);
    }
}
