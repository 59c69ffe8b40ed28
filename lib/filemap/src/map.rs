//! Map regions: one live mapping of a byte range of a [`FileHandle`].
//!
//! Every handle owns a [`RegionTable`]. Requests for the same
//! `(offset, length)` with compatible rules share one region; the table keeps
//! the per-region reference count and drops the OS mapping when it reaches
//! zero.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::slice;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{FileError, Result};
use crate::handle::FileHandle;
use crate::lines::Lines;
#[cfg(feature = "fault-handler")]
use crate::sys::fault::FaultSlot;
use crate::sys::mmap::{self, FileMapping};

/// Access-pattern hint or eager action applied to a mapped range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PopulateRule {
    /// Pages will be accessed in random order.
    Random,
    /// Pages will be accessed front to back.
    Sequential,
    /// Pages will be needed soon; start reading them in.
    WillNeed,
    /// Fault in every page right now.
    Populate,
    /// Drop the pages from memory. Advisory.
    DontNeed,
    /// Drop the pages and free the backing store where supported. Advisory.
    Remove,
}

impl PopulateRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            PopulateRule::Random => "random",
            PopulateRule::Sequential => "sequential",
            PopulateRule::WillNeed => "willneed",
            PopulateRule::Populate => "populate",
            PopulateRule::DontNeed => "dontneed",
            PopulateRule::Remove => "remove",
        }
    }

    pub(crate) fn class(&self) -> RuleClass {
        match self {
            PopulateRule::Random
            | PopulateRule::Sequential
            | PopulateRule::WillNeed
            | PopulateRule::Populate => RuleClass::Access,
            PopulateRule::DontNeed | PopulateRule::Remove => RuleClass::Release,
        }
    }
}

impl fmt::Display for PopulateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rules of the same class may share a region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum RuleClass {
    Access,
    Release,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct RegionKey {
    pub(crate) offset: u64,
    pub(crate) len: usize,
    pub(crate) class: RuleClass,
}

#[derive(Debug)]
pub(crate) enum Backing {
    /// An OS mapping of a real file.
    File(FileMapping),
    /// A window into the bytes of a virtual file. The handle keeps them alive.
    Memory { ptr: usize, len: usize },
}

#[derive(Debug)]
pub(crate) struct Region {
    key: RegionKey,
    // Field order matters: the fault slot must be released before `backing`
    // unmaps, or a new mapping at the same address could match a dead slot.
    #[cfg(feature = "fault-handler")]
    fault: Option<FaultSlot>,
    backing: Backing,
}

impl Region {
    pub(crate) fn file(key: RegionKey, mapping: FileMapping) -> Self {
        Self {
            key,
            backing: Backing::File(mapping),
            #[cfg(feature = "fault-handler")]
            fault: None,
        }
    }

    pub(crate) fn memory(key: RegionKey, bytes: &[u8]) -> Self {
        Self {
            key,
            backing: Backing::Memory {
                ptr: bytes.as_ptr() as usize,
                len: bytes.len(),
            },
            #[cfg(feature = "fault-handler")]
            fault: None,
        }
    }

    /// Watch the OS range of this region for SIGBUS.
    #[cfg(feature = "fault-handler")]
    pub(crate) fn watch_faults(&mut self) {
        if let Backing::File(mapping) = &self.backing {
            let (start, len) = mapping.os_range();
            self.fault = FaultSlot::register(start, len);
        }
    }

    fn as_bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::File(mapping) => mapping.as_slice(),
            Backing::Memory { ptr, len } => unsafe { slice::from_raw_parts(*ptr as *const u8, *len) },
        }
    }

    fn is_faulted(&self) -> bool {
        #[cfg(feature = "fault-handler")]
        {
            self.fault.as_ref().is_some_and(FaultSlot::is_faulted)
        }
        #[cfg(not(feature = "fault-handler"))]
        {
            false
        }
    }

    /// Apply `rule` to `bytes`, a sub-slice of this region. Failures are
    /// logged and otherwise ignored: every rule is a hint.
    fn apply(&self, rule: PopulateRule, bytes: &[u8]) {
        match &self.backing {
            Backing::File(_) => {
                if let Err(error) = mmap::advise(bytes, rule) {
                    trace!(rule = rule.as_str(), %error, "madvise failed");
                }
            }
            // Advice on heap memory is meaningless; only touching pages is honored.
            Backing::Memory { .. } => {
                if rule == PopulateRule::Populate {
                    mmap::touch_pages(bytes);
                }
            }
        }
    }
}

struct RegionEntry {
    region: Arc<Region>,
    refs: usize,
}

/// The regions of one handle, behind the handle's own lock.
#[derive(Default)]
pub(crate) struct RegionTable {
    entries: Mutex<HashMap<RegionKey, RegionEntry>>,
}

impl RegionTable {
    /// Return the region for `key`, creating it with `create` when no
    /// compatible one is live. `create` runs under the table lock, so two
    /// racing callers can never both map the same key.
    pub(crate) fn acquire(
        &self,
        key: RegionKey,
        create: impl FnOnce() -> Result<Region>,
    ) -> Result<Arc<Region>> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&key) {
            entry.refs += 1;
            trace!(offset = key.offset, len = key.len, refs = entry.refs, "reusing map region");
            return Ok(entry.region.clone());
        }

        let region = Arc::new(create()?);
        entries.insert(
            key,
            RegionEntry {
                region: region.clone(),
                refs: 1,
            },
        );
        trace!(offset = key.offset, len = key.len, "new map region");
        Ok(region)
    }

    /// Drop one reference to `region`. At zero the entry leaves the table.
    pub(crate) fn release(&self, region: &Arc<Region>) {
        let removed = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(&region.key) else {
                debug_assert!(false, "releasing a region that is not mapped");
                return;
            };
            debug_assert!(Arc::ptr_eq(&entry.region, region));
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(&region.key)
            } else {
                None
            }
        };
        // The OS mapping goes away outside of the lock, once the caller's
        // own reference is dropped too.
        if removed.is_some() {
            trace!(offset = region.key.offset, len = region.key.len, "map region released");
        }
    }

    fn refs(&self, key: &RegionKey) -> usize {
        self.entries.lock().get(key).map_or(0, |entry| entry.refs)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl fmt::Debug for RegionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionTable")
            .field("regions", &self.len())
            .finish()
    }
}

/// A live reference to a map region. Dropping it unmaps.
///
/// The guard borrows the handle it came from, so it can never outlive it.
/// It dereferences to the mapped bytes, which start exactly at the requested
/// offset.
pub struct MapRef<'h> {
    handle: &'h FileHandle,
    region: Arc<Region>,
}

impl<'h> MapRef<'h> {
    pub(crate) fn new(handle: &'h FileHandle, region: Arc<Region>) -> Self {
        Self { handle, region }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.region.as_bytes()
    }

    /// Offset of the first byte inside the file.
    pub fn offset(&self) -> u64 {
        self.region.key.offset
    }

    pub fn len(&self) -> usize {
        self.region.key.len
    }

    pub fn is_empty(&self) -> bool {
        self.region.key.len == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.as_bytes().as_ptr()
    }

    /// The handle this region belongs to.
    pub fn handle(&self) -> &'h FileHandle {
        self.handle
    }

    /// Number of live references to the underlying region.
    pub fn ref_count(&self) -> usize {
        self.handle.regions().refs(&self.region.key)
    }

    /// True if both guards point at the same underlying region.
    pub fn same_region(&self, other: &MapRef<'_>) -> bool {
        Arc::ptr_eq(&self.region, &other.region)
    }

    /// Re-apply `rule` to `[offset, offset + length)`, relative to the start
    /// of this region. The reference count is left alone.
    pub fn populate(&self, rule: PopulateRule, offset: usize, length: usize) -> Result<()> {
        let end = offset.checked_add(length).ok_or(FileError::OutOfRange)?;
        let bytes = self.as_bytes().get(offset..end).ok_or(FileError::OutOfRange)?;
        self.region.apply(rule, bytes);
        Ok(())
    }

    /// Sticky flag, set once an access to this region raised SIGBUS.
    pub fn is_faulted(&self) -> bool {
        self.region.is_faulted()
    }

    /// Iterate over the lines of the mapped bytes.
    pub fn lines(&self) -> Lines<'_> {
        Lines::new(self.as_bytes())
    }

    pub(crate) fn apply(&self, rule: PopulateRule) {
        self.region.apply(rule, self.as_bytes());
    }

    pub(crate) fn belongs_to(&self, handle: &FileHandle) -> bool {
        self.handle.same_handle(handle)
    }
}

impl Deref for MapRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for MapRef<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for MapRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapRef")
            .field("file", &self.handle.filename())
            .field("offset", &self.offset())
            .field("len", &self.len())
            .finish()
    }
}

impl Drop for MapRef<'_> {
    fn drop(&mut self) {
        self.handle.regions().release(&self.region);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_classes_split_access_from_release() {
        for rule in [
            PopulateRule::Random,
            PopulateRule::Sequential,
            PopulateRule::WillNeed,
            PopulateRule::Populate,
        ] {
            assert_eq!(rule.class(), RuleClass::Access);
        }
        assert_eq!(PopulateRule::DontNeed.class(), RuleClass::Release);
        assert_eq!(PopulateRule::Remove.class(), RuleClass::Release);
    }

    #[test]
    fn table_counts_references() {
        let bytes = b"hello".to_vec();
        let table = RegionTable::default();
        let key = RegionKey {
            offset: 0,
            len: bytes.len(),
            class: RuleClass::Access,
        };
        let a = table.acquire(key, || Ok(Region::memory(key, &bytes))).unwrap();
        let b = table
            .acquire(key, || panic!("compatible region must be reused"))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.refs(&key), 2);

        table.release(&a);
        assert_eq!(table.refs(&key), 1);
        table.release(&b);
        assert_eq!(table.len(), 0);
    }

    #[cfg(feature = "fault-handler")]
    #[test]
    fn fault_slot_is_released_before_unmapping() {
        use std::io::Write;
        use std::os::unix::io::AsRawFd;

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&[1u8; 8192]).unwrap();
        let key = RegionKey {
            offset: 0,
            len: 8192,
            class: RuleClass::Access,
        };
        let mapping = FileMapping::new(file.as_raw_fd(), 0, 8192).unwrap();
        let (start, _) = mapping.os_range();
        let mut region = Region::file(key, mapping);
        region.watch_faults();
        assert!(crate::sys::fault::is_watched(start));

        // FileMapping::drop asserts the range is no longer watched.
        drop(region);
        assert!(!crate::sys::fault::is_watched(start));
    }

    #[test]
    fn failed_creation_publishes_nothing() {
        let table = RegionTable::default();
        let key = RegionKey {
            offset: 0,
            len: 1,
            class: RuleClass::Access,
        };
        let err = table.acquire(key, || Err(FileError::MapFailed)).unwrap_err();
        assert_eq!(err, FileError::MapFailed);
        assert_eq!(table.len(), 0);
    }
}
