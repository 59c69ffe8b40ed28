//! Deduplication of shared file handles.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::FileConfig;
use crate::error::{io_result, FileError, Result};
use crate::handle::{FileHandle, FileInner};
use crate::path;
use crate::stringshare::intern;
use crate::sys;

static GLOBAL: Lazy<FileRegistry> = Lazy::new(FileRegistry::new);

/// State shared between a registry and the shared handles it created.
#[derive(Default)]
pub(crate) struct RegistryShared {
    handles: Mutex<HashMap<(u64, u64), Weak<FileInner>>>,
}

impl RegistryShared {
    /// Remove the entry for `key` if it still belongs to `dying`.
    pub(crate) fn forget(&self, key: (u64, u64), dying: *const FileInner) {
        let mut handles = self.handles.lock();
        if handles
            .get(&key)
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), dying))
        {
            handles.remove(&key);
        }
    }
}

/// Opens files and hands out shared handles keyed by `(device, inode)`.
///
/// Most programs use [`FileRegistry::global`]; tests and embedders that
/// want isolation create their own.
pub struct FileRegistry {
    shared: Arc<RegistryShared>,
    config: FileConfig,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::with_config(FileConfig::default())
    }

    pub fn with_config(config: FileConfig) -> Self {
        Self {
            shared: Arc::new(RegistryShared::default()),
            config,
        }
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> &'static FileRegistry {
        &GLOBAL
    }

    pub fn config(&self) -> &FileConfig {
        &self.config
    }

    /// Number of live shared handles.
    pub fn len(&self) -> usize {
        self.shared
            .handles
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open `path` for reading.
    ///
    /// With `shared`, a live shared handle for the same file is returned
    /// instead of a new one. If that handle no longer matches the file on
    /// disk (size or mtime changed), it is detached: its current owners keep
    /// it, and later opens get a fresh handle.
    pub fn open(&self, path: impl AsRef<Path>, shared: bool) -> Result<FileHandle> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(FileError::InvalidArgument);
        }
        let full_path = path::sanitize(path)?;
        let file = io_result("open", File::open(&full_path))?;
        let st = io_result("fstat", sys::fstat(file.as_raw_fd()))?;
        let filename = intern(&full_path.to_string_lossy());
        let watch_faults = self.config.map.fault_handler;

        if !shared {
            trace!(file = %filename, "opening unshared handle");
            return Ok(FileHandle::from_inner(Arc::new(FileInner::real(
                filename,
                file,
                &st,
                watch_faults,
                None,
            ))));
        }

        let key = (st.dev, st.ino);
        // Declared before the guard so a stale handle is dropped after the
        // lock is released: its teardown needs the same lock.
        let mut stale = None;
        let mut handles = self.shared.handles.lock();
        if let Some(existing) = handles.get(&key).and_then(Weak::upgrade) {
            if existing.matches(&st) {
                trace!(file = %filename, "reusing shared handle");
                return Ok(FileHandle::from_inner(existing));
            }
            debug!(file = %filename, "shared handle is stale, detaching it");
            handles.remove(&key);
            stale = Some(existing);
        }

        let handle = FileHandle::from_inner(Arc::new(FileInner::real(
            filename,
            file,
            &st,
            watch_faults,
            Some(self.shared.clone()),
        )));
        handles.insert(key, handle.downgrade());
        drop(handles);
        drop(stale);
        trace!(file = %handle.filename(), "opened shared handle");
        Ok(handle)
    }
}

impl fmt::Debug for FileRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRegistry")
            .field("shared_handles", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Open `path` through the process-wide registry.
pub fn open(path: impl AsRef<Path>, shared: bool) -> Result<FileHandle> {
    FileRegistry::global().open(path, shared)
}
