//! Deduplicated, immutable strings used for file names.
//!
//! Interning the same text twice yields two references to one allocation.
//! The pool only keeps weak references: a string is released as soon as the
//! last [`SharedStr`] pointing at it is dropped.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::path::Path;
use std::sync::{Arc, Weak};

const MIN_PRUNE_THRESHOLD: usize = 64;

struct Pool {
    strings: HashMap<Box<str>, Weak<str>>,
    prune_at: usize,
}

static POOL: Lazy<Mutex<Pool>> = Lazy::new(|| {
    Mutex::new(Pool {
        strings: HashMap::new(),
        prune_at: MIN_PRUNE_THRESHOLD,
    })
});

/// A reference to an interned string.
#[derive(Clone)]
pub struct SharedStr(Arc<str>);

/// Returns the shared copy of `text`, creating it if needed.
pub fn intern(text: &str) -> SharedStr {
    let mut pool = POOL.lock();
    if let Some(existing) = pool.strings.get(text).and_then(Weak::upgrade) {
        return SharedStr(existing);
    }

    let shared: Arc<str> = Arc::from(text);
    pool.strings.insert(text.into(), Arc::downgrade(&shared));

    if pool.strings.len() >= pool.prune_at {
        pool.strings.retain(|_, weak| weak.strong_count() > 0);
        pool.prune_at = (pool.strings.len() * 2).max(MIN_PRUNE_THRESHOLD);
    }
    SharedStr(shared)
}

/// Whether `text` currently has at least one live reference.
pub fn is_interned(text: &str) -> bool {
    POOL.lock()
        .strings
        .get(text)
        .is_some_and(|weak| weak.strong_count() > 0)
}

impl SharedStr {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if both values point at the same interned allocation.
    pub fn ptr_eq(&self, other: &SharedStr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for SharedStr {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SharedStr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<Path> for SharedStr {
    fn as_ref(&self) -> &Path {
        Path::new(&*self.0)
    }
}

impl Borrow<str> for SharedStr {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq for SharedStr {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl Eq for SharedStr {}

impl PartialEq<str> for SharedStr {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for SharedStr {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl Hash for SharedStr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl fmt::Debug for SharedStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for SharedStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}
