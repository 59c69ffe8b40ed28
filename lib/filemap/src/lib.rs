//! Memory-mapped file access.
//!
//! `filemap` hands out reference-counted [`FileHandle`]s for real files (opened
//! through a [`FileRegistry`], which deduplicates shared opens of the same
//! file) and for in-memory "virtual" files. Handles map byte ranges on demand;
//! identical requests share one mapping. On top of that sit line iteration,
//! lazy directory listings, and a few file utilities (copy with progress,
//! temporary files, path helpers).
//!
//! ```no_run
//! use filemap::{FileRegistry, PopulateRule};
//!
//! let handle = FileRegistry::global().open("/etc/hosts", true)?;
//! let map = handle.map_all(PopulateRule::Sequential)?;
//! for line in map.lines() {
//!     println!("{:>4} {}", line.index(), line.to_str_lossy());
//! }
//! # Ok::<(), filemap::FileError>(())
//! ```

#![deny(unused_extern_crates)]
#![warn(unused_import_braces, missing_debug_implementations)]

#[cfg(not(unix))]
compile_error!("filemap only supports unix targets");

pub mod config;
pub mod copy;
pub mod dir;
mod error;
mod handle;
mod lines;
mod map;
pub mod path;
mod registry;
pub mod stat;
pub mod stringshare;
pub mod sys;
pub mod tmp;
mod xattr;

pub use crate::config::{ConfigError, CopyConfig, FileConfig, MapConfig, TmpConfig};
pub use crate::copy::{CopyFlags, FileCopy};
pub use crate::dir::{dir_list, direct_ls, ls, stat_ls, DirNames, DirectInfo, DirectLs, StatLs};
pub use crate::error::{FileError, Result};
pub use crate::handle::{FileHandle, FileId};
pub use crate::lines::{Line, Lines, MapLines};
pub use crate::map::{MapRef, PopulateRule};
pub use crate::path::{PATH_MAX, PATH_SEP};
pub use crate::registry::{open, FileRegistry};
pub use crate::stat::{FileType, Stat};
pub use crate::stringshare::SharedStr;
pub use crate::xattr::{XattrNames, XattrValues};

/// Version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
