//! The `filemap` binary lib.
//!
//! A small front end over the [`filemap`] crate: list directories, print
//! the lines of a mapped file, copy with progress, and inspect handles and
//! extended attributes.

#![deny(
    missing_docs,
    dead_code,
    nonstandard_style,
    unused_mut,
    unused_variables,
    unused_unsafe,
    unreachable_patterns
)]

pub mod commands;
pub mod logging;

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
