//! Extended attributes of an open file.

use std::ffi::CStr;
use std::fs::File;
use std::os::unix::io::AsRawFd;

use crate::error::{io_result, Result};
use crate::sys;

/// Attribute names, read in one call and decoded as the iterator advances.
#[derive(Debug)]
pub struct XattrNames {
    list: Vec<u8>,
    pos: usize,
}

impl XattrNames {
    pub(crate) fn new(file: &File) -> Result<Self> {
        let list = io_result("flistxattr", sys::xattr::list(file.as_raw_fd()))?;
        Ok(Self { list, pos: 0 })
    }

    fn next_raw(&mut self) -> Option<&CStr> {
        while self.pos < self.list.len() {
            let rest = &self.list[self.pos..];
            let Ok(name) = CStr::from_bytes_until_nul(rest) else {
                // Malformed tail without a terminator.
                self.pos = self.list.len();
                return None;
            };
            self.pos += name.to_bytes_with_nul().len();
            if !name.is_empty() {
                return Some(name);
            }
        }
        None
    }
}

impl Iterator for XattrNames {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.next_raw()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

/// Attribute names with their values. Each value is fetched when its entry
/// is reached; attributes removed in the meantime are skipped.
#[derive(Debug)]
pub struct XattrValues<'f> {
    file: &'f File,
    names: XattrNames,
}

impl<'f> XattrValues<'f> {
    pub(crate) fn new(file: &'f File) -> Result<Self> {
        Ok(Self {
            file,
            names: XattrNames::new(file)?,
        })
    }
}

impl Iterator for XattrValues<'_> {
    type Item = (String, Vec<u8>);

    fn next(&mut self) -> Option<(String, Vec<u8>)> {
        let fd = self.file.as_raw_fd();
        while let Some(name) = self.names.next_raw() {
            match sys::xattr::get(fd, name) {
                Ok(value) => return Some((name.to_string_lossy().into_owned(), value)),
                Err(error) => {
                    tracing::trace!(name = ?name, %error, "skipping extended attribute");
                }
            }
        }
        None
    }
}

/// Copy every attribute of `from` onto `to`.
pub(crate) fn copy_all(from: &File, to: &File) -> Result<()> {
    let mut names = XattrNames::new(from)?;
    while let Some(name) = names.next_raw() {
        let value = io_result("fgetxattr", sys::xattr::get(from.as_raw_fd(), name))?;
        io_result(
            "fsetxattr",
            sys::xattr::set(to.as_raw_fd(), name.to_bytes(), &value),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_split_on_nul() {
        let mut names = XattrNames {
            list: b"user.a\0user.bb\0".to_vec(),
            pos: 0,
        };
        assert_eq!(names.next().as_deref(), Some("user.a"));
        assert_eq!(names.next().as_deref(), Some("user.bb"));
        assert_eq!(names.next(), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn user_attributes_round_trip_when_supported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        let file = File::create(&path).unwrap();
        if sys::xattr::set(file.as_raw_fd(), b"user.filemap", b"42").is_err() {
            // tmpfs without user xattrs, nothing to check
            return;
        }
        let values: Vec<_> = XattrValues::new(&file).unwrap().collect();
        assert!(values.contains(&("user.filemap".to_string(), b"42".to_vec())));
    }
}
