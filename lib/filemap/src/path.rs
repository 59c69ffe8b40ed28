//! Path helpers.

use std::path::{Component, Path, PathBuf};

use crate::error::{io_result, FileError, Result};

/// Upper bound for any path this crate builds or reports.
pub const PATH_MAX: usize = 8192;

/// Separator placed between the parts by [`join`].
#[cfg(not(windows))]
pub const PATH_SEP: char = '/';
#[cfg(windows)]
pub const PATH_SEP: char = '\\';

/// Make `path` absolute against the current directory and collapse `.`,
/// `..` and repeated separators. Symlinks are left alone.
pub fn sanitize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(FileError::InvalidArgument);
    }
    if path.is_absolute() {
        return Ok(normalize_path(path));
    }
    let cwd = io_result("current_dir", std::env::current_dir())?;
    Ok(normalize_path(&cwd.join(path)))
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut components = path.components().peekable();
    let mut ret = if let Some(c @ Component::Prefix(..)) = components.peek().cloned() {
        components.next();
        PathBuf::from(c.as_os_str())
    } else {
        PathBuf::new()
    };

    for component in components {
        match component {
            Component::Prefix(..) => unreachable!(),
            Component::RootDir => ret.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                ret.pop();
            }
            Component::Normal(c) => ret.push(c),
        }
    }
    ret
}

/// Write `a`, [`PATH_SEP`] and `b` into `dst` as a NUL-terminated string.
///
/// At most `dst.len() - 1` bytes are written before the NUL; nothing at all
/// is written into an empty buffer. Returns the length of the full joined
/// path, so a result `>= dst.len()` means the output was truncated.
pub fn join_len(dst: &mut [u8], a: &[u8], b: &[u8]) -> usize {
    let mut sep = [0u8; 4];
    let sep = PATH_SEP.encode_utf8(&mut sep).as_bytes();
    let total = a.len() + sep.len() + b.len();

    let Some(room) = dst.len().checked_sub(1) else {
        return total;
    };
    let mut written = 0;
    for part in [a, sep, b] {
        let n = part.len().min(room - written);
        dst[written..written + n].copy_from_slice(&part[..n]);
        written += n;
    }
    dst[written] = 0;
    total
}

/// [`join_len`] for string parts.
pub fn join(dst: &mut [u8], a: &str, b: &str) -> usize {
    join_len(dst, a.as_bytes(), b.as_bytes())
}

/// The non-empty components of `path`, split on `/`.
pub fn split(path: &str) -> Vec<&str> {
    path.split(PATH_SEP).filter(|part| !part.is_empty()).collect()
}

/// Remove a file or an empty directory.
pub fn unlink(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(FileError::InvalidArgument);
    }
    let meta = io_result("symlink_metadata", std::fs::symlink_metadata(path))?;
    if meta.is_dir() {
        io_result("rmdir", std::fs::remove_dir(path))
    } else {
        io_result("unlink", std::fs::remove_file(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sanitize_collapses_dots_and_separators() {
        assert_eq!(
            sanitize("/usr//lib/./x/../y").unwrap(),
            PathBuf::from("/usr/lib/y")
        );
        assert_eq!(sanitize("/..").unwrap(), PathBuf::from("/"));
        assert_eq!(sanitize("").err(), Some(FileError::InvalidArgument));
    }

    #[test]
    fn sanitize_anchors_relative_paths() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(sanitize("a/../b").unwrap(), cwd.join("b"));
    }

    #[test]
    fn join_fits() {
        let mut buf = [0xffu8; 16];
        assert_eq!(join(&mut buf, "usr", "lib"), 7);
        assert_eq!(&buf[..8], b"usr/lib\0");
    }

    #[test]
    fn join_truncates_like_snprintf() {
        let mut buf = [0xffu8; 5];
        assert_eq!(join_len(&mut buf, b"usr", b"lib"), 7);
        assert_eq!(&buf, b"usr/\0");

        let mut empty: [u8; 0] = [];
        assert_eq!(join(&mut empty, "a", "b"), 3);
    }

    #[test]
    fn split_drops_empty_parts() {
        assert_eq!(split("/usr//lib/"), vec!["usr", "lib"]);
        assert!(split("").is_empty());
    }

    #[test]
    fn unlink_removes_files_and_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        let sub = dir.path().join("d");
        std::fs::write(&file, b"x").unwrap();
        std::fs::create_dir(&sub).unwrap();

        unlink(&file).unwrap();
        unlink(&sub).unwrap();
        assert!(!file.exists());
        assert!(!sub.exists());
        assert_eq!(unlink(&file).err(), Some(FileError::NotFound));
    }
}
