use std::fmt;

/// Type of a directory entry.
///
/// The ordinal order is not part of the interface; use [`FileType::as_str`]
/// for anything that has to be stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FileType {
    #[default]
    Unknown,
    Fifo,
    CharDevice,
    Directory,
    BlockDevice,
    Regular,
    Symlink,
    Socket,
    Whiteout,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Unknown => "unknown",
            FileType::Fifo => "fifo",
            FileType::CharDevice => "char-device",
            FileType::Directory => "directory",
            FileType::BlockDevice => "block-device",
            FileType::Regular => "regular",
            FileType::Symlink => "symlink",
            FileType::Socket => "socket",
            FileType::Whiteout => "whiteout",
        }
    }

    pub fn is_dir(&self) -> bool {
        *self == FileType::Directory
    }

    pub fn is_file(&self) -> bool {
        *self == FileType::Regular
    }

    /// Decode the `S_IFMT` bits of a `st_mode`.
    pub fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFIFO as u32 => FileType::Fifo,
            m if m == libc::S_IFCHR as u32 => FileType::CharDevice,
            m if m == libc::S_IFDIR as u32 => FileType::Directory,
            m if m == libc::S_IFBLK as u32 => FileType::BlockDevice,
            m if m == libc::S_IFREG as u32 => FileType::Regular,
            m if m == libc::S_IFLNK as u32 => FileType::Symlink,
            m if m == libc::S_IFSOCK as u32 => FileType::Socket,
            _ => FileType::Unknown,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Portable copy of the interesting parts of `struct stat`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stat {
    /// Device the file lives on
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    /// Device id for character and block special files
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime: i64,
    pub atimensec: u32,
    pub mtime: i64,
    pub mtimensec: u32,
    pub ctime: i64,
    pub ctimensec: u32,
}

impl Stat {
    pub fn file_type(&self) -> FileType {
        FileType::from_mode(self.mode)
    }

    /// Permission bits only.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_bits_decode_to_file_types() {
        assert_eq!(
            FileType::from_mode(libc::S_IFREG as u32 | 0o644),
            FileType::Regular
        );
        assert_eq!(
            FileType::from_mode(libc::S_IFDIR as u32 | 0o755),
            FileType::Directory
        );
        assert_eq!(FileType::from_mode(libc::S_IFLNK as u32), FileType::Symlink);
        assert_eq!(FileType::from_mode(0), FileType::Unknown);
    }

    #[test]
    fn names_are_stable() {
        assert_eq!(FileType::CharDevice.as_str(), "char-device");
        assert_eq!(FileType::Whiteout.to_string(), "whiteout");
    }
}
