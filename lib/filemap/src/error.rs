use std::io;
use thiserror::Error;
use tracing::debug;

pub type Result<T> = std::result::Result<T, FileError>;

/// Error type for external users
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileError {
    /// The requested file or directory could not be found
    #[error("entity not found")]
    NotFound,
    /// Caller was not allowed to perform this operation
    #[error("access denied")]
    AccessDenied,
    /// Something failed when doing IO. These errors can generally not be handled.
    /// It may work if tried again.
    #[error("io error")]
    IoError,
    /// The requested range does not fit inside the file
    #[error("range is outside of the file")]
    OutOfRange,
    /// The OS refused to map the requested range
    #[error("memory mapping failed")]
    MapFailed,
    /// The operation has no meaning for this kind of handle (e.g. xattrs on a virtual file)
    #[error("operation not supported")]
    Unsupported,
    /// A required argument was empty or malformed
    #[error("invalid argument")]
    InvalidArgument,
    /// The operation was cancelled by its progress callback
    #[error("operation aborted")]
    Aborted,
}

impl FileError {
    /// Stable string name (logging only).
    pub fn as_str(&self) -> &'static str {
        match self {
            FileError::NotFound => "not_found",
            FileError::AccessDenied => "access_denied",
            FileError::IoError => "io",
            FileError::OutOfRange => "out_of_range",
            FileError::MapFailed => "map_failed",
            FileError::Unsupported => "unsupported",
            FileError::InvalidArgument => "invalid_argument",
            FileError::Aborted => "aborted",
        }
    }
}

impl From<io::Error> for FileError {
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::NotFound => FileError::NotFound,
            io::ErrorKind::PermissionDenied => FileError::AccessDenied,
            io::ErrorKind::InvalidInput => FileError::InvalidArgument,
            io::ErrorKind::Unsupported => FileError::Unsupported,
            _ => match io_error.raw_os_error() {
                Some(libc::ENOTDIR) | Some(libc::ELOOP) => FileError::NotFound,
                Some(libc::EPERM) => FileError::AccessDenied,
                Some(libc::ENOTSUP) => FileError::Unsupported,
                _ => FileError::IoError,
            },
        }
    }
}

pub(crate) fn map_io_error(context: &'static str, err: io::Error) -> FileError {
    debug!(context, error = %err, "io operation failed");
    FileError::from(err)
}

pub(crate) fn io_result<T>(context: &'static str, result: io::Result<T>) -> Result<T> {
    result.map_err(|err| map_io_error(context, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_to_file_errors() {
        assert_eq!(
            FileError::from(io::Error::from(io::ErrorKind::NotFound)),
            FileError::NotFound
        );
        assert_eq!(
            FileError::from(io::Error::from(io::ErrorKind::PermissionDenied)),
            FileError::AccessDenied
        );
        assert_eq!(
            FileError::from(io::Error::from_raw_os_error(libc::ENOTDIR)),
            FileError::NotFound
        );
        assert_eq!(
            FileError::from(io::Error::other("boom")),
            FileError::IoError
        );
        // Only a progress callback can abort; EINTR is a plain I/O failure.
        assert_eq!(
            FileError::from(io::Error::from(io::ErrorKind::Interrupted)),
            FileError::IoError
        );
    }
}
