//! Temporary files and directories created from a `XXXXXX` template.
//!
//! The six placeholders either end the template or come right before the
//! extension of its last component (`cache-XXXXXX.json`). A template without
//! a path separator is created in the configured temporary directory.

use std::fs::{DirBuilder, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use rand::distr::{Alphanumeric, SampleString};
use tracing::trace;

use crate::config::TmpConfig;
use crate::error::{map_io_error, FileError, Result};

const PLACEHOLDER: &str = "XXXXXX";
const ATTEMPTS: usize = 128;

/// Create a new file from `template` in the default temporary directory.
pub fn mkstemp(template: &str) -> Result<(PathBuf, File)> {
    TmpConfig::default().mkstemp(template)
}

/// Create a new directory from `template` in the default temporary directory.
pub fn mkdtemp(template: &str) -> Result<PathBuf> {
    TmpConfig::default().mkdtemp(template)
}

impl TmpConfig {
    /// Create a new file, mode `0600`, opened for reading and writing.
    pub fn mkstemp(&self, template: &str) -> Result<(PathBuf, File)> {
        let template = Template::parse(self, template, true)?;
        template.create(|path| {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(path)
        })
    }

    /// Create a new directory, mode `0700`.
    pub fn mkdtemp(&self, template: &str) -> Result<PathBuf> {
        let template = Template::parse(self, template, false)?;
        let (path, ()) = template.create(|path| DirBuilder::new().mode(0o700).create(path))?;
        Ok(path)
    }
}

#[derive(Debug)]
struct Template {
    dir: Option<PathBuf>,
    prefix: String,
    suffix: String,
}

impl Template {
    fn parse(config: &TmpConfig, template: &str, allow_suffix: bool) -> Result<Self> {
        let (dir, dir_part, name) = match template.rfind('/') {
            Some(pos) => (None, &template[..=pos], &template[pos + 1..]),
            None => (Some(config.dir()), "", template),
        };

        let at = if name.ends_with(PLACEHOLDER) {
            name.len() - PLACEHOLDER.len()
        } else if allow_suffix {
            let dot = name.rfind('.').ok_or(FileError::InvalidArgument)?;
            if !name[..dot].ends_with(PLACEHOLDER) {
                return Err(FileError::InvalidArgument);
            }
            dot - PLACEHOLDER.len()
        } else {
            return Err(FileError::InvalidArgument);
        };

        Ok(Self {
            dir,
            prefix: format!("{dir_part}{}", &name[..at]),
            suffix: name[at + PLACEHOLDER.len()..].to_string(),
        })
    }

    fn path_for(&self, random: &str) -> PathBuf {
        let name = format!("{}{random}{}", self.prefix, self.suffix);
        match &self.dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    fn create<T>(&self, mut make: impl FnMut(&Path) -> io::Result<T>) -> Result<(PathBuf, T)> {
        let mut rng = rand::rng();
        for _ in 0..ATTEMPTS {
            let path = self.path_for(&Alphanumeric.sample_string(&mut rng, PLACEHOLDER.len()));
            match make(&path) {
                Ok(value) => {
                    trace!(path = %path.display(), "created temporary entry");
                    return Ok((path, value));
                }
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(error) => return Err(map_io_error("create temporary", error)),
            }
        }
        Err(map_io_error(
            "create temporary",
            io::Error::from(io::ErrorKind::AlreadyExists),
        ))
    }
}
