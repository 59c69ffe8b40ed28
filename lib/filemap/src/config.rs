//! Configuration for the registry, the copy engine and temp-file creation.
//!
//! Every section has a sensible default so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! [map]
//! fault_handler = true
//!
//! [copy]
//! chunk_size = 131072
//! fast_path = true
//!
//! [tmp]
//! dir = "/var/tmp"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read the configuration file {path}")]
    Read {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("unable to parse the configuration")]
    Parse(#[from] toml::de::Error),
    #[error("copy.chunk_size must be greater than zero")]
    ZeroChunkSize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub map: MapConfig,
    pub copy: CopyConfig,
    pub tmp: TmpConfig,
}

impl FileConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: FileConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.copy.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapConfig {
    /// If true, the SIGBUS handler that feeds [`crate::MapRef::is_faulted`]
    /// is installed on the first real mapping.
    pub fault_handler: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            fault_handler: cfg!(feature = "fault-handler"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CopyConfig {
    /// Bytes moved between two progress callbacks.
    pub chunk_size: usize,
    /// Try `copy_file_range` before falling back to read/write.
    pub fast_path: bool,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            chunk_size: 128 * 1024,
            fast_path: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TmpConfig {
    /// Directory used for templates without a path separator.
    pub dir: Option<PathBuf>,
}

impl TmpConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_is_default() {
        let config = FileConfig::from_toml_str("").unwrap();
        assert_eq!(config, FileConfig::default());
        assert_eq!(config.copy.chunk_size, 128 * 1024);
    }

    #[test]
    fn sections_override_defaults() {
        let config = FileConfig::from_toml_str(
            r#"
            [map]
            fault_handler = false

            [copy]
            chunk_size = 4096
            fast_path = false

            [tmp]
            dir = "/var/tmp"
            "#,
        )
        .unwrap();
        assert!(!config.map.fault_handler);
        assert_eq!(config.copy.chunk_size, 4096);
        assert!(!config.copy.fast_path);
        assert_eq!(config.tmp.dir(), PathBuf::from("/var/tmp"));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = FileConfig::from_toml_str("[copy]\nchunk_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ZeroChunkSize));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = FileConfig::from_toml_str("[map]\nprefetch = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
