use std::path::PathBuf;

use anyhow::{Context, Result};
use filemap::{CopyFlags, FileCopy};

use super::{CliCommand, Env};

/// The options for the `filemap cp` subcommand
#[derive(Debug, clap::Parser)]
pub struct Cp {
    /// Copy the permission bits
    #[clap(long)]
    permissions: bool,
    /// Copy extended attributes
    #[clap(long)]
    xattr: bool,
    /// Report progress on stderr
    #[clap(long)]
    progress: bool,
    /// Stop (and remove the destination) once this many bytes were copied
    #[clap(long, value_name = "BYTES")]
    limit: Option<u64>,
    /// Source file
    #[clap(name = "SRC")]
    src: PathBuf,
    /// Destination file; replaced if it exists
    #[clap(name = "DST")]
    dst: PathBuf,
}

impl Cp {
    fn flags(&self) -> CopyFlags {
        let mut flags = CopyFlags::empty();
        flags.set(CopyFlags::PERMISSIONS, self.permissions);
        flags.set(CopyFlags::XATTR, self.xattr);
        flags
    }
}

impl CliCommand for Cp {
    fn run(self, env: &Env) -> Result<()> {
        let (report, limit) = (self.progress, self.limit);
        FileCopy::with_config(&env.config.copy)
            .flags(self.flags())
            .progress(move |done, total| {
                if report {
                    eprintln!("{done}/{total}");
                }
                limit.is_none_or(|limit| done < limit)
            })
            .copy(&self.src, &self.dst)
            .with_context(|| {
                format!(
                    "failed to copy `{}` to `{}`",
                    self.src.display(),
                    self.dst.display()
                )
            })
    }
}
