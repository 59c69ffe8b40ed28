use std::path::PathBuf;

use anyhow::{Context, Result};

use super::{CliCommand, Env};

/// The options for the `filemap xattr` subcommand
#[derive(Debug, clap::Parser)]
pub struct Xattr {
    /// Only print attribute names
    #[clap(long)]
    names_only: bool,
    /// File to inspect
    #[clap(name = "FILE")]
    path: PathBuf,
}

impl CliCommand for Xattr {
    fn run(self, env: &Env) -> Result<()> {
        let handle = env
            .registry
            .open(&self.path, false)
            .with_context(|| format!("failed to open `{}`", self.path.display()))?;
        let context = || format!("failed to list attributes of `{}`", self.path.display());

        if self.names_only {
            for name in handle.xattr_names().with_context(context)? {
                println!("{name}");
            }
        } else {
            for (name, value) in handle.xattr_values().with_context(context)? {
                println!("{name}={}", String::from_utf8_lossy(&value));
            }
        }
        Ok(())
    }
}
