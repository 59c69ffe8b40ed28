use std::path::PathBuf;

use anyhow::{Context, Result};
use filemap::{FileHandle, FileId};

use super::{CliCommand, Env};

/// The options for the `filemap stat` subcommand
#[derive(Debug, clap::Parser)]
pub struct Stat {
    /// Open through the shared handle table
    #[clap(long)]
    shared: bool,
    /// File to inspect
    #[clap(name = "FILE")]
    path: PathBuf,
}

fn describe(handle: &FileHandle) -> Vec<(&'static str, String)> {
    let (secs, nanos) = handle.mtime();
    let id = match handle.id() {
        FileId::Real { dev, ino } => format!("{dev}:{ino}"),
        FileId::Virtual(id) => format!("virtual #{id}"),
    };
    vec![
        ("file", handle.filename().to_string()),
        ("id", id),
        ("size", handle.size().to_string()),
        ("mtime", format!("{secs}.{nanos:09}")),
        ("shared", handle.is_shared().to_string()),
        ("references", handle.ref_count().to_string()),
    ]
}

impl CliCommand for Stat {
    fn run(self, env: &Env) -> Result<()> {
        let handle = env
            .registry
            .open(&self.path, self.shared)
            .with_context(|| format!("failed to open `{}`", self.path.display()))?;
        for (key, value) in describe(&handle) {
            println!("{key:<10} {value}");
        }
        Ok(())
    }
}
