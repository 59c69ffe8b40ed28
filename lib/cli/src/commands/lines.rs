use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};

use super::{CliCommand, Env};

/// The options for the `filemap lines` subcommand
#[derive(Debug, clap::Parser)]
pub struct Lines {
    /// Only print the number of lines
    #[clap(short, long)]
    count: bool,
    /// Open through the shared handle table
    #[clap(long)]
    shared: bool,
    /// File to read
    #[clap(name = "FILE")]
    path: PathBuf,
}

impl CliCommand for Lines {
    fn run(self, env: &Env) -> Result<()> {
        let handle = env
            .registry
            .open(&self.path, self.shared)
            .with_context(|| format!("failed to open `{}`", self.path.display()))?;
        let mut lines = handle
            .map_lines()
            .with_context(|| format!("failed to map `{}`", self.path.display()))?;

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let mut total = 0;
        while let Some(line) = lines.advance() {
            total = line.index();
            if !self.count {
                writeln!(out, "{:>6}  {}", line.index(), line.to_str_lossy())?;
            }
        }
        if self.count {
            writeln!(out, "{total}")?;
        }

        if lines.map().is_faulted() {
            anyhow::bail!("`{}` changed while it was being read", self.path.display());
        }
        Ok(())
    }
}
