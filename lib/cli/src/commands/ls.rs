use std::path::PathBuf;

use anyhow::{Context, Result};

use super::{CliCommand, Env};

/// The options for the `filemap ls` subcommand
#[derive(Debug, clap::Parser)]
pub struct Ls {
    /// Print the file type reported by `readdir` (may be `unknown`)
    #[clap(long)]
    direct: bool,
    /// Print the file type from `stat`; always accurate
    #[clap(long, conflicts_with = "direct")]
    stat: bool,
    /// Descend into subdirectories
    #[clap(short, long, conflicts_with_all = ["direct", "stat"])]
    recursive: bool,
    /// Directory to list
    #[clap(name = "DIR")]
    dir: PathBuf,
}

impl CliCommand for Ls {
    fn run(self, _env: &Env) -> Result<()> {
        let context = || format!("failed to list `{}`", self.dir.display());

        if self.recursive {
            filemap::dir_list(&self.dir, true, |name, parent| {
                println!("{}", parent.join(name).display());
            })
            .with_context(context)?;
        } else if self.direct {
            let mut entries = filemap::direct_ls(&self.dir).with_context(context)?;
            while let Some(info) = entries.advance() {
                println!("{:<9} {}", info.file_type().as_str(), info.path().display());
            }
        } else if self.stat {
            let mut entries = filemap::stat_ls(&self.dir).with_context(context)?;
            while let Some(info) = entries.advance() {
                println!("{:<9} {}", info.file_type().as_str(), info.path().display());
            }
        } else {
            for path in filemap::ls(&self.dir).with_context(context)? {
                println!("{path}");
            }
        }
        Ok(())
    }
}
