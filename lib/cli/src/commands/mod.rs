//! The commands available in the `filemap` binary.
mod cp;
mod lines;
mod ls;
mod stat;
mod xattr;

use std::path::PathBuf;

use anyhow::Context;
use filemap::{FileConfig, FileRegistry};

pub use self::{cp::Cp, lines::Lines, ls::Ls, stat::Stat, xattr::Xattr};
use crate::logging::Output;

/// An executable CLI command.
pub(crate) trait CliCommand {
    fn run(self, env: &Env) -> Result<(), anyhow::Error>;
}

/// What every command gets to work with.
#[derive(Debug)]
pub(crate) struct Env {
    pub config: FileConfig,
    pub registry: FileRegistry,
}

impl Env {
    fn load(config: Option<&PathBuf>) -> Result<Self, anyhow::Error> {
        let config = match config {
            Some(path) => FileConfig::from_file(path)
                .with_context(|| format!("failed to load `{}`", path.display()))?,
            None => FileConfig::default(),
        };
        tracing::debug!(?config, "configuration loaded");
        Ok(Env {
            registry: FileRegistry::with_config(config.clone()),
            config,
        })
    }
}

/// Command-line arguments for the `filemap` CLI.
#[derive(clap::Parser, Debug)]
#[clap(name = "filemap", about = concat!("filemap ", env!("CARGO_PKG_VERSION")))]
#[clap(disable_version_flag = true)] // handled manually
pub struct FilemapCmd {
    /// Print version info and exit.
    #[clap(short = 'V', long)]
    version: bool,
    /// Read library settings from this TOML file.
    #[clap(long, env = "FILEMAP_CONFIG", global = true)]
    config: Option<PathBuf>,
    #[clap(flatten)]
    output: Output,
    #[clap(subcommand)]
    cmd: Option<Cmd>,
}

impl FilemapCmd {
    fn execute(self) -> Result<(), anyhow::Error> {
        let FilemapCmd {
            version,
            config,
            output,
            cmd,
        } = self;

        output.initialize_logging();

        if version {
            return print_version(output.is_verbose());
        }

        let Some(cmd) = cmd else {
            use clap::CommandFactory;
            FilemapCmd::command().print_help()?;
            return Ok(());
        };

        let env = Env::load(config.as_ref())?;
        match cmd {
            Cmd::Ls(ls) => ls.run(&env),
            Cmd::Lines(lines) => lines.run(&env),
            Cmd::Cp(cp) => cp.run(&env),
            Cmd::Stat(stat) => stat.run(&env),
            Cmd::Xattr(xattr) => xattr.run(&env),
        }
    }

    /// The main function for the `filemap` CLI tool.
    pub fn run() {
        use clap::Parser;

        let result = match FilemapCmd::try_parse() {
            Ok(args) => args.execute(),
            Err(e) => e.exit(),
        };
        if let Err(error) = result {
            report(&error);
            std::process::exit(1);
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Cmd {
    /// List the entries of a directory
    Ls(Ls),
    /// Print the lines of a file through a memory mapping
    Lines(Lines),
    /// Copy a file, optionally with permissions and extended attributes
    Cp(Cp),
    /// Show what a file handle knows about a file
    Stat(Stat),
    /// List the extended attributes of a file
    Xattr(Xattr),
}

fn report(error: &anyhow::Error) {
    eprintln!("error: {error}");
    for (i, cause) in error.chain().skip(1).enumerate() {
        eprintln!("  {i}: {cause}");
    }
}

fn print_version(verbose: bool) -> Result<(), anyhow::Error> {
    println!("filemap {}", crate::VERSION);
    if verbose {
        println!("binary: {}", env!("CARGO_PKG_NAME"));
        println!("library: filemap {}", filemap::VERSION);
        println!(
            "fault handler: {}",
            FileConfig::default().map.fault_handler
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn subcommands_parse() {
        let cmd = FilemapCmd::try_parse_from(["filemap", "ls", "--stat", "/tmp"]).unwrap();
        assert!(matches!(cmd.cmd, Some(Cmd::Ls(_))));

        let cmd = FilemapCmd::try_parse_from([
            "filemap",
            "cp",
            "--permissions",
            "--xattr",
            "a",
            "b",
        ])
        .unwrap();
        assert!(matches!(cmd.cmd, Some(Cmd::Cp(_))));

        let cmd =
            FilemapCmd::try_parse_from(["filemap", "--config", "x.toml", "stat", "f"]).unwrap();
        assert_eq!(cmd.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn conflicting_listing_modes_are_rejected() {
        assert!(FilemapCmd::try_parse_from(["filemap", "ls", "--stat", "--direct", "."]).is_err());
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        FilemapCmd::command().debug_assert();
    }
}
