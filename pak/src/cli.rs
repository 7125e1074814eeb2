use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "pak", about = "Inspect and extract pak archives.", version)]
pub struct Cli {
    /// Log decoding details (overridden by RUST_LOG)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(visible_aliases = ["l", "ls"], about = "List entries in an archive")]
    List(ListArgs),

    #[command(visible_alias = "x", about = "Extract entries from an archive")]
    Extract(ExtractArgs),

    #[command(about = "Show archive metadata and statistics")]
    Info(InfoArgs),

    #[command(visible_aliases = ["t", "test"], about = "Validate entry checksums")]
    Validate(ValidateArgs),
}

#[derive(Debug, clap::Args)]
pub struct ListArgs {
    /// Path to the .pak archive
    pub archive: PathBuf,

    /// Show method, offset and checksum for each entry
    #[arg(short = 'l', long)]
    pub long: bool,
}

#[derive(Debug, clap::Args)]
pub struct ExtractArgs {
    /// Path to the .pak archive to extract
    pub archive: PathBuf,

    /// Output directory (defaults to current directory)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Only extract entries under this path prefix (repeatable)
    #[arg(short = 'p', long = "prefix", value_name = "PREFIX")]
    pub prefixes: Vec<String>,

    /// Replace files that already exist in the output directory
    #[arg(short = 'f', long)]
    pub overwrite: bool,

    /// Skip checksum verification
    #[arg(long)]
    pub no_checksum: bool,

    /// Suppress output (quiet mode)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Number of parallel extraction tasks (default: CPU count)
    #[arg(short = 'j', long = "jobs")]
    pub jobs: Option<usize>,

    /// Specific entries to extract (extracts all if none specified)
    pub files: Vec<String>,
}

#[derive(Debug, clap::Args)]
pub struct InfoArgs {
    /// Path to the .pak archive
    pub archive: PathBuf,

    /// Optional entry path within the archive to show info for
    pub file: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct ValidateArgs {
    /// Path to the .pak archive
    pub archive: PathBuf,

    /// Suppress output (quiet mode)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Number of parallel validation tasks (default: CPU count)
    #[arg(short = 'j', long = "jobs")]
    pub jobs: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_extract_flags() {
        let cli = Cli::parse_from([
            "pak", "-v", "x", "game.pak", "-o", "out", "-p", "Game/Maps", "-p", "Engine", "-j",
            "4", "a.txt",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Extract(args) => {
                assert_eq!(args.prefixes, ["Game/Maps", "Engine"]);
                assert_eq!(args.jobs, Some(4));
                assert_eq!(args.files, ["a.txt"]);
                assert!(!args.overwrite);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
