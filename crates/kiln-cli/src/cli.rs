use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "kiln",
    about = "Kiln: content-addressed block repository maintenance",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Repository directory
    #[arg(long, global = true, env = "KILN_PATH", default_value = ".kiln")]
    pub repo_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new repository
    Init(InitArgs),
    /// Manipulate the repository
    Repo(RepoArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Maximum repository size, e.g. 10GB or 512MiB
    #[arg(long)]
    pub storage_max: Option<String>,
}

#[derive(Args)]
pub struct RepoArgs {
    #[command(subcommand)]
    pub action: RepoCommand,
}

#[derive(Subcommand)]
pub enum RepoCommand {
    /// Remove unpinned blocks
    Gc(GcArgs),
    /// Show repository statistics
    Stat(StatArgs),
    /// Verify every block against its key
    Verify(VerifyArgs),
    /// Show the repository format version
    Version(VersionArgs),
    /// Unlink the files API root
    RmRoot(RmRootArgs),
}

#[derive(Args)]
pub struct GcArgs {
    /// Report every failure and keep going instead of stopping at the first
    #[arg(long)]
    pub stream_errors: bool,
    /// Print only the keys of removed blocks
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct StatArgs {
    /// Print sizes in human-readable units
    #[arg(long)]
    pub human: bool,
}

#[derive(Args)]
pub struct VerifyArgs {}

#[derive(Args)]
pub struct VersionArgs {
    /// Print only the version
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct RmRootArgs {
    /// Required; this is a potentially dangerous operation
    #[arg(long)]
    pub confirm: bool,
    /// Also unlink a root whose block is stored locally
    #[arg(long)]
    pub remove_local_root: bool,
}
