//! faceid CLI - resolve, merge and inspect face identities.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod output;

use commands::{
    ForgetPhotoCommand, GcCommand, ListCommand, MergeCommand, ResolveCommand, ShowCommand,
};

/// faceid CLI - stable person ids for the faces in a photo collection.
///
/// Identities are kept in a redb database under the configured data
/// directory. Configuration is read from ~/.photoid/faceid/config.yaml.
#[derive(Parser)]
#[command(name = "faceid")]
#[command(about = "Face identity resolution CLI")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.photoid/faceid/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the faces of one photo to identities
    Resolve(ResolveCommand),
    /// Fold one identity into another
    Merge(MergeCommand),
    /// Delete identities no photo references anymore
    Gc(GcCommand),
    /// Remove a photo and collect orphaned identities
    ForgetPhoto(ForgetPhotoCommand),
    /// List identities
    List(ListCommand),
    /// Show one identity
    Show(ShowCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Resolve(cmd) => cmd.run(&cli).await,
        Commands::Merge(cmd) => cmd.run(&cli).await,
        Commands::Gc(cmd) => cmd.run(&cli).await,
        Commands::ForgetPhoto(cmd) => cmd.run(&cli).await,
        Commands::List(cmd) => cmd.run(&cli).await,
        Commands::Show(cmd) => cmd.run(&cli).await,
    }
}
