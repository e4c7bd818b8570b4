//! Patchbay CLI - inspect patches, curves and timelines, and play timelines
//! through a patch.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "patchbay")]
#[command(author, version, about = "Patchbay graph engine CLI", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a graph document and report what normalization drops
    Validate(commands::validate::ValidateArgs),

    /// List node types and their ports
    Nodes(commands::nodes::NodesArgs),

    /// Print a shaped curve and its inverse
    Curve(commands::curve::CurveArgs),

    /// Print an envelope's drawn outline
    Envelope(commands::curve::EnvelopeArgs),

    /// Convert between ticks and seconds on a timeline's tempo map
    Tempo(commands::tempo::TempoArgs),

    /// Play a timeline into a graph
    Play(commands::play::PlayArgs),

    /// Manage saved patches and the user config
    Patches(commands::patches::PatchesArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log_level.as_str().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate(args) => commands::validate::run(args),
        Commands::Nodes(args) => commands::nodes::run(args),
        Commands::Curve(args) => commands::curve::run_curve(&args),
        Commands::Envelope(args) => commands::curve::run_envelope(&args),
        Commands::Tempo(args) => commands::tempo::run(args),
        Commands::Play(args) => commands::play::run(args),
        Commands::Patches(args) => commands::patches::run(args),
    }
}
