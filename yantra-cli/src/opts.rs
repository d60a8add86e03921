use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "yantra",
    version,
    about = "Executes user code in isolated, resource-limited Docker sandboxes"
)]
pub struct Opts {
    #[arg(short, long)]
    /// Suppress all output except errors.
    pub quiet: bool,
    #[arg(short, long)]
    /// Enable debug output.
    pub debug: bool,
    #[arg(short, long)]
    /// Enable trace output.
    pub trace: bool,

    #[command(subcommand)]
    /// Subcommand to run
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the HTTP API after migrating the store and seeding the
    /// template catalog.
    Serve,
    /// Runs a worker process draining the job and build queues.
    Worker,
    /// Seeds the curated template catalog and exits.
    Seed,
}
