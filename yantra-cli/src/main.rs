use std::process;

use clap::Parser;
use tracing::error;

mod api;
mod app;
mod fmt;
mod opts;

use opts::{Command, Opts};
use yantra_core::config::Config;

#[tokio::main]
async fn main() {
    let opts = Opts::parse();

    dotenvy::dotenv().ok();
    fmt::setup_tracing(&opts);

    let config = Config::from_env();

    let result = match opts.command {
        Command::Serve => app::serve(config).await,
        Command::Worker => app::worker(config).await,
        Command::Seed => app::seed(config).await,
    };

    if let Err(e) = result {
        error!(reason = %format!("{:?}", e), "execution failed");
        process::exit(1);
    }
}
