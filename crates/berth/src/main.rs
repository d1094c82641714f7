mod cmd;
mod config;
mod engine;
mod error;
mod health;
mod image;
mod paths;
mod probe;
mod status;

use std::fmt;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::time::FormatTime;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

#[derive(Parser)]
#[command(name = "berth", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter berth.yaml deploy config
    Init(cmd::InitArgs),
    /// Build and verify the two-stage runtime image
    Build(cmd::BuildArgs),
    /// Launch the container and supervise it (must run build first)
    Start(cmd::StartArgs),
    /// Print the persisted status of a deployment
    Status(cmd::StatusArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Init(args) => cmd::run_init(args).await.map(|()| ExitCode::SUCCESS),
        Command::Build(args) => cmd::run_build(args).await.map(|()| ExitCode::SUCCESS),
        Command::Start(args) => cmd::run_start(args).await,
        Command::Status(args) => cmd::run_status(args).await.map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
