use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;
mod exit_codes;
mod output;

use cli::{Cli, Globals};

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let globals = Globals::from(&cli);
    let exit_code = match cli.command {
        cli::Command::Streams(args) => commands::streams::execute(&globals, args),
        cli::Command::Destinations(args) => commands::destinations::execute(&globals, args),
        cli::Command::Stream(args) => commands::stream::execute(&globals, args),
        cli::Command::Service(args) => commands::service::execute(&globals, args),
        cli::Command::Clean(args) => commands::clean::execute(&globals, args),
    };

    std::process::exit(exit_code);
}
