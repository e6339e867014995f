use clap::Parser;

mod cli;
mod handlers;
mod utils;

use cli::{Cli, Command};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Command::Version => {
            println!("tapo {}", env!("CARGO_PKG_VERSION"));
            println!("tapo-core {}", tapo_core::VERSION);
        }

        Command::Device { target, command } => {
            handlers::handle_device(target, command, cli.username, cli.password_stdin).await;
        }

        Command::Watch {
            target,
            interval,
            power,
        } => {
            handlers::handle_watch(target, interval, power, cli.username, cli.password_stdin)
                .await;
        }
    }
}
