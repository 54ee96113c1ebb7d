use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod cli;
mod error;
mod images;
mod runtime;
mod server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides server.port)
        #[arg(long, short)]
        port: Option<u16>,
    },
    /// Check configuration for errors and unused options
    CheckConfig,
    /// Pull images and write them as one tar archive, without the HTTP server
    Save(cli::save::SaveArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `save` can write the archive to stdout.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => cli::backend::handle_serve(host, port).await,
        Commands::CheckConfig => cli::backend::handle_check_config(),
        Commands::Save(args) => cli::save::handle_save(args).await,
    }
}
