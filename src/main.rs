use clap::Parser;
use pollbot::app::App;
use pollbot::cli::{self, Cli, Command, ConfigCommand};
use pollbot::config::Config;
use std::path::Path;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command.unwrap_or(Command::Start) {
        Command::Start => start(config_path).await,
        Command::Config(ConfigCommand::Show) => cli::handle_config_show(config_path),
        Command::Config(ConfigCommand::Path) => {
            cli::handle_config_path(config_path);
            Ok(())
        }
        Command::Status { port, host } => cli::handle_status(config_path, &host, port).await,
        Command::Version => {
            cli::handle_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn start(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(config_path)?;
    pollbot::logging::init(&config.logging)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting pollbot");

    let app = App::initialize(config).await.map_err(|e| {
        tracing::error!(error = %e, "Startup failed");
        e
    })?;
    app.run().await?;
    Ok(())
}
