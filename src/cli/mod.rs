//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `start` (default) -- connect, register commands and serve webhooks
//! - `config show|path` -- inspect the resolved configuration
//! - `status` -- probe a running instance's health endpoint
//! - `version` -- print build/version info

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Mattermost slash-command poll bot backed by Tarantool.
#[derive(Parser, Debug)]
#[command(
    name = "pollbot",
    version = env!("CARGO_PKG_VERSION"),
    about = "Mattermost poll bot backed by Tarantool"
)]
pub struct Cli {
    /// JSON5 configuration file; environment variables override it.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the bot (default when no subcommand is given).
    Start,

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Check whether a running instance answers its health endpoint.
    Status {
        /// Port of the running instance (default: from config or 8088).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host of the running instance.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Print version, build date, and git commit information.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the fully loaded configuration (secrets redacted) as JSON.
    Show,

    /// Print the configuration file path in use, if any.
    Path,
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

use crate::config::{Config, ServerConfig};
use std::path::Path;

/// Run the `config show` subcommand.
pub fn handle_config_show(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::load(path)?;
    let pretty = serde_json::to_string_pretty(&cfg.redacted())?;
    println!("{}", pretty);
    Ok(())
}

/// Run the `config path` subcommand.
pub fn handle_config_path(path: Option<&Path>) {
    match path {
        Some(path) => println!("{}", path.display()),
        None => println!("(none: defaults and environment only)"),
    }
}

/// Run the `status` subcommand -- probe a running instance's health endpoint.
pub async fn handle_status(
    config_path: Option<&Path>,
    host: &str,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let port = resolve_port(config_path, port);
    let url = format!("http://{}:{}/health", host, port);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            println!("pollbot is running at {}:{}", host, port);
            Ok(())
        }
        Ok(response) => {
            eprintln!("Health endpoint returned HTTP {}", response.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Could not connect to pollbot at {}:{}", host, port);
            eprintln!("  Error: {}", e);
            eprintln!();
            eprintln!("Is the bot running? Start it with: pollbot start");
            std::process::exit(1);
        }
    }
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("pollbot {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("POLLBOT_BUILD_DATE"));
    println!("  Git commit: {}", env!("POLLBOT_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

/// Resolve the port of a running instance.
/// Tries (in order): explicit flag, loaded configuration, the default port.
fn resolve_port(config_path: Option<&Path>, explicit: Option<u16>) -> u16 {
    if let Some(p) = explicit {
        return p;
    }
    Config::load(config_path)
        .map(|cfg| cfg.server.port)
        .unwrap_or_else(|_| ServerConfig::default().port)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_no_args_defaults_to_none() {
        let cli = Cli::try_parse_from(["pollbot"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_start_subcommand() {
        let cli = Cli::try_parse_from(["pollbot", "start"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Start)));
    }

    #[test]
    fn test_cli_version_subcommand() {
        let cli = Cli::try_parse_from(["pollbot", "version"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Version)));
    }

    #[test]
    fn test_cli_config_show_with_file() {
        let cli =
            Cli::try_parse_from(["pollbot", "--config", "/etc/pollbot.json5", "config", "show"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/pollbot.json5")));
        assert!(matches!(
            cli.command,
            Some(Command::Config(ConfigCommand::Show))
        ));
    }

    #[test]
    fn test_cli_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["pollbot", "start", "-c", "bot.json5"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("bot.json5")));
    }

    #[test]
    fn test_cli_status_defaults() {
        let cli = Cli::try_parse_from(["pollbot", "status"]).unwrap();
        match cli.command {
            Some(Command::Status { port, ref host }) => {
                assert_eq!(port, None);
                assert_eq!(host, "127.0.0.1");
            }
            other => panic!("Expected Status, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_status_with_port() {
        let cli = Cli::try_parse_from(["pollbot", "status", "--port", "9000"]).unwrap();
        match cli.command {
            Some(Command::Status { port, .. }) => {
                assert_eq!(port, Some(9000));
            }
            other => panic!("Expected Status, got {:?}", other),
        }
    }

    #[test]
    fn test_build_date_is_iso_or_unknown() {
        let date = env!("POLLBOT_BUILD_DATE");
        let iso = date.len() == 10
            && date
                .char_indices()
                .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
        assert!(iso || date == "unknown", "unexpected build date {:?}", date);
    }

    #[test]
    fn test_resolve_port_explicit() {
        assert_eq!(resolve_port(None, Some(1234)), 1234);
    }

    #[test]
    fn test_resolve_port_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"{ server: { port: 9191 } }").unwrap();
        // PORT in the environment would win over the file.
        if std::env::var("PORT").is_err() {
            assert_eq!(resolve_port(Some(file.path()), None), 9191);
        }
    }

    #[test]
    fn test_resolve_port_unreadable_file_falls_back() {
        if std::env::var("PORT").is_err() {
            assert_eq!(
                resolve_port(Some(Path::new("/nonexistent/pollbot.json5")), None),
                8088
            );
        }
    }
}
