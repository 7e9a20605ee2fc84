use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Relays CI stage status to a build badge server", long_about = None)]
pub struct Cli {
    /// Chemin du fichier de configuration TOML.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Utilise un layer JSON pour les logs (`--features json-logs`).
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    pub json_logs: bool,

    /// Filtre de logs explicite (ex. "badge_relay=debug").
    #[arg(long, value_name = "FILTER", global = true)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept plugin requests from the CI host over HTTP.
    Serve {
        /// Remplace `server.listen`.
        #[arg(long, value_name = "ADDR")]
        listen: Option<SocketAddr>,
    },
    /// Forward a single stage-status event and print the host response.
    Notify {
        /// Fichier d'événement ; stdin si absent.
        #[arg(long, value_name = "PATH")]
        event: Option<PathBuf>,

        /// URL de base du serveur de badges, prioritaire sur la configuration.
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;

    #[test]
    fn parses_notify_with_global_flags() {
        let cli = match Cli::try_parse_from([
            "badge-relay",
            "notify",
            "--event",
            "event.json",
            "--log-filter",
            "debug",
        ]) {
            Ok(cli) => cli,
            Err(err) => panic!("parse failed: {err}"),
        };
        assert_eq!(cli.log_filter.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::Notify { event: Some(_), base_url: None }));
    }

    #[test]
    fn serve_listen_must_be_an_address() {
        assert!(Cli::try_parse_from(["badge-relay", "serve", "--listen", "nowhere"]).is_err());
    }
}
