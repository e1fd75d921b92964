use crate::search::{run_search, SearchArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use stay_search::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Stay Search",
    about = "Serve or run availability-aware unit searches with dynamic pricing",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run a single search against a fixture and print the response as JSON
    Search(SearchArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// JSON fixture used to seed the in-memory index
    #[arg(long)]
    pub(crate) fixture: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Search(args) => run_search(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["stay-search"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn search_command_reads_dates() {
        let cli = Cli::try_parse_from([
            "stay-search",
            "search",
            "--fixture",
            "stays.json",
            "--request",
            "-",
            "--check-in",
            "2025-08-10",
            "--check-out",
            "2025-08-13",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Search(args)) => {
                assert_eq!(args.request, PathBuf::from("-"));
                assert_eq!(
                    args.check_in.map(|date| date.to_string()),
                    Some("2025-08-10".to_string())
                );
            }
            other => panic!("expected search command, got {other:?}"),
        }
    }

    #[test]
    fn search_command_rejects_malformed_dates() {
        let result = Cli::try_parse_from([
            "stay-search",
            "search",
            "--fixture",
            "stays.json",
            "--request",
            "-",
            "--check-in",
            "10/08/2025",
        ]);
        assert!(result.is_err());
    }
}
