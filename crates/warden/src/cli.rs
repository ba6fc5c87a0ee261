//! Command-line interface handling for Warden.
//!
//! Every option here overrides the matching setting of the configuration file.

use clap::{Arg, ArgMatches, Command};
use std::ffi::OsString;
use std::path::PathBuf;

const DEFAULT_CONFIG: &str = "warden.toml";

/// Command line arguments parsed from user input.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the server log file
    pub log_file: Option<PathBuf>,
    /// Optional override for the game grammar
    pub game: Option<String>,
    /// Optional override for the RCON address
    pub rcon: Option<String>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

fn command() -> Command {
    Command::new("Warden")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Game server supervisor driven by the server log and RCON")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value(DEFAULT_CONFIG),
        )
        .arg(
            Arg::new("log-file")
                .short('f')
                .long("log-file")
                .value_name("FILE")
                .help("Game server log file to follow"),
        )
        .arg(
            Arg::new("game")
                .short('g')
                .long("game")
                .value_name("NAME")
                .help("Log grammar to use (e.g., q3a)"),
        )
        .arg(
            Arg::new("rcon")
                .short('r')
                .long("rcon")
                .value_name("ADDRESS")
                .help("RCON address (e.g., 127.0.0.1:27960)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
}

impl CliArgs {
    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parses an explicit argument list (first item is the program name).
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = command().try_get_matches_from(args)?;
        Ok(Self::from_matches(&matches))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG)),
            log_file: matches.get_one::<String>("log-file").map(PathBuf::from),
            game: matches.get_one::<String>("game").cloned(),
            rcon: matches.get_one::<String>("rcon").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["warden"]).unwrap();
        assert_eq!(args.config_path, PathBuf::from("warden.toml"));
        assert!(args.log_file.is_none());
        assert!(args.game.is_none());
        assert!(args.rcon.is_none());
        assert!(!args.json_logs);
    }

    #[test]
    fn test_all_overrides() {
        let args = CliArgs::try_parse_from([
            "warden",
            "--config",
            "/etc/warden.toml",
            "-f",
            "/srv/q3/games.log",
            "--game",
            "q3a",
            "--rcon",
            "10.0.0.2:27960",
            "-l",
            "debug",
            "--json-logs",
        ])
        .unwrap();

        assert_eq!(args.config_path, PathBuf::from("/etc/warden.toml"));
        assert_eq!(args.log_file, Some(PathBuf::from("/srv/q3/games.log")));
        assert_eq!(args.game.as_deref(), Some("q3a"));
        assert_eq!(args.rcon.as_deref(), Some("10.0.0.2:27960"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(CliArgs::try_parse_from(["warden", "--bind", "0.0.0.0:80"]).is_err());
    }
}
