//! Command line interface for the harness.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};

/// Command line arguments. Every field except the config path overrides the
/// matching configuration value when present.
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub log_level: Option<String>,
    pub json_logs: bool,
    pub producers: Option<usize>,
    pub messages: Option<u32>,
}

impl CliArgs {
    /// Parse the process arguments.
    pub fn parse() -> Self {
        Self::parse_from(std::env::args_os())
    }

    /// Parse an explicit argument list; the first item is the binary name.
    pub fn parse_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = command().get_matches_from(args);

        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            producers: matches.get_one::<usize>("producers").copied(),
            messages: matches.get_one::<u32>("messages").copied(),
        }
    }
}

fn command() -> Command {
    Command::new("DarkRift Harness")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Drives pooled message serialization and dispatching under load")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
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
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("producers")
                .short('p')
                .long("producers")
                .value_name("COUNT")
                .help("Number of producer threads")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("messages")
                .short('n')
                .long("messages")
                .value_name("COUNT")
                .help("Messages sent by each producer")
                .value_parser(value_parser!(u32)),
        )
}
