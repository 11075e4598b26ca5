//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Connect to the mirror and relay "key: value" lines from stdin as telemetry
    Run {
        /// Display name sent with every batch (overrides the config file)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Send a single command and exit
    Send {
        key: String,
        /// Omit to send the bare key
        value: Option<String>,
    },
    /// Scan for the mirror and report the advertisers seen until it is found
    ///
    /// Scanning stops at the first mirror sighting; the final link status is
    /// printed once the duration has passed.
    Scan {
        /// Seconds to scan for
        #[arg(short, long, default_value_t = 10)]
        duration: u64,
        /// Print the final link status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the wire payload for a command without connecting
    Encode {
        key: String,
        value: Option<String>,
    },
    /// Decrypt a captured wire payload
    Decode { payload: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send_with_and_without_value() {
        let cli = Cli::try_parse_from(["mirrorlink", "send", "Name", "Alice"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Send {
                key: "Name".into(),
                value: Some("Alice".into())
            }
        );

        let cli = Cli::try_parse_from(["mirrorlink", "-v", "send", "Connected"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(
            cli.command,
            Commands::Send {
                key: "Connected".into(),
                value: None
            }
        );
    }

    #[test]
    fn test_parse_scan_defaults() {
        let cli = Cli::try_parse_from(["mirrorlink", "--config", "mirror.toml", "scan"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("mirror.toml"));
        assert_eq!(
            cli.command,
            Commands::Scan {
                duration: 10,
                json: false
            }
        );
    }

    #[test]
    fn test_scan_help_mentions_stop_at_mirror() {
        use clap::CommandFactory;

        let cli = Cli::command();
        let scan = cli.find_subcommand("scan").unwrap();
        let about = scan.get_about().unwrap().to_string();
        assert!(about.contains("until it is found"));
        let long_about = scan.get_long_about().unwrap().to_string();
        assert!(long_about.contains("stops at the first mirror sighting"));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["mirrorlink"]).is_err());
    }
}
