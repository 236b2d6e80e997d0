//! Command-line interface for voicover
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Queued AI voice covers played into voice channels
#[derive(Parser, Debug)]
#[command(
    name = "voicover",
    version,
    about = "Queued AI voice covers played into voice channels"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to Unix socket (default: $XDG_RUNTIME_DIR/voicover.sock)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a duration string into whole seconds.
///
/// Bare numbers are seconds; anything `humantime` accepts works too
/// (`30s`, `5m`, `1h30m`).
fn parse_duration_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_secs())
        .map_err(|e| e.to_string())
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the daemon (foreground process for systemd)
    Daemon {
        /// How long an idle voice session lingers once the queue is empty (e.g. 30s, 2m)
        #[arg(long, value_name = "DURATION", value_parser = parse_duration_secs)]
        idle_disconnect: Option<u64>,
    },

    /// Queue a cover job
    Submit {
        /// Media URL or local audio file
        url: String,

        /// Voice model display name or weight file
        #[arg(long, short = 'm')]
        model: String,

        /// Guild whose voice channel plays the cover
        #[arg(long, short = 'g')]
        guild: u64,

        /// Voice channel to play into
        #[arg(long, short = 'c')]
        channel: u64,

        /// Who receives progress notifications
        #[arg(long, default_value = "cli")]
        requester: String,

        /// Pitch shift in semitones
        #[arg(long, short = 'p', default_value_t = 0, allow_negative_numbers = true)]
        pitch: i32,
    },

    /// Show the state of a job
    Status {
        /// Job number as printed by `submit`
        job: u64,
    },

    /// Number of jobs waiting to start
    Depth,

    /// Stop the guild's current playback
    Skip {
        #[arg(long, short = 'g')]
        guild: u64,
    },

    /// List voice models, optionally filtered by a substring
    Models {
        query: Option<String>,

        /// Read the local model index instead of asking the daemon
        #[arg(long)]
        local: bool,
    },

    /// Stop the daemon
    Shutdown,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["voicover"]).is_err());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["voicover", "-vv", "depth"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_global_options_after_command() {
        let cli = Cli::try_parse_from([
            "voicover",
            "depth",
            "--socket",
            "/run/v.sock",
            "--config",
            "/etc/v.toml",
            "-q",
        ])
        .unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/run/v.sock")));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/v.toml")));
        assert!(cli.quiet);
    }

    #[test]
    fn test_parse_submit() {
        let cli = Cli::try_parse_from([
            "voicover",
            "submit",
            "https://example.com/song",
            "--model",
            "Alto",
            "--guild",
            "10",
            "--channel",
            "20",
            "--pitch",
            "-12",
        ])
        .unwrap();

        match cli.command {
            Commands::Submit {
                url,
                model,
                guild,
                channel,
                requester,
                pitch,
            } => {
                assert_eq!(url, "https://example.com/song");
                assert_eq!(model, "Alto");
                assert_eq!(guild, 10);
                assert_eq!(channel, 20);
                assert_eq!(requester, "cli");
                assert_eq!(pitch, -12);
            }
            other => panic!("Expected Submit command, got {:?}", other),
        }
    }

    #[test]
    fn test_submit_requires_model() {
        let result = Cli::try_parse_from([
            "voicover", "submit", "song.wav", "--guild", "1", "--channel", "2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_status_and_skip() {
        let cli = Cli::try_parse_from(["voicover", "status", "7"]).unwrap();
        assert!(matches!(cli.command, Commands::Status { job: 7 }));

        let cli = Cli::try_parse_from(["voicover", "skip", "-g", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Skip { guild: 3 }));
    }

    #[test]
    fn test_parse_models_local() {
        let cli = Cli::try_parse_from(["voicover", "models", "alt", "--local"]).unwrap();
        match cli.command {
            Commands::Models { query, local } => {
                assert_eq!(query.as_deref(), Some("alt"));
                assert!(local);
            }
            other => panic!("Expected Models command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_daemon_idle_disconnect() {
        let cli = Cli::try_parse_from(["voicover", "daemon", "--idle-disconnect", "2m"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Daemon {
                idle_disconnect: Some(120)
            }
        ));

        let cli = Cli::try_parse_from(["voicover", "daemon", "--idle-disconnect", "45"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Daemon {
                idle_disconnect: Some(45)
            }
        ));
    }

    #[test]
    fn test_parse_duration_secs_rejects_garbage() {
        assert!(parse_duration_secs("soon").is_err());
        assert_eq!(parse_duration_secs("1h30m"), Ok(5400));
    }

    #[test]
    fn test_parse_config_init_force() {
        let cli = Cli::try_parse_from(["voicover", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { force: true }
            }
        ));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["voicover", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Bash }
        ));
    }
}
