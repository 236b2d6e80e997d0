use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use voicover::cli::{Cli, Commands, ConfigAction};
use voicover::config::Config;
use voicover::daemon::run_daemon;
use voicover::ipc::client::send_command;
use voicover::ipc::protocol::{Command, Response};
use voicover::ipc::server::IpcServer;
use voicover::models::ModelRegistry;
use voicover::pipeline::types::{ChannelId, GuildId, JobId, JobRequest, JobStatus, RequesterId};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Daemon { idle_disconnect } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(secs) = idle_disconnect {
                config.queue.idle_disconnect_secs = secs;
            }
            tracing::info!(version = %voicover::version_string(), "starting daemon");
            run_daemon(config, cli.socket).await?;
        }
        Commands::Submit {
            url,
            model,
            guild,
            channel,
            requester,
            pitch,
        } => {
            let request = JobRequest {
                requester: RequesterId(requester),
                guild: GuildId(guild),
                channel: ChannelId(channel),
                source_url: url,
                model,
                pitch_shift: pitch,
            };
            handle_ipc_command(cli.socket, Command::Submit { request }).await?;
        }
        Commands::Status { job } => {
            handle_ipc_command(cli.socket, Command::Status { job: JobId(job) }).await?;
        }
        Commands::Depth => {
            handle_ipc_command(cli.socket, Command::QueueDepth).await?;
        }
        Commands::Skip { guild } => {
            handle_ipc_command(
                cli.socket,
                Command::Skip {
                    guild: GuildId(guild),
                },
            )
            .await?;
        }
        Commands::Models { query, local } => {
            let query = query.unwrap_or_default();
            if local {
                let config = load_config(cli.config.as_deref())?;
                let registry = ModelRegistry::load(&config.models)?;
                print_models(&registry.autocomplete(&query));
            } else {
                handle_ipc_command(cli.socket, Command::Models { query }).await?;
            }
        }
        Commands::Shutdown => {
            handle_ipc_command(cli.socket, Command::Shutdown).await?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "voicover", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Install the log subscriber. `RUST_LOG` wins over the verbosity flags.
fn init_tracing(quiet: bool, verbosity: u8) {
    let default_level = match (quiet, verbosity) {
        (true, _) => "voicover=warn",
        (false, 0) => "voicover=info",
        (false, 1) => "voicover=debug",
        (false, _) => "voicover=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/voicover/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&config_path, toml::to_string_pretty(&Config::default())?)
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
            println!("{} {}", "Wrote".green(), config_path.display());
        }
    }

    Ok(())
}

async fn handle_ipc_command(socket: Option<PathBuf>, command: Command) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);

    match send_command(&socket_path, command).await {
        Ok(response) => match response {
            Response::Submitted { job, position } => {
                println!("{} {} (position {})", "Queued".green(), job, position);
            }
            Response::JobStatus { job } => {
                let status = match job.status {
                    JobStatus::Done if job.skipped => "done (skipped)".green().to_string(),
                    JobStatus::Done => "done".green().to_string(),
                    JobStatus::Failed => "failed".red().to_string(),
                    other => other.to_string().yellow().to_string(),
                };
                println!("Job {}: {}", job.id, status);
                if let Some(kind) = job.error {
                    println!("  {}   {}", "Error:".dimmed(), kind);
                }
                if let Some(message) = job.message {
                    println!("  {} {}", "Message:".dimmed(), message);
                }
            }
            Response::QueueDepth { depth } => {
                println!("{}", depth);
            }
            Response::Skipped { stopped } => {
                if stopped {
                    println!("{}", "Skipped".green());
                } else {
                    println!("{}", "Nothing playing".dimmed());
                }
            }
            Response::Models { names } => print_models(&names),
            Response::Ok => {
                println!("{}", "Ok".green());
            }
            Response::Error { message } => {
                eprintln!("{}", format!("Error: {}", message).red());
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!(
                "{}",
                format!("Failed to communicate with daemon: {}", e).red()
            );
            eprintln!("Is the daemon running? Start it with: voicover daemon");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_models(names: &[String]) {
    if names.is_empty() {
        println!("{}", "No matching models".dimmed());
        return;
    }
    for name in names {
        println!("  {}", name);
    }
}
