//! sshtui
//!
//! Interactive remote-shell session manager.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sshtui::config::{default_config_path, Config};
use sshtui::hosts::HostDirectory;
use sshtui::{Console, DisplayMode, MultiHostExecutor, Orchestrator, SignalHandler};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// sshtui - multiplex, detach and reattach remote-shell sessions.
#[derive(Parser, Debug)]
#[command(name = "sshtui")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute (defaults to the interactive menu)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the interactive session manager
    Menu,

    /// List hosts from the OpenSSH client configuration
    Hosts {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run one command on several hosts
    Exec {
        /// Host alias to run on (repeatable)
        #[arg(long = "host", short = 'H', value_name = "ALIAS", required = true)]
        hosts: Vec<String>,

        /// How output is displayed
        #[arg(long, short, value_enum, default_value_t = DisplayMode::Collected)]
        mode: DisplayMode,

        /// Command to execute
        #[arg(trailing_var_arg = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },

    /// Print the effective configuration
    Config {
        /// Write it to the configuration file instead
        #[arg(long)]
        write: bool,
    },
}

/// Installs file logging. The returned guard must outlive all logging.
fn init_logging(config: &Config, verbose: bool) -> Result<WorkerGuard> {
    let dir = &config.general.data_dir;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, "sshtui.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let level = if verbose {
        "debug"
    } else {
        config.general.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();

    let _guard = init_logging(&config, cli.verbose)?;
    tracing::info!(config = %config_path.display(), "sshtui starting");

    match cli.command.unwrap_or(Commands::Menu) {
        Commands::Menu => {
            config.validate().context("Invalid configuration")?;
            run_menu(config).await?;
        }
        Commands::Hosts { json } => {
            let directory = HostDirectory::load(&config.ssh.config_path)?;
            print_hosts(&directory, json)?;
        }
        Commands::Exec {
            hosts,
            mode,
            command,
        } => {
            config.validate().context("Invalid configuration")?;
            let succeeded = run_exec(&config, &hosts, mode, &command.join(" ")).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Commands::Config { write } => {
            if write {
                config.save(&config_path)?;
                println!("Configuration written to {}", config_path.display());
            } else {
                print!("{}", config.to_toml()?);
            }
        }
    }

    Ok(())
}

async fn run_menu(config: Config) -> Result<()> {
    let orchestrator = Orchestrator::new(config)?;
    let console = Console::stdio().context("Failed to open terminal")?;

    let (signals, shutdown) = SignalHandler::new();
    tokio::spawn(signals.run());

    let cause = orchestrator.run(&console, shutdown).await;
    tracing::info!(?cause, "sshtui exiting");
    console.print("\nAll sessions closed.\n");
    Ok(())
}

/// Returns whether every host ran the command successfully.
async fn run_exec(
    config: &Config,
    aliases: &[String],
    mode: DisplayMode,
    command: &str,
) -> Result<bool> {
    let directory = HostDirectory::load(&config.ssh.config_path)?;
    let hosts = directory.select(aliases)?;

    let console = Console::stdio().context("Failed to open terminal")?;
    let executor = MultiHostExecutor::native(config.ssh.program.clone());
    let outcomes = executor.run(&hosts, command, mode, &console).await;

    for outcome in outcomes.iter().filter(|o| !o.succeeded()) {
        tracing::warn!(
            alias = %outcome.alias,
            exit_code = ?outcome.exit_code,
            error = ?outcome.error,
            "Host did not succeed"
        );
    }
    Ok(outcomes.iter().all(|o| o.succeeded()))
}

fn print_hosts(directory: &HostDirectory, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(directory.hosts())?);
        return Ok(());
    }

    if directory.is_empty() {
        println!("No hosts found in ssh config");
        return Ok(());
    }

    println!("{:<4} {:<20} {:<30} FORWARDS", "#", "ALIAS", "HOSTNAME");
    for (idx, host) in directory.hosts().iter().enumerate() {
        println!(
            "{:<4} {:<20} {:<30}{}",
            idx + 1,
            host.alias,
            host.hostname.as_deref().unwrap_or("-"),
            host.forward_summary()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_menu() {
        let cli = Cli::try_parse_from(["sshtui"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_exec() {
        let cli = Cli::try_parse_from([
            "sshtui", "exec", "--host", "web", "-H", "db", "--mode", "live", "uptime", "-a",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Exec {
                hosts,
                mode,
                command,
            }) => {
                assert_eq!(hosts, vec!["web", "db"]);
                assert_eq!(mode, DisplayMode::Live);
                assert_eq!(command, vec!["uptime", "-a"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_exec_requires_host() {
        assert!(Cli::try_parse_from(["sshtui", "exec", "uptime"]).is_err());
    }

    #[test]
    fn test_cli_global_flags() {
        let cli =
            Cli::try_parse_from(["sshtui", "hosts", "--json", "-v", "-c", "/tmp/c.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Some(Commands::Hosts { json: true })));
    }
}
