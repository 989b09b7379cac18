//! The `synapse` command-line interface.
//!
//! # Examples
//!
//! ```bash
//! # List the cluster nodes reachable through the jump pod
//! synapse nodes
//!
//! # Open an SSH session to a node, remembering user and identity
//! synapse connect worker-1 -u ec2-user -i ~/.ssh/id_rsa
//!
//! # Reuse the remembered options
//! synapse connect worker-2
//!
//! # Shell into the jump pod itself, then delete it afterwards
//! synapse connect sshjump --cleanup-jump
//! ```

mod connect;
pub mod error;
mod nodes;

use std::{io::Write, path::PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use snafu::ResultExt;
use tokio::runtime::Runtime;

pub use self::error::Error;
use self::{connect::ConnectCommand, nodes::NodesCommand};
use crate::{CLI_PROGRAM_NAME, config::Config};

#[derive(Parser)]
#[command(
    name = CLI_PROGRAM_NAME,
    author,
    version,
    about = "Synapse: SSH into Kubernetes cluster nodes through a disposable jump pod.",
    long_about = "Synapse reaches the SSH server of a Kubernetes cluster node from outside the \
                  cluster network. It keeps a disposable jump pod in the cluster, forwards a \
                  local port to it, authorizes a session key inside it and hands the terminal \
                  to the real ssh client, with the jump pod acting as the relay.",
    color = clap::ColorChoice::Always
)]
pub struct Cli {
    #[clap(subcommand)]
    commands: Option<Commands>,

    /// Path to the configuration file.
    #[clap(
        long = "config",
        short = 'c',
        env = "SYNAPSE_CONFIG_FILE_PATH",
        help = "Specify a configuration file. Defaults to ~/.config/synapse/config.yaml or \
                SYNAPSE_CONFIG_FILE_PATH env var."
    )]
    config_file: Option<PathBuf>,

    #[clap(
        long = "log-level",
        env = "SYNAPSE_LOG_LEVEL",
        help = "Set the logging level (e.g., info, debug, trace)."
    )]
    log_level: Option<tracing::Level>,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Displays client and server version information.
    #[command(about = "Display client and server version information")]
    Version {
        #[clap(long = "client", help = "If true, shows client version only (no server required).")]
        client: bool,
    },

    /// Generates a shell completion script for the specified shell.
    #[command(about = "Generate shell completion script for the specified shell (bash, zsh, fish)")]
    Completions { shell: clap_complete::Shell },

    /// Outputs the default configuration in YAML format to standard output.
    #[command(about = "Output the default configuration in YAML format")]
    DefaultConfig,

    /// Opens an SSH session to a cluster node through the jump pod.
    #[command(
        alias = "c",
        about = "SSH into a cluster node through the jump pod, creating the pod when needed"
    )]
    Connect(ConnectCommand),

    /// Lists the cluster nodes.
    #[command(alias = "ls", about = "List cluster nodes with status and addresses")]
    Nodes(NodesCommand),
}

impl Default for Cli {
    fn default() -> Self { Self::parse() }
}

impl Cli {
    fn load_config(&self) -> Result<Config, Error> {
        let mut config = Config::load_or_default(
            self.config_file.clone().unwrap_or_else(Config::search_config_file_path),
        )?;

        if let Some(log_level) = self.log_level {
            config.log.level = log_level;
        }

        Ok(config)
    }

    /// Runs the parsed command and returns the process exit code.
    ///
    /// For `connect` the exit code is the SSH client's own, passed through
    /// verbatim.
    pub fn run(self) -> Result<i32, Error> {
        let client_version = crate::PROJECT_VERSION.to_string();
        match self.commands {
            Some(Commands::Version { client }) if client => {
                std::io::stdout()
                    .write_all(format!("Client Version: {client_version}\n").as_bytes())
                    .expect("Failed to write to stdout");

                return Ok(0);
            }
            Some(Commands::Completions { shell }) => {
                let mut app = Self::command();
                let bin_name = app.get_name().to_string();
                clap_complete::generate(shell, &mut app, bin_name, &mut std::io::stdout());
                return Ok(0);
            }
            Some(Commands::DefaultConfig) => {
                std::io::stdout()
                    .write_all(Config::template_basic().as_slice())
                    .expect("Failed to write to stdout");
                return Ok(0);
            }
            _ => {}
        }

        let config = self.load_config()?;
        config.log.registry();

        let fut = async move {
            let kube_client = kube::Client::try_default().await.context(error::KubeConfigSnafu)?;
            match self.commands {
                Some(Commands::Version { .. }) => {
                    let server_version = kube_client.apiserver_version().await.map_or_else(
                        |_| "unknown".to_string(),
                        |info| format!("{}.{}", info.major, info.minor),
                    );
                    let info = format!(
                        "Client Version: {client_version}\nServer Version: {server_version}\n",
                    );
                    std::io::stdout()
                        .write_all(info.as_bytes())
                        .expect("Failed to write to stdout");

                    Ok(0)
                }
                Some(Commands::Connect(cmd)) => cmd.run(kube_client, config).await,
                Some(Commands::Nodes(cmd)) => {
                    cmd.run(kube_client).await?;
                    Ok(0)
                }
                _ => {
                    let help = Self::command().render_long_help().ansi().to_string();
                    std::io::stderr()
                        .write_all(help.as_bytes())
                        .expect("Failed to write to stderr");
                    Ok(-1)
                }
            }
        };

        Runtime::new().context(error::InitializeTokioRuntimeSnafu)?.block_on(fut)
    }
}
