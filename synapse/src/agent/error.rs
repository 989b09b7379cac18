use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to spawn ssh-agent, error: {source}"))]
    SpawnAgent { source: std::io::Error },

    #[snafu(display("ssh-agent exited with {status} instead of printing its environment"))]
    AgentFailed { status: std::process::ExitStatus },

    #[snafu(display("Could not find SSH_AUTH_SOCK/SSH_AGENT_PID in the ssh-agent output"))]
    ParseAgentOutput,

    #[snafu(display("Failed to persist agent state to {}, error: {source}", file_path.display()))]
    PersistHandle { file_path: PathBuf, source: std::io::Error },

    #[snafu(display("Failed to run ssh-add, error: {source}"))]
    SpawnSshAdd { source: std::io::Error },

    #[snafu(display("ssh-add failed to load identity {}, status {status}", identity.display()))]
    AddIdentity { identity: PathBuf, status: std::process::ExitStatus },
}
