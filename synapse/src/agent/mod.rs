//! Lifecycle of the locally managed `ssh-agent`.
//!
//! The manager records at most one agent per installation: the pid in
//! `agent.pid` and the raw `ssh-agent -s` export script in `agent.env` (the
//! latter stays eval-able so operators can `source` it). A live recorded
//! agent is reused across sessions; it is only killed on explicit request.

mod error;

use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tokio::process::Command;

pub use self::error::Error;
use crate::consts;

/// A running agent process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AgentHandle {
    pub pid: u32,
    pub socket_path: PathBuf,
}

/// Outcome of [`AgentManager::ensure`].
#[derive(Clone, Debug)]
pub enum AgentStatus {
    /// A new agent was spawned and the identity added to it.
    Started(AgentHandle),
    /// The recorded agent is still alive; the identity was not re-added.
    Reused(AgentHandle),
}

impl AgentStatus {
    #[must_use]
    pub const fn handle(&self) -> &AgentHandle {
        match self {
            Self::Started(handle) | Self::Reused(handle) => handle,
        }
    }
}

pub struct AgentManager {
    pid_file: PathBuf,
    env_file: PathBuf,
}

impl AgentManager {
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            pid_file: data_dir.join(consts::AGENT_PID_FILE_NAME),
            env_file: data_dir.join(consts::AGENT_ENV_FILE_NAME),
        }
    }

    /// Ensures an agent is running and holds `identity`.
    ///
    /// A recorded agent whose process is still alive is reused as-is; the
    /// key is assumed to be loaded from the session that started it.
    pub async fn ensure(&self, identity: &Path) -> Result<AgentStatus, Error> {
        if let Some(handle) = self.recorded_handle().await {
            if is_alive(handle.pid).await {
                tracing::info!("ssh-agent already running (pid {}), reusing it", handle.pid);
                return Ok(AgentStatus::Reused(handle));
            }
        }

        let output =
            Command::new("ssh-agent").arg("-s").output().await.context(error::SpawnAgentSnafu)?;
        if !output.status.success() {
            return error::AgentFailedSnafu { status: output.status }.fail();
        }

        let script = String::from_utf8_lossy(&output.stdout).to_string();
        let handle = parse_agent_output(&script).ok_or(Error::ParseAgentOutput)?;
        self.persist(&handle, &script).await?;

        self.add_identity(&handle, identity).await?;
        tracing::info!("started ssh-agent (pid {})", handle.pid);

        Ok(AgentStatus::Started(handle))
    }

    /// Kills the recorded agent and removes its files. Nothing to clean up
    /// is not an error.
    pub async fn terminate(&self) -> Result<(), Error> {
        if let Some(handle) = self.recorded_handle().await {
            match Command::new("kill").arg(handle.pid.to_string()).status().await {
                Ok(status) if status.success() => {
                    tracing::info!("terminated ssh-agent (pid {})", handle.pid);
                }
                Ok(_) | Err(_) => {
                    tracing::debug!("ssh-agent (pid {}) was already gone", handle.pid);
                }
            }
        }

        drop(tokio::fs::remove_file(&self.pid_file).await);
        drop(tokio::fs::remove_file(&self.env_file).await);
        Ok(())
    }

    /// Reads the persisted handle, if any.
    pub async fn recorded_handle(&self) -> Option<AgentHandle> {
        let script = tokio::fs::read_to_string(&self.env_file).await.ok()?;
        parse_agent_output(&script)
    }

    async fn persist(&self, handle: &AgentHandle, script: &str) -> Result<(), Error> {
        if let Some(parent) = self.env_file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(error::PersistHandleSnafu { file_path: self.env_file.clone() })?;
        }
        tokio::fs::write(&self.env_file, script)
            .await
            .context(error::PersistHandleSnafu { file_path: self.env_file.clone() })?;
        tokio::fs::write(&self.pid_file, format!("{}\n", handle.pid))
            .await
            .context(error::PersistHandleSnafu { file_path: self.pid_file.clone() })
    }

    async fn add_identity(&self, handle: &AgentHandle, identity: &Path) -> Result<(), Error> {
        let status = Command::new("ssh-add")
            .arg(identity)
            .env("SSH_AUTH_SOCK", &handle.socket_path)
            .status()
            .await
            .context(error::SpawnSshAddSnafu)?;
        if status.success() {
            Ok(())
        } else {
            error::AddIdentitySnafu { identity: identity.to_path_buf(), status }.fail()
        }
    }
}

/// Signal-0 probe of a pid.
async fn is_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Extracts the socket path and pid from the `ssh-agent -s` export script.
fn parse_agent_output(script: &str) -> Option<AgentHandle> {
    let mut socket_path = None;
    let mut pid = None;
    for line in script.lines() {
        for statement in line.split(';') {
            let Some((key, value)) = statement.trim().split_once('=') else {
                continue;
            };
            match key {
                "SSH_AUTH_SOCK" => socket_path = Some(PathBuf::from(value)),
                "SSH_AGENT_PID" => pid = value.parse::<u32>().ok(),
                _ => {}
            }
        }
    }
    Some(AgentHandle { pid: pid?, socket_path: socket_path? })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::parse_agent_output;

    const SAMPLE: &str = "SSH_AUTH_SOCK=/tmp/ssh-XXXXZ6cMZ0/agent.4189; export SSH_AUTH_SOCK;\n\
                          SSH_AGENT_PID=4190; export SSH_AGENT_PID;\n\
                          echo Agent pid 4190;\n";

    #[test]
    fn test_parse_export_script() {
        let handle = parse_agent_output(SAMPLE).unwrap();
        assert_eq!(handle.pid, 4190);
        assert_eq!(handle.socket_path, PathBuf::from("/tmp/ssh-XXXXZ6cMZ0/agent.4189"));
    }

    #[test]
    fn test_parse_rejects_incomplete_script() {
        assert!(parse_agent_output("SSH_AUTH_SOCK=/tmp/sock; export SSH_AUTH_SOCK;\n").is_none());
        assert!(parse_agent_output("").is_none());
    }

    #[test]
    fn test_parse_is_order_insensitive() {
        let script = "SSH_AGENT_PID=77; export SSH_AGENT_PID;\n\
                      SSH_AUTH_SOCK=/run/agent.sock; export SSH_AUTH_SOCK;\n";
        let handle = parse_agent_output(script).unwrap();
        assert_eq!(handle.pid, 77);
        assert_eq!(handle.socket_path, PathBuf::from("/run/agent.sock"));
    }
}
