//! The tunnel session: forward, authorize, hand off to `ssh`, tear down.

mod error;
mod invocation;

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use k8s_openapi::api::core::v1::Pod;
use kube::{Api, api::AttachParams};
use snafu::ResultExt;
use tokio::process::Command;

pub use self::{
    error::Error,
    invocation::{
        JumpGateway, Route, build_args, compatibility_flags, parse_client_version, resolve_route,
    },
};
use crate::{forward::PortForwarderBuilder, keys, options::ConnectionOptions};

/// One SSH session through the jump pod.
pub struct TunnelSession {
    api: Api<Pod>,
    namespace: String,
    jump_pod_name: String,
    local_port: u16,
    remote_port: u16,
    data_dir: PathBuf,
    /// Socket of the managed agent, exported to the ssh child when present.
    agent_socket: Option<PathBuf>,
}

impl TunnelSession {
    #[must_use]
    pub fn new(
        api: Api<Pod>,
        namespace: impl Into<String>,
        jump_pod_name: impl Into<String>,
        local_port: u16,
        remote_port: u16,
        data_dir: impl Into<PathBuf>,
        agent_socket: Option<PathBuf>,
    ) -> Self {
        Self {
            api,
            namespace: namespace.into(),
            jump_pod_name: jump_pod_name.into(),
            local_port,
            remote_port,
            data_dir: data_dir.into(),
            agent_socket,
        }
    }

    /// Runs the session and returns the SSH client's exit code verbatim.
    ///
    /// The forwarder is torn down on every path once it has started,
    /// including key-injection failure.
    pub async fn open(
        &self,
        destination: &str,
        options: &ConnectionOptions,
    ) -> Result<i32, Error> {
        let jump_key = keys::resolve(options, &self.data_dir).await?;

        let local_addr =
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.local_port);
        let forwarder =
            PortForwarderBuilder::new(self.api.clone(), &self.jump_pod_name, self.remote_port)
                .local_address(local_addr)
                .spawn()
                .await?;

        tracing::debug!("forward bound on {}", forwarder.local_addr());

        let result = self.run_session(destination, options, &jump_key).await;
        forwarder.shutdown().await;
        result
    }

    async fn run_session(
        &self,
        destination: &str,
        options: &ConnectionOptions,
        jump_key: &keys::JumpKeypair,
    ) -> Result<i32, Error> {
        self.authorize_key(&jump_key.public_key).await?;

        let extra_options = match client_version().await {
            Some(version) => {
                tracing::debug!("local ssh client is OpenSSH {version}");
                compatibility_flags(&version)
            }
            None => {
                tracing::warn!("could not determine the local ssh client version");
                Vec::new()
            }
        };

        let gateway = JumpGateway {
            alias: self.jump_pod_name.clone(),
            local_port: self.local_port,
            identity: jump_key.private_key_path.clone(),
        };
        let route = resolve_route(destination, &gateway, options);
        let args = build_args(&route, &gateway, &extra_options);

        tracing::info!("opening SSH session to {destination}");
        let mut command = Command::new("ssh");
        command.args(&args);
        if let Some(socket) = &self.agent_socket {
            command.env("SSH_AUTH_SOCK", socket);
        }
        let status = command.status().await.context(error::SpawnSshSnafu)?;

        Ok(exit_code(status))
    }

    /// Replaces the pod's `authorized_keys` with the session key. Overwrite,
    /// not append: each session owns the single authorized key.
    async fn authorize_key(&self, public_key: &str) -> Result<(), Error> {
        let public_key = shell_escape::escape(public_key.into());
        let auth_command = [
            "sh".to_string(),
            "-c".to_string(),
            [
                "mkdir -p ~/.ssh".to_string(),
                "chmod 700 ~/.ssh".to_string(),
                format!("echo {public_key} > ~/.ssh/authorized_keys"),
                "chmod 600 ~/.ssh/authorized_keys".to_string(),
            ]
            .join(" && "),
        ];

        let mut attached = self
            .api
            .exec(&self.jump_pod_name, auth_command, &AttachParams::default())
            .await
            .with_context(|_| error::AuthorizeKeySnafu {
                namespace: self.namespace.clone(),
                pod_name: self.jump_pod_name.clone(),
            })?;

        let status = attached.take_status();
        let _unused = attached.join().await;

        if let Some(status) = status {
            if let Some(status) = status.await {
                if status.status.as_deref() == Some("Failure") {
                    return error::KeyRejectedSnafu {
                        pod_name: self.jump_pod_name.clone(),
                        message: status.message.unwrap_or_default(),
                    }
                    .fail();
                }
            }
        }

        Ok(())
    }
}

/// Version of the local OpenSSH client, read from `ssh -V`.
async fn client_version() -> Option<semver::Version> {
    let output = Command::new("ssh").arg("-V").output().await.ok()?;
    // the banner goes to stderr
    let banner = if output.stderr.is_empty() { &output.stdout } else { &output.stderr };
    parse_client_version(&String::from_utf8_lossy(banner))
}

/// Maps an exit status to the code passed through as our own: signal deaths
/// become 128+n, the shell convention.
fn exit_code(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(1)
}
