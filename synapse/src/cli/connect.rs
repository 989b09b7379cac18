//! The `connect` command: the whole jump-session lifecycle in one linear
//! sequence.

use std::path::{Path, PathBuf};

use clap::Args;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use resolve_path::PathResolveExt;
use snafu::ResultExt;

use crate::{
    PROJECT_DATA_DIR,
    agent::AgentManager,
    cli::{
        error::{self, Error},
        nodes::NodesCommand,
    },
    config::Config,
    jump::{self, JumpPodProvisioner, KubePodControl},
    options::{ConnectionOptions, FileOptionStore, OptionStore, StoredOptions},
    tunnel::TunnelSession,
};

#[derive(Args, Clone)]
pub struct ConnectCommand {
    #[arg(
        help = "Node to reach over SSH. The jump pod's own name opens a shell inside the pod. \
                Lists cluster nodes when omitted."
    )]
    pub destination: Option<String>,

    #[arg(short = 'u', long = "user", help = "SSH user on the destination node.")]
    pub user: Option<String>,

    #[arg(
        short = 'i',
        long = "identity",
        help = "SSH private key for the destination node. Remembered across invocations."
    )]
    pub identity: Option<PathBuf>,

    #[arg(
        short = 'k',
        long = "pubkey",
        help = "SSH public key authorized inside the jump pod. A cached keypair is generated \
                when omitted."
    )]
    pub pubkey: Option<PathBuf>,

    #[arg(short = 'P', long = "port", help = "SSH port on the destination node.")]
    pub port: Option<u16>,

    #[arg(
        short = 'n',
        long = "namespace",
        help = "Kubernetes namespace of the jump pod. Defaults to the current context's \
                namespace."
    )]
    pub namespace: Option<String>,

    #[arg(
        long = "jump-manifest",
        help = "Pod manifest file applied instead of the built-in jump pod manifest. Ignored \
                when the file does not exist."
    )]
    pub jump_manifest: Option<PathBuf>,

    #[arg(long = "skip-agent", help = "Do not manage a local ssh-agent for this session.")]
    pub skip_agent: bool,

    #[arg(long = "cleanup-jump", help = "Delete the jump pod once the session ends.")]
    pub cleanup_jump: bool,

    #[arg(
        long = "cleanup-agent",
        help = "Terminate the managed ssh-agent once the session ends."
    )]
    pub cleanup_agent: bool,
}

impl ConnectCommand {
    pub async fn run(self, kube_client: kube::Client, config: Config) -> Result<i32, Error> {
        let Self {
            destination,
            user,
            identity,
            pubkey,
            port,
            namespace,
            jump_manifest,
            skip_agent,
            cleanup_jump,
            cleanup_agent,
        } = self;

        let Some(destination) = destination.filter(|s| !s.is_empty()) else {
            tracing::info!("no destination given, listing cluster nodes");
            NodesCommand { selector: None }.run(kube_client).await?;
            return Ok(0);
        };

        let namespace = namespace
            .filter(|s| !s.is_empty())
            .or_else(|| config.namespace.clone())
            .unwrap_or_else(|| kube_client.default_namespace().to_string());

        // Resolve options: explicit flags win over the persisted record,
        // which wins over the hard defaults. The merged result becomes the
        // new record.
        let store = FileOptionStore::new(&PROJECT_DATA_DIR);
        let explicit = StoredOptions {
            user,
            identity: identity.as_deref().map(expand_path),
            pubkey: pubkey.as_deref().map(expand_path),
            port,
        };
        let persisted = store.load()?;
        let resolved = ConnectionOptions::resolve(&explicit, &persisted, fallback_user())?;
        if !resolved.identity.try_exists().unwrap_or(false) {
            return error::IdentityFileNotFoundSnafu { file_path: resolved.identity }.fail();
        }
        store.save(&resolved.to_stored())?;

        let agent_manager = AgentManager::new(&PROJECT_DATA_DIR);
        let agent_status = if skip_agent {
            None
        } else {
            Some(agent_manager.ensure(&resolved.identity).await?)
        };
        let agent_socket = agent_status.as_ref().map(|status| status.handle().socket_path.clone());

        let api = Api::<Pod>::namespaced(kube_client, &namespace);
        let control = KubePodControl::new(api.clone(), &namespace);
        let provisioner =
            JumpPodProvisioner::new(control, config.jump_pod_name.clone(), config.poll);
        let manifest = load_manifest(
            jump_manifest.or_else(|| config.jump_manifest_path.clone()),
            &config,
            &namespace,
        )
        .await?;
        // Readiness is best-effort; a timeout was already logged and the
        // connection attempt is allowed to fail on its own.
        let _readiness = provisioner.ensure(manifest).await?;

        let tunnel = TunnelSession::new(
            api,
            &namespace,
            &config.jump_pod_name,
            config.local_port,
            config.remote_port,
            PROJECT_DATA_DIR.clone(),
            agent_socket,
        );
        let session_result =
            tunnel.open(&destination, &resolved).await.map_err(Error::from);

        // Cleanup never turns a finished session into a failure.
        if cleanup_jump {
            if let Err(err) = provisioner.delete().await {
                tracing::warn!("Failed to delete the jump pod: {err}");
            }
        }
        if cleanup_agent && !skip_agent {
            if let Err(err) = agent_manager.terminate().await {
                tracing::warn!("Failed to terminate the ssh-agent: {err}");
            }
        }

        session_result
    }
}

/// The override manifest when its file exists, the built-in one otherwise.
async fn load_manifest(
    override_path: Option<PathBuf>,
    config: &Config,
    namespace: &str,
) -> Result<Pod, Error> {
    if let Some(path) = override_path {
        let path = expand_path(&path);
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => {
                return serde_yaml::from_str(&data)
                    .context(error::ParseManifestSnafu { file_path: path });
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "manifest {} does not exist, using the built-in jump pod manifest",
                    path.display()
                );
            }
            Err(source) => return Err(Error::ReadManifest { file_path: path, source }),
        }
    }

    Ok(jump::default_manifest(&config.jump_pod_name, namespace, &config.jump_image))
}

/// `~`-expands user-supplied paths; unresolvable paths pass through as-is.
fn expand_path(path: &Path) -> PathBuf {
    path.try_resolve().map_or_else(|_| path.to_path_buf(), |resolved| resolved.to_path_buf())
}

fn fallback_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_string())
}
