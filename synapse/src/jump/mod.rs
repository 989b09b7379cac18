//! Provisioning of the singleton jump pod.
//!
//! `ensure` never recreates a pod that already exists, whatever its phase,
//! and its readiness wait is bounded and best-effort: when the bound is
//! exhausted the session proceeds and the connection attempt is left to
//! fail downstream.

mod error;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, ContainerPort, Pod, PodSpec};
use kube::{
    Api,
    api::{DeleteParams, ObjectMeta, PostParams},
};
use snafu::ResultExt;

pub use self::error::Error;
use crate::{PROJECT_NAME, config::PollPolicy, consts, consts::k8s};

/// Pod phase as reported by the cluster.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<&str> for PodPhase {
    fn from(value: &str) -> Self {
        match value {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for PodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let val = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        };
        f.write_str(val)
    }
}

/// Outcome of the bounded readiness wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// The narrow slice of the control plane the provisioner needs.
pub trait PodControl {
    /// Phase of the named pod, `None` when it does not exist.
    async fn phase(&self, pod_name: &str) -> Result<Option<PodPhase>, Error>;

    async fn create(&self, manifest: Pod) -> Result<(), Error>;

    async fn delete(&self, pod_name: &str) -> Result<(), Error>;
}

/// [`PodControl`] backed by the Kubernetes API.
pub struct KubePodControl {
    api: Api<Pod>,
    namespace: String,
}

impl KubePodControl {
    #[must_use]
    pub fn new(api: Api<Pod>, namespace: impl Into<String>) -> Self {
        Self { api, namespace: namespace.into() }
    }
}

impl PodControl for KubePodControl {
    async fn phase(&self, pod_name: &str) -> Result<Option<PodPhase>, Error> {
        let pod = self.api.get_opt(pod_name).await.context(error::GetPodSnafu {
            namespace: self.namespace.clone(),
            pod_name: pod_name.to_string(),
        })?;
        Ok(pod.map(|pod| {
            pod.status
                .and_then(|status| status.phase)
                .map_or(PodPhase::Unknown, |phase| PodPhase::from(phase.as_str()))
        }))
    }

    async fn create(&self, manifest: Pod) -> Result<(), Error> {
        let pod_name = manifest.metadata.name.clone().unwrap_or_default();
        let _resource = self.api.create(&PostParams::default(), &manifest).await.context(
            error::CreatePodSnafu { namespace: self.namespace.clone(), pod_name },
        )?;
        Ok(())
    }

    async fn delete(&self, pod_name: &str) -> Result<(), Error> {
        match self.api.delete(pod_name, &DeleteParams::default()).await {
            Ok(_) => {
                tracing::info!("pod/{pod_name} deleted in namespace {}", self.namespace);
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 404 => {
                tracing::info!("pod/{pod_name} does not exist in namespace {}", self.namespace);
                Ok(())
            }
            Err(source) => Err(Error::DeletePod {
                namespace: self.namespace.clone(),
                pod_name: pod_name.to_string(),
                source: Box::new(source),
            }),
        }
    }
}

pub struct JumpPodProvisioner<C> {
    control: C,
    pod_name: String,
    policy: PollPolicy,
}

impl<C> JumpPodProvisioner<C>
where
    C: PodControl,
{
    #[must_use]
    pub fn new(control: C, pod_name: impl Into<String>, policy: PollPolicy) -> Self {
        Self { control, pod_name: pod_name.into(), policy }
    }

    /// Ensures the jump pod exists, then waits for it to run.
    ///
    /// An existing pod is never recreated; `manifest` is only applied when
    /// the pod is absent. Control-plane errors are fatal, an exhausted wait
    /// is not.
    pub async fn ensure(&self, manifest: Pod) -> Result<Readiness, Error> {
        match self.control.phase(&self.pod_name).await? {
            Some(phase) => {
                tracing::info!("pod/{} already exists (phase {phase})", self.pod_name);
            }
            None => {
                self.control.create(manifest).await?;
                tracing::info!("pod/{} created", self.pod_name);
            }
        }

        self.await_running().await
    }

    pub async fn delete(&self) -> Result<(), Error> {
        self.control.delete(&self.pod_name).await
    }

    async fn await_running(&self) -> Result<Readiness, Error> {
        for attempt in 1..=self.policy.max_attempts {
            if let Some(PodPhase::Running) = self.control.phase(&self.pod_name).await? {
                return Ok(Readiness::Ready);
            }
            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.interval()).await;
            }
        }

        tracing::warn!(
            "pod/{} is not running after {} attempts, trying to connect anyway",
            self.pod_name,
            self.policy.max_attempts
        );
        Ok(Readiness::TimedOut)
    }
}

/// The built-in jump pod manifest: one SSH-server container on port 22,
/// constrained to Linux nodes.
#[must_use]
pub fn default_manifest(pod_name: &str, namespace: &str, image: &str) -> Pod {
    let labels =
        BTreeMap::from_iter([(k8s::labels::MANAGED_BY.to_string(), PROJECT_NAME.to_string())]);
    let node_selector = BTreeMap::from_iter([(
        k8s::node_selector::OS.to_string(),
        k8s::node_selector::OS_LINUX.to_string(),
    )]);

    Pod {
        metadata: ObjectMeta {
            name: Some(pod_name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: consts::JUMP_CONTAINER_NAME.to_string(),
                image: Some(image.to_string()),
                ports: Some(vec![ContainerPort {
                    container_port: i32::from(consts::DEFAULT_REMOTE_PORT),
                    ..ContainerPort::default()
                }]),
                ..Container::default()
            }],
            node_selector: Some(node_selector),
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    };

    use k8s_openapi::api::core::v1::Pod;

    use super::{
        Error, JumpPodProvisioner, PodControl, PodPhase, Readiness, default_manifest,
    };
    use crate::config::PollPolicy;

    /// Scripted stand-in for the control plane.
    #[derive(Default)]
    struct FakeControl {
        /// Phases returned by consecutive `phase` calls; the last entry
        /// repeats forever.
        phases: Vec<Option<PodPhase>>,
        phase_calls: AtomicU32,
        created: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
    }

    impl FakeControl {
        fn with_phases(phases: Vec<Option<PodPhase>>) -> Self {
            Self { phases, ..Self::default() }
        }
    }

    impl PodControl for FakeControl {
        async fn phase(&self, _pod_name: &str) -> Result<Option<PodPhase>, Error> {
            let call = self.phase_calls.fetch_add(1, Ordering::SeqCst) as usize;
            Ok(*self.phases.get(call).or_else(|| self.phases.last()).unwrap_or(&None))
        }

        async fn create(&self, manifest: Pod) -> Result<(), Error> {
            self.created.lock().unwrap().push(manifest.metadata.name.unwrap_or_default());
            Ok(())
        }

        async fn delete(&self, pod_name: &str) -> Result<(), Error> {
            self.deleted.lock().unwrap().push(pod_name.to_string());
            Ok(())
        }
    }

    fn manifest() -> Pod { default_manifest("sshjump", "default", "docker.io/example/sshd") }

    fn policy() -> PollPolicy { PollPolicy { max_attempts: 10, interval_secs: 1 } }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_skips_create_when_pod_exists() {
        let control = FakeControl::with_phases(vec![Some(PodPhase::Running)]);
        let provisioner = JumpPodProvisioner::new(control, "sshjump", policy());

        let readiness = provisioner.ensure(manifest()).await.unwrap();

        assert_eq!(readiness, Readiness::Ready);
        assert!(provisioner.control.created.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_creates_when_absent() {
        let control =
            FakeControl::with_phases(vec![None, Some(PodPhase::Pending), Some(PodPhase::Running)]);
        let provisioner = JumpPodProvisioner::new(control, "sshjump", policy());

        let readiness = provisioner.ensure(manifest()).await.unwrap();

        assert_eq!(readiness, Readiness::Ready);
        assert_eq!(*provisioner.control.created.lock().unwrap(), vec!["sshjump".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_polls_existing_pending_pod() {
        // An existing pod is polled, never recreated, regardless of phase.
        let control =
            FakeControl::with_phases(vec![Some(PodPhase::Pending), Some(PodPhase::Running)]);
        let provisioner = JumpPodProvisioner::new(control, "sshjump", policy());

        let readiness = provisioner.ensure(manifest()).await.unwrap();

        assert_eq!(readiness, Readiness::Ready);
        assert!(provisioner.control.created.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_bounded_when_never_running() {
        let control = FakeControl::with_phases(vec![Some(PodPhase::Pending)]);
        let provisioner = JumpPodProvisioner::new(control, "sshjump", policy());

        let readiness = provisioner.ensure(manifest()).await.unwrap();

        assert_eq!(readiness, Readiness::TimedOut);
        // one existence query plus exactly max_attempts polls
        assert_eq!(provisioner.control.phase_calls.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_phase_parsing() {
        assert_eq!(PodPhase::from("Running"), PodPhase::Running);
        assert_eq!(PodPhase::from("Pending"), PodPhase::Pending);
        assert_eq!(PodPhase::from("Evicted"), PodPhase::Unknown);
    }

    #[test]
    fn test_default_manifest_shape() {
        let pod = manifest();
        let spec = pod.spec.unwrap();
        assert_eq!(spec.containers.len(), 1);
        let container = &spec.containers[0];
        assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 22);
        assert_eq!(
            spec.node_selector.unwrap().get("kubernetes.io/os").map(String::as_str),
            Some("linux")
        );
        assert_eq!(
            pod.metadata.labels.unwrap().get("app.kubernetes.io/managed-by").map(String::as_str),
            Some("synapse")
        );
    }
}
