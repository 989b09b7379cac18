//! Kubernetes definitions used by Synapse.

pub mod labels {
    /// The `app.kubernetes.io/managed-by` label key, marking the jump pod as
    /// owned by Synapse.
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
}

pub mod node_selector {
    /// Node selector key constraining the jump pod to Linux nodes.
    pub const OS: &str = "kubernetes.io/os";

    pub const OS_LINUX: &str = "linux";
}
