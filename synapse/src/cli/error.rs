use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{source}"))]
    Configuration { source: crate::config::Error },

    #[snafu(display("{source}"))]
    Options { source: crate::options::Error },

    #[snafu(display("{source}"))]
    Agent { source: crate::agent::Error },

    #[snafu(display("{source}"))]
    Jump { source: crate::jump::Error },

    #[snafu(display("{source}"))]
    Tunnel { source: crate::tunnel::Error },

    #[snafu(display("Failed to write to stdout, error: {source}"))]
    WriteStdout { source: std::io::Error },

    #[snafu(display("Failed to initialize Kubernetes client configuration, error: {source}"))]
    KubeConfig { source: kube::Error },

    #[snafu(display("Failed to create tokio runtime, error: {source}"))]
    InitializeTokioRuntime { source: std::io::Error },

    #[snafu(display("Failed to list nodes, error: {source}"))]
    ListNodes {
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },

    #[snafu(display("SSH identity file {} does not exist", file_path.display()))]
    IdentityFileNotFound { file_path: PathBuf },

    #[snafu(display("Failed to read pod manifest {}, error: {source}", file_path.display()))]
    ReadManifest { file_path: PathBuf, source: std::io::Error },

    #[snafu(display("Failed to parse pod manifest {}, error: {source}", file_path.display()))]
    ParseManifest { file_path: PathBuf, source: serde_yaml::Error },
}

impl From<crate::config::Error> for Error {
    fn from(source: crate::config::Error) -> Self { Self::Configuration { source } }
}

impl From<crate::options::Error> for Error {
    fn from(source: crate::options::Error) -> Self { Self::Options { source } }
}

impl From<crate::agent::Error> for Error {
    fn from(source: crate::agent::Error) -> Self { Self::Agent { source } }
}

impl From<crate::jump::Error> for Error {
    fn from(source: crate::jump::Error) -> Self { Self::Jump { source } }
}

impl From<crate::tunnel::Error> for Error {
    fn from(source: crate::tunnel::Error) -> Self { Self::Tunnel { source } }
}
