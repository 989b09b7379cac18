use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{source}"))]
    Keys { source: crate::keys::Error },

    #[snafu(display("{source}"))]
    Forward { source: crate::forward::Error },

    #[snafu(display(
        "Failed to authorize the SSH key in pod {pod_name} in namespace {namespace}, error: {source}"
    ))]
    AuthorizeKey {
        namespace: String,
        pod_name: String,
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },

    #[snafu(display(
        "The jump pod {pod_name} rejected the authorized-keys update: {message}"
    ))]
    KeyRejected { pod_name: String, message: String },

    #[snafu(display("Failed to spawn ssh, error: {source}"))]
    SpawnSsh { source: std::io::Error },
}

impl From<crate::keys::Error> for Error {
    fn from(source: crate::keys::Error) -> Self { Self::Keys { source } }
}

impl From<crate::forward::Error> for Error {
    fn from(source: crate::forward::Error) -> Self { Self::Forward { source } }
}
