//! Local TCP relay into the jump pod's SSH port.
//!
//! The forwarder is an owned resource: `spawn` returns only once the local
//! listener is bound (so the caller may connect immediately), and the handle
//! must be consumed through [`PortForwarder::shutdown`], which makes the
//! teardown of the background task a move-once operation.

mod error;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use snafu::{IntoError, ResultExt};
use tokio::{net::TcpListener, task::JoinSet};
use tokio_util::sync::CancellationToken;

pub use self::error::Error;

pub struct PortForwarderBuilder {
    api: Api<Pod>,
    pod_name: String,
    local_addr: SocketAddr,
    remote_port: u16,
}

impl PortForwarderBuilder {
    #[must_use]
    pub fn new(api: Api<Pod>, pod_name: impl Into<String>, remote_port: u16) -> Self {
        Self {
            api,
            pod_name: pod_name.into(),
            remote_port,
            local_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        }
    }

    #[must_use]
    pub const fn local_address(mut self, addr: SocketAddr) -> Self {
        self.local_addr = addr;
        self
    }

    /// Binds the local listener and starts the relay task.
    pub async fn spawn(self) -> Result<PortForwarder, Error> {
        let Self { api, pod_name, local_addr, remote_port } = self;

        let listener = TcpListener::bind(&local_addr)
            .await
            .with_context(|_| error::BindTcpSocketSnafu { socket_address: local_addr })?;
        let local_addr = listener
            .local_addr()
            .with_context(|_| error::BindTcpSocketSnafu { socket_address: local_addr })?;

        tracing::info!("Forwarding from: {local_addr} -> {pod_name}:{remote_port}");

        let cancel_token = CancellationToken::new();
        let task = tokio::spawn(relay_loop(
            listener,
            api,
            pod_name,
            local_addr,
            remote_port,
            cancel_token.clone(),
        ));

        Ok(PortForwarder { local_addr, cancel_token, task })
    }
}

/// Handle of a running forwarder.
pub struct PortForwarder {
    local_addr: SocketAddr,
    cancel_token: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl PortForwarder {
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr { self.local_addr }

    /// Stops accepting, closes active bridges and waits for the relay task.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        if self.task.await.is_err() {
            tracing::debug!("relay task did not shut down cleanly");
        }
        tracing::debug!("port forwarder stopped");
    }
}

async fn relay_loop(
    listener: TcpListener,
    api: Api<Pod>,
    pod_name: String,
    local_addr: SocketAddr,
    remote_port: u16,
    cancel_token: CancellationToken,
) {
    let mut bridges = JoinSet::new();

    loop {
        let connection = tokio::select! {
            () = cancel_token.cancelled() => break,
            connection = listener.accept() => connection,
        };

        match connection {
            Err(err) => {
                tracing::warn!("Failed to accept connection on {local_addr}: {err}");
                break;
            }
            Ok((local_stream, peer)) => {
                let api = api.clone();
                let pod_name = pod_name.clone();
                let token = cancel_token.clone();
                let _abort_handle = bridges.spawn(async move {
                    if let Err(err) =
                        bridge(api, pod_name, remote_port, local_stream, peer, token).await
                    {
                        tracing::warn!("{err}");
                    }
                });
            }
        }
    }

    // Bridges watch the same token; this only reaps them.
    while bridges.join_next().await.is_some() {}
}

async fn bridge(
    api: Api<Pod>,
    pod_name: String,
    remote_port: u16,
    mut local_stream: tokio::net::TcpStream,
    peer: SocketAddr,
    cancel_token: CancellationToken,
) -> Result<(), Error> {
    let stream_id = format!("stream-{pod_name}:{remote_port}-{}", peer.port());

    let pod_stream = api
        .portforward(&pod_name, &[remote_port])
        .await
        .map(|mut pf| pf.take_stream(remote_port));
    let mut pod_stream = match pod_stream {
        Ok(Some(stream)) => stream,
        Ok(None) => return Ok(()),
        Err(source) => return Err(error::CreatePodStreamSnafu { stream_id }.into_error(source)),
    };

    tracing::debug!("Bridging connection: {peer} <-> {pod_name}:{remote_port}");

    tokio::select! {
        () = cancel_token.cancelled() => {
            tracing::debug!("Closing connection {peer} due to shutdown");
        }
        res = tokio::io::copy_bidirectional(&mut local_stream, &mut pod_stream) => {
            if let Err(err) = res {
                tracing::debug!("Connection {peer} closed with error: {err}");
            }
        }
    }

    Ok(())
}
