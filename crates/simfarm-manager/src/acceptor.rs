use crate::error::{DispatchError, Result};
use crate::metrics::ManagerMetrics;
use crate::pool::WorkerPool;
use crate::worker::WorkerHandle;
use simfarm_protocol::MessageCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Bind the worker endpoint.
///
/// SO_KEEPALIVE is set on the listening socket so that every accepted
/// connection inherits transport-level keepalive probing. Tokio sockets
/// carry no read timeout, so idle waits of any length are allowed.
pub fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.set_keepalive(true)?;
    socket.bind(addr)?;
    socket.listen(1024)
}

/// Accepts worker connections and enrolls them into the pool.
///
/// Any accept or handshake failure ends the loop and closes the listener for
/// good; workers already enrolled keep working.
pub struct ConnectionAcceptor {
    listener: TcpListener,
    pool: Arc<WorkerPool>,
    metrics: Arc<ManagerMetrics>,
    codec: MessageCodec,
    cancel: CancellationToken,
}

impl ConnectionAcceptor {
    pub fn new(
        listener: TcpListener,
        pool: Arc<WorkerPool>,
        metrics: Arc<ManagerMetrics>,
        codec: MessageCodec,
        cancel: CancellationToken,
    ) -> Self {
        ConnectionAcceptor {
            listener,
            pool,
            metrics,
            codec,
            cancel,
        }
    }

    pub async fn run(self) -> Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Accepting workers on {}", addr);
        }

        loop {
            let accepted = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Acceptor interrupted");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };
            let (stream, peer) = accepted.map_err(|e| {
                error!("Accept failed, closing worker endpoint: {}", e);
                DispatchError::Accept(e)
            })?;
            debug!("New connection from {}", peer);

            if let Err(e) = stream.set_nodelay(true) {
                debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
            }

            let handshake = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Acceptor interrupted during handshake");
                    return Ok(());
                }
                handshake = WorkerHandle::handshake(stream, self.codec) => handshake,
            };
            let worker = handshake.map_err(|e| {
                error!("Handshake with {} failed, closing worker endpoint: {}", peer, e);
                e
            })?;

            let name = worker.name().to_string();
            info!(worker = %name, %peer, "Worker registered");
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Acceptor interrupted while enrolling {}", name);
                    return Ok(());
                }
                enrolled = self.pool.enroll(worker) => enrolled?,
            }
            self.metrics
                .workers_registered
                .set(self.pool.registered_count() as i64);
        }
    }
}
