use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{error, trace, warn};

pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// One datagram endpoint. The node both sends and receives through the same
/// bound socket: the source port of outgoing datagrams is the node's identity
/// discriminator, so a separate send socket would break peer discovery.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Sync + Send {
    async fn send(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()>;

    async fn recv_loop(&self, handler: Arc<dyn MessageHandler>) -> anyhow::Result<()>;

    fn cancel_recv_loop(&self);
}

/// Decouples transport from the handling of a received datagram.
#[async_trait]
pub trait MessageHandler: Sync + Send {
    async fn handle_message(&self, buf: &[u8], sender: SocketAddr);
}

pub struct UdpTransport {
    socket: UdpSocket,
    cancel_sender: broadcast::Sender<()>,
}

impl UdpTransport {
    /// Binds eagerly: a port that is already in use fails here, before any
    /// timers or handlers are set up.
    pub async fn bind(self_addr: SocketAddr) -> anyhow::Result<UdpTransport> {
        let (cancel_sender, _) = broadcast::channel(1);
        let socket = UdpSocket::bind(self_addr).await?;

        Ok(UdpTransport {
            socket,
            cancel_sender,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()> {
        self.socket.send_to(buf, to).await?;
        Ok(())
    }

    async fn recv_loop(&self, handler: Arc<dyn MessageHandler>) -> anyhow::Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        let mut cancel_receiver = self.cancel_sender.subscribe();

        trace!("starting UDP receive loop");

        loop {
            tokio::select! {
                r = self.socket.recv_from(&mut buf) => {
                    match r {
                        Ok((len, from)) => {
                            handler.handle_message(&buf[..len], from).await;
                        }
                        Err(e) => {
                            error!(error = ?e, "error receiving from datagram socket");
                            return Err(e.into());
                        }
                    }
                }
                _ = cancel_receiver.recv() => break,
            }
        }

        Ok(())
    }

    fn cancel_recv_loop(&self) {
        if let Err(err) = self.cancel_sender.send(()) {
            warn!(?err, "error canceling receive loop");
        }
    }
}
