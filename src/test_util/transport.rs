use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::messaging::message::Message;
use crate::messaging::transport::{MessageHandler, Transport};

/// Records every datagram the engine emits, decoded back into messages so
/// tests can assert on fields instead of bytes.
pub struct TrackingMockTransport {
    sent: RwLock<Vec<(SocketAddr, Message)>>,
}

impl TrackingMockTransport {
    pub fn new() -> TrackingMockTransport {
        TrackingMockTransport {
            sent: Default::default(),
        }
    }

    /// drains and returns everything sent so far, in transmission order
    pub async fn take_sent(&self) -> Vec<(SocketAddr, Message)> {
        std::mem::take(&mut *self.sent.write().await)
    }
}

#[async_trait::async_trait]
impl Transport for TrackingMockTransport {
    async fn send(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()> {
        let message = Message::deser(buf).expect("engine sent an undecodable datagram");
        self.sent.write().await.push((to, message));
        Ok(())
    }

    async fn recv_loop(&self, _handler: Arc<dyn MessageHandler>) -> anyhow::Result<()> {
        Ok(())
    }

    fn cancel_recv_loop(&self) {}
}
