use std::net::SocketAddr;
use std::sync::Arc;

use tokio::select;
use tokio::sync::{mpsc, RwLock};
use tokio::time;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::messaging::message::Message;
use crate::messaging::transport::{MessageHandler, Transport};
use crate::node::engine::NodeEngine;
use crate::node::node_config::NodeConfig;
use crate::util::time::now_millis;

/// Parses inbound datagrams off the socket and feeds them to the dispatch
/// loop. Malformed payloads are dropped here.
struct InboundDatagramHandler {
    sender: mpsc::Sender<(Message, SocketAddr)>,
}

#[async_trait::async_trait]
impl MessageHandler for InboundDatagramHandler {
    async fn handle_message(&self, buf: &[u8], sender: SocketAddr) {
        match Message::deser(buf) {
            Ok(message) => {
                if let Err(e) = self.sender.send((message, sender)).await {
                    error!("inbound queue closed: {}", e);
                }
            }
            Err(e) => {
                debug!("dropping malformed datagram from {}: {}", sender, e);
            }
        }
    }
}

/// Runs the node: the UDP receive loop and the dispatch loop, racing until
/// either terminates. All engine mutation happens on the dispatch side, one
/// datagram or timer tick at a time.
pub async fn run_node(
    config: Arc<NodeConfig>,
    engine: Arc<RwLock<NodeEngine>>,
    transport: Arc<dyn Transport>,
) -> anyhow::Result<()> {
    let (send, recv) = mpsc::channel(1024);
    let handler = Arc::new(InboundDatagramHandler { sender: send });

    select! {
        result = transport.recv_loop(handler) => {
            info!("receive loop terminated, shutting down");
            result
        }
        _ = dispatch_loop(config, engine, recv) => Ok(()),
    }
}

async fn dispatch_loop(
    config: Arc<NodeConfig>,
    engine: Arc<RwLock<NodeEngine>>,
    mut inbound: mpsc::Receiver<(Message, SocketAddr)>,
) {
    // intervals start one full period in; only the startup rumor fires early
    let mut anti_entropy_ticks = interval_after(config.anti_entropy_interval);
    let mut ack_check_ticks = interval_after(config.ack_check_interval);
    let mut peer_health_ticks = interval_after(config.peer_health_interval);
    let mut route_rumor_ticks = interval_after(config.route_rumor_interval);

    let startup_rumor = time::sleep(config.initial_rumor_delay);
    tokio::pin!(startup_rumor);
    let mut startup_rumor_sent = false;

    info!("node {} dispatching on port {}", config.node_id, config.bind_port);

    loop {
        select! {
            received = inbound.recv() => {
                match received {
                    Some((message, sender)) => {
                        engine.write().await.on_datagram(message, sender, now_millis()).await;
                    }
                    None => break,
                }
            }
            _ = &mut startup_rumor, if !startup_rumor_sent => {
                startup_rumor_sent = true;
                engine.write().await.send_route_rumor().await;
            }
            _ = anti_entropy_ticks.tick() => {
                engine.write().await.perform_anti_entropy(now_millis()).await;
            }
            _ = ack_check_ticks.tick() => {
                engine.write().await.check_pending_acks(now_millis()).await;
            }
            _ = peer_health_ticks.tick() => {
                engine.write().await.check_peer_health(now_millis()).await;
            }
            _ = route_rumor_ticks.tick() => {
                engine.write().await.send_route_rumor().await;
            }
        }
    }
}

fn interval_after(period: std::time::Duration) -> time::Interval {
    time::interval_at(Instant::now() + period, period)
}
