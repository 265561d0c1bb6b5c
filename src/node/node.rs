use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::messaging::message::Message;
use crate::messaging::transport::{Transport, UdpTransport};
use crate::node::engine::NodeEngine;
use crate::node::node_config::NodeConfig;
use crate::node::node_driver::run_node;
use crate::node::node_events::{NodeEventListener, NodeEventNotifier};
use crate::node::routing_table::Route;
use crate::util::random::ThreadRngRandom;
use crate::util::time::now_millis;

/// The node's public API. Collaborators (GUI, CLI) construct it, subscribe
/// listeners, then drive everything through `run` and `send`.
pub struct Node {
    config: Arc<NodeConfig>,
    engine: Arc<RwLock<NodeEngine>>,
    transport: Arc<UdpTransport>,
    notifier: Arc<NodeEventNotifier>,
}

impl Node {
    /// Binds the UDP endpoint. A port already in use fails here; nothing
    /// else is started yet.
    pub async fn start(config: NodeConfig) -> anyhow::Result<Node> {
        let bind_addr = SocketAddr::from(([127, 0, 0, 1], config.bind_port));
        let transport = Arc::new(UdpTransport::bind(bind_addr).await?);
        info!("UDP endpoint bound on {}", bind_addr);

        let config = Arc::new(config);
        let notifier = Arc::new(NodeEventNotifier::new());
        let engine = Arc::new(RwLock::new(NodeEngine::new(
            config.clone(),
            transport.clone(),
            notifier.clone(),
            Arc::new(ThreadRngRandom),
        )));

        Ok(Node {
            config,
            engine,
            transport,
            notifier,
        })
    }

    /// Probes the configured peer ports, then runs the dispatch loop until
    /// shutdown.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.engine.read().await
            .discover_local_peers(&self.config.peer_ports).await;
        run_node(self.config.clone(), self.engine.clone(), self.transport.clone()).await
    }

    pub async fn send(&self, message: Message) {
        self.engine.write().await
            .send(message, now_millis()).await;
    }

    pub async fn add_peer(&self, peer_id: &str, host: &str, port: u16) {
        self.engine.write().await
            .add_peer(peer_id, host, port, now_millis()).await;
    }

    /// All known peer ids. Deliberately includes peers currently flagged
    /// inactive, so manually seeded peers never vanish from listings.
    pub async fn active_peers(&self) -> Vec<String> {
        self.engine.read().await.active_peers()
    }

    pub async fn vector_clock(&self) -> BTreeMap<String, u32> {
        self.engine.read().await.vector_clock()
    }

    pub async fn routing_table(&self) -> Vec<(String, Route)> {
        self.engine.read().await.routing_entries()
    }

    pub async fn add_listener(&self, listener: Arc<dyn NodeEventListener>) -> Uuid {
        self.notifier.add_listener(listener).await
    }

    pub async fn remove_listener(&self, id: &Uuid) -> anyhow::Result<()> {
        self.notifier.try_remove_listener(id).await
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    /// Stops the receive loop; `run` returns, timers stop, pending ACKs are
    /// discarded without notification.
    pub fn shutdown(&self) {
        self.transport.cancel_recv_loop();
    }
}
