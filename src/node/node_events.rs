use std::sync::Arc;

use anyhow::anyhow;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::messaging::message::Message;

#[derive(Clone, Debug)]
pub enum NodeEvent {
    /// a chat message was delivered to this node
    MessageReceived(Message),
    PeerDiscovered {
        peer_id: String,
        host: String,
        port: u16,
    },
    PeerStatusChanged {
        peer_id: String,
        active: bool,
    },
}

/// Collaborators (GUI, peer list, history view) subscribe at construction.
/// Listeners run inline on the dispatch loop: they must not block, and must
/// not call back into the node.
#[async_trait::async_trait]
pub trait NodeEventListener: Sync + Send {
    async fn on_node_event(&self, event: NodeEvent);
}

pub struct NodeEventNotifier {
    listeners: RwLock<FxHashMap<Uuid, Arc<dyn NodeEventListener>>>,
}

impl NodeEventNotifier {
    pub fn new() -> NodeEventNotifier {
        NodeEventNotifier {
            listeners: Default::default(),
        }
    }

    pub async fn add_listener(&self, listener: Arc<dyn NodeEventListener>) -> Uuid {
        let id = Uuid::new_v4();
        self.listeners.write().await
            .insert(id, listener);
        id
    }

    pub async fn try_remove_listener(&self, listener_id: &Uuid) -> anyhow::Result<()> {
        match self.listeners.write().await
            .remove(listener_id)
        {
            None => Err(anyhow!("tried to remove a listener that was not (no longer?) registered: {}", listener_id)),
            Some(_) => Ok(()),
        }
    }

    pub async fn notify(&self, event: NodeEvent) {
        let listeners = self.listeners.read().await
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for l in listeners {
            l.on_node_event(event.clone()).await;
        }
    }
}
