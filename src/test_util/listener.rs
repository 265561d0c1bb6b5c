use tokio::sync::RwLock;

use crate::node::node_events::{NodeEvent, NodeEventListener};

/// Collects every event the engine emits, for later assertion.
pub struct CollectingListener {
    events: RwLock<Vec<NodeEvent>>,
}

impl CollectingListener {
    pub fn new() -> CollectingListener {
        CollectingListener {
            events: Default::default(),
        }
    }

    pub async fn take_events(&self) -> Vec<NodeEvent> {
        std::mem::take(&mut *self.events.write().await)
    }
}

#[async_trait::async_trait]
impl NodeEventListener for CollectingListener {
    async fn on_node_event(&self, event: NodeEvent) {
        self.events.write().await.push(event);
    }
}
