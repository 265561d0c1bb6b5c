use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::messaging::message::{Message, MessageType};
use crate::messaging::transport::Transport;
use crate::node::message_store::MessageStore;
use crate::node::node_config::NodeConfig;
use crate::node::node_events::{NodeEvent, NodeEventNotifier};
use crate::node::peer_registry::{PeerRegistry, TouchOutcome};
use crate::node::routing_table::{Route, RoutingTable};
use crate::util::random::NodeRandom;

const LOOPBACK: &str = "127.0.0.1";

/// An unacknowledged unicast chat. Kept until the ACK arrives or the retry
/// budget is exhausted; retries mutate the entry in place.
struct PendingMessage {
    message: Message,
    target_peer_id: String,
    sent_time_ms: u64,
    retry_count: u32,
}

/// The node engine: owns all protocol state and implements the send path,
/// the receive dispatch and the four periodic actions. Every method that
/// mutates state is driven from the single dispatch loop (or through the
/// `Node` facade, which serializes on the same lock), so the engine itself
/// needs no interior locking.
pub struct NodeEngine {
    config: Arc<NodeConfig>,
    transport: Arc<dyn Transport>,
    notifier: Arc<NodeEventNotifier>,
    random: Arc<dyn NodeRandom>,

    peers: PeerRegistry,
    store: MessageStore,
    routing: RoutingTable,
    pending_acks: FxHashMap<String, PendingMessage>,
    next_sequence_numbers: FxHashMap<String, u32>,
    route_seq_no: u32,
}

impl NodeEngine {
    pub fn new(
        config: Arc<NodeConfig>,
        transport: Arc<dyn Transport>,
        notifier: Arc<NodeEventNotifier>,
        random: Arc<dyn NodeRandom>,
    ) -> NodeEngine {
        let node_id = config.node_id.clone();
        NodeEngine {
            config,
            transport,
            notifier,
            random,
            peers: PeerRegistry::new(node_id.clone()),
            store: MessageStore::new(),
            routing: RoutingTable::new(node_id),
            pending_acks: FxHashMap::default(),
            next_sequence_numbers: FxHashMap::default(),
            route_seq_no: 1,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    /// All known peer ids. Deliberately not filtered by liveness so that
    /// manually seeded peers never disappear from listings.
    pub fn active_peers(&self) -> Vec<String> {
        self.peers.active_peers()
    }

    pub fn vector_clock(&self) -> BTreeMap<String, u32> {
        self.store.clock().clone()
    }

    pub fn routing_entries(&self) -> Vec<(String, Route)> {
        self.routing.entries()
            .map(|(dest, route)| (dest.clone(), route.clone()))
            .collect()
    }

    // ---- send path -------------------------------------------------------

    /// Stamps the message as originating here and transmits it. Chat
    /// messages get a fresh per-destination sequence number, are stored
    /// locally and, when unicast, are tracked until acknowledged.
    pub async fn send(&mut self, mut message: Message, now_ms: u64) {
        if !message.is_valid() && message.msg_type != MessageType::AeRequest {
            warn!("invalid outbound message, not sending");
            return;
        }

        message.origin = self.config.node_id.clone();

        if message.msg_type == MessageType::Chat {
            let seq = self.next_sequence_numbers
                .entry(message.destination.clone())
                .or_insert(1);
            message.sequence_number = *seq;
            *seq += 1;

            self.store.update_clock(&message.origin, message.sequence_number);
            self.store.put(message.clone());
        }

        message.vector_clock = self.store.clock().clone();

        if !message.chat_text.is_empty() {
            debug!("sending chat {} -> {}: {:?}", message.origin, message.destination, message.chat_text);
        }

        if message.is_broadcast() {
            self.send_broadcast(&message).await;
        } else {
            let destination = message.destination.clone();
            self.send_direct(&message, &destination, true, now_ms).await;
        }
    }

    /// Transmits to one known peer. For unicast chats with `require_ack`,
    /// records a pending entry unless one already exists (retries must not
    /// reset the retry counter).
    async fn send_direct(&mut self, message: &Message, peer_id: &str, require_ack: bool, now_ms: u64) {
        let (host, port) = match self.peers.get(peer_id) {
            Some(peer) => (peer.host.clone(), peer.port),
            None => {
                warn!("cannot send to unknown peer {}", peer_id);
                return;
            }
        };

        self.transmit(message, &host, port).await;

        if require_ack
            && message.msg_type == MessageType::Chat
            && !message.is_broadcast()
            && !self.pending_acks.contains_key(&message.message_id())
        {
            self.pending_acks.insert(message.message_id(), PendingMessage {
                message: message.clone(),
                target_peer_id: peer_id.to_string(),
                sent_time_ms: now_ms,
                retry_count: 0,
            });
        }
    }

    /// Floods to every known peer. No ACK tracking: broadcast delivery is
    /// gossip's job, not the retry loop's.
    async fn send_broadcast(&self, message: &Message) {
        debug!("broadcasting message to all peers");
        let targets = self.peers.all_peers()
            .map(|p| (p.host.clone(), p.port))
            .collect::<Vec<_>>();
        for (host, port) in targets {
            self.transmit(message, &host, port).await;
        }
    }

    async fn transmit(&self, message: &Message, host: &str, port: u16) {
        let addr: SocketAddr = match format!("{}:{}", host, port).parse() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("unusable peer address {}:{}: {}", host, port, e);
                return;
            }
        };
        self.transmit_to(message, addr).await;
    }

    async fn transmit_to(&self, message: &Message, addr: SocketAddr) {
        if let Err(e) = self.transport.send(addr, &message.to_datagram()).await {
            warn!("error sending datagram to {}: {}", addr, e);
        }
    }

    // ---- receive path ----------------------------------------------------

    pub async fn on_datagram(&mut self, message: Message, sender: SocketAddr, now_ms: u64) {
        if message.origin == self.config.node_id {
            // self-addressed: ignoring these prevents broadcast storms and
            // anti-entropy feedback loops
            return;
        }

        let sender_host = sender.ip().to_string();
        let sender_port = sender.port();

        match self.peers.touch(&message.origin, now_ms) {
            TouchOutcome::Unknown => {
                let origin = message.origin.clone();
                self.add_peer(&origin, &sender_host, sender_port, now_ms).await;
            }
            TouchOutcome::Reactivated => {
                self.notifier.notify(NodeEvent::PeerStatusChanged {
                    peer_id: message.origin.clone(),
                    active: true,
                }).await;
            }
            TouchOutcome::Refreshed => {}
        }

        match message.msg_type {
            MessageType::Chat => self.handle_chat(message, now_ms).await,
            MessageType::AeRequest => self.handle_ae_request(message, sender).await,
            MessageType::AeResponse => self.handle_ae_response(message, now_ms).await,
            MessageType::Ack => self.handle_ack(&message),
            MessageType::RouteRumor => self.handle_route_rumor(message, &sender_host, sender_port, now_ms).await,
        }
    }

    /// Registers a peer and announces it. Public: collaborators may seed
    /// peers directly.
    pub async fn add_peer(&mut self, peer_id: &str, host: &str, port: u16, now_ms: u64) {
        if self.peers.add(peer_id, host, port, now_ms) {
            debug!("peer discovered: {} ({}:{})", peer_id, host, port);
            self.notifier.notify(NodeEvent::PeerDiscovered {
                peer_id: peer_id.to_string(),
                host: host.to_string(),
                port,
            }).await;
        }
    }

    async fn handle_chat(&mut self, message: Message, now_ms: u64) {
        let for_us = message.destination == self.config.node_id || message.is_broadcast();

        let newly_stored = if !self.store.has(&message.message_id()) {
            self.store.put(message.clone());
            self.store.update_clock(&message.origin, message.sequence_number);
            true
        } else {
            false
        };

        if for_us {
            // a rendezvous node relays routing information but never
            // surfaces chat text
            let suppressed = self.config.no_forward && !message.chat_text.is_empty();
            if !suppressed && (message.is_broadcast() || newly_stored) {
                debug!("delivering chat from {}: {:?}", message.origin, message.chat_text);
                self.notifier.notify(NodeEvent::MessageReceived(message.clone())).await;
            }

            if newly_stored && message.destination == self.config.node_id {
                let mut ack = Message::control(MessageType::Ack, self.config.node_id.clone(), message.origin.clone());
                ack.sequence_number = message.sequence_number;
                let target = message.origin.clone();
                self.send_direct(&ack, &target, true, now_ms).await;
            }
        } else if !message.is_broadcast() {
            self.forward(message).await;
        }
    }

    async fn handle_ae_request(&mut self, message: Message, sender: SocketAddr) {
        let missing = self.store.missing_relative_to(&message.vector_clock);
        if !missing.is_empty() {
            debug!("anti-entropy: sending {} missing messages to {}", missing.len(), message.origin);
        }

        let mut response = Message::control(MessageType::AeResponse, self.config.node_id.clone(), message.origin.clone());
        response.vector_clock = self.store.clock().clone();
        self.transmit_to(&response, sender).await;

        for msg in missing {
            self.transmit_to(&msg, sender).await;
        }
    }

    async fn handle_ae_response(&mut self, message: Message, now_ms: u64) {
        let missing = self.store.missing_relative_to(&message.vector_clock);
        if !missing.is_empty() {
            debug!("anti-entropy: sending {} missing messages to {}", missing.len(), message.origin);
        }

        let responder = message.origin.clone();
        for msg in missing {
            // reconciliation copies, not deliveries: no ACK tracking
            self.send_direct(&msg, &responder, false, now_ms).await;
        }
    }

    fn handle_ack(&mut self, message: &Message) {
        // a missing key is normal: the ACK may be a duplicate, or retries
        // were already exhausted
        self.pending_acks.remove(&message.acked_message_id());
    }

    async fn handle_route_rumor(&mut self, message: Message, sender_host: &str, sender_port: u16, now_ms: u64) {
        let origin = message.origin.clone();
        let seq_no = message.sequence_number;
        let next_hop_ip = message.last_ip.clone().unwrap_or_else(|| sender_host.to_string());
        let next_hop_port = message.last_port.unwrap_or(sender_port);

        let sender_id = match self.peers.find_by_address(sender_host, sender_port) {
            Some(id) => id.to_string(),
            None => format!("Node{}", sender_port),
        };

        debug!("route rumor from {}: route to {} (seq {})", sender_id, origin, seq_no);

        let is_direct = origin == sender_id;

        if self.routing.update(&origin, seq_no, &sender_id, &next_hop_ip, next_hop_port, is_direct, now_ms)
            && !self.peers.contains(&sender_id)
        {
            // the next hop itself was discovered via this rumor
            self.add_peer(&sender_id, &next_hop_ip, next_hop_port, now_ms).await;
        }

        self.gossip_rumor(message, sender_host, sender_port).await;
    }

    /// Re-gossips a rumor to one active peer picked uniformly at random,
    /// never back to the sender, with the last-hop address rewritten to this
    /// node's own so the recipient can install a route through us.
    async fn gossip_rumor(&mut self, message: Message, exclude_host: &str, exclude_port: u16) {
        let candidates = self.peers.live_peers()
            .filter(|p| !(p.host == exclude_host && p.port == exclude_port))
            .map(|p| (p.peer_id.clone(), p.host.clone(), p.port))
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return;
        }

        let (peer_id, host, port) = candidates[self.random.gen_index(candidates.len())].clone();

        let mut forwarded = message;
        forwarded.last_ip = Some(LOOPBACK.to_string());
        forwarded.last_port = Some(self.config.bind_port);

        debug!("gossiping rumor for {} to {}", forwarded.origin, peer_id);
        self.transmit(&forwarded, &host, port).await;
    }

    /// Hop-limited unicast forwarding towards the routed next hop. The
    /// forwarder never tracks ACKs; end-to-end acknowledgement is the
    /// ultimate destination's responsibility.
    async fn forward(&mut self, mut message: Message) -> bool {
        if message.hop_limit == 0 {
            debug!("hop limit exhausted, dropping message for {}", message.destination);
            return false;
        }
        message.hop_limit -= 1;

        let (next_hop_id, host, port) = match self.routing.lookup(&message.destination) {
            Some(route) => (route.next_hop_id.clone(), route.next_hop_ip.clone(), route.next_hop_port),
            None => {
                debug!("no route to {}, dropping", message.destination);
                return false;
            }
        };

        self.transmit(&message, &host, port).await;
        debug!("forwarded {} -> {} via {} (hop limit {})", message.origin, message.destination, next_hop_id, message.hop_limit);
        true
    }

    // ---- periodic actions ------------------------------------------------

    /// Sends an AE request with our vector clock to one random active peer.
    pub async fn perform_anti_entropy(&mut self, now_ms: u64) {
        let candidates = self.peers.live_peers()
            .map(|p| p.peer_id.clone())
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return;
        }

        let peer_id = candidates[self.random.gen_index(candidates.len())].clone();

        let mut request = Message::control(MessageType::AeRequest, self.config.node_id.clone(), peer_id.clone());
        request.vector_clock = self.store.clock().clone();
        self.send_direct(&request, &peer_id, true, now_ms).await;
    }

    /// Retries timed-out unacknowledged chats, giving up after the retry
    /// budget is spent.
    pub async fn check_pending_acks(&mut self, now_ms: u64) {
        let ack_timeout_ms = self.config.ack_timeout.as_millis() as u64;

        let mut to_retry = Vec::new();
        let mut to_drop = Vec::new();
        for (id, pending) in &self.pending_acks {
            if now_ms.saturating_sub(pending.sent_time_ms) > ack_timeout_ms {
                if pending.retry_count < self.config.max_retries {
                    debug!("retrying message {} (attempt {})", id, pending.retry_count + 1);
                    to_retry.push(id.clone());
                } else {
                    warn!("message {} failed after {} retries, giving up", id, self.config.max_retries);
                    to_drop.push(id.clone());
                }
            }
        }

        for id in to_drop {
            self.pending_acks.remove(&id);
        }

        for id in to_retry {
            // the ACK may have arrived in the meantime
            let (message, target) = match self.pending_acks.get_mut(&id) {
                Some(pending) => {
                    pending.retry_count += 1;
                    pending.sent_time_ms = now_ms;
                    (pending.message.clone(), pending.target_peer_id.clone())
                }
                None => continue,
            };
            self.send_direct(&message, &target, true, now_ms).await;
        }
    }

    /// Marks peers inactive after prolonged silence.
    pub async fn check_peer_health(&mut self, now_ms: u64) {
        let timeout_ms = self.config.peer_timeout.as_millis() as u64;
        for peer_id in self.peers.sweep(now_ms, timeout_ms) {
            self.notifier.notify(NodeEvent::PeerStatusChanged {
                peer_id,
                active: false,
            }).await;
        }
    }

    /// Advertises this node to every active peer under a fresh sequence
    /// number. The last-hop fields stay unset; the first recipient fills
    /// them in from the datagram's source address.
    pub async fn send_route_rumor(&mut self) {
        if self.peers.is_empty() {
            return;
        }

        self.route_seq_no += 1;

        let mut rumor = Message::route_rumor(self.config.node_id.clone(), self.route_seq_no);
        rumor.vector_clock = self.store.clock().clone();

        debug!("broadcasting route rumor (seq {})", self.route_seq_no);
        let targets = self.peers.live_peers()
            .map(|p| (p.host.clone(), p.port))
            .collect::<Vec<_>>();
        for (host, port) in targets {
            self.transmit(&rumor, &host, port).await;
        }
    }

    /// Probes candidate local ports with an AE request. Recipients register
    /// this node on first receipt; their responses replay any history we
    /// are missing, since the probe carries an empty clock.
    pub async fn discover_local_peers(&self, ports: &[u16]) {
        debug!("probing local ports: {:?}", ports);
        for &port in ports {
            if port == self.config.bind_port {
                continue;
            }
            let probe = Message::control(MessageType::AeRequest, self.config.node_id.clone(), "discovery");
            self.transmit(&probe, LOOPBACK, port).await;
        }
    }
}
