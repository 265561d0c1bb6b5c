use std::time::Duration;

#[derive(Debug)]
pub struct NodeConfig {
    pub node_id: String,
    /// bind port on IPv4 loopback; doubles as the node identity discriminator
    pub bind_port: u16,
    /// local ports probed with an AE request on startup
    pub peer_ports: Vec<u16>,
    /// rendezvous mode: relay routing information, never surface chat text
    pub no_forward: bool,

    pub anti_entropy_interval: Duration,
    pub ack_check_interval: Duration,
    pub ack_timeout: Duration,
    pub max_retries: u32,
    pub peer_health_interval: Duration,
    pub peer_timeout: Duration,
    pub route_rumor_interval: Duration,
    /// one-shot first rumor shortly after startup, ahead of the regular cadence
    pub initial_rumor_delay: Duration,
}

impl NodeConfig {
    pub fn new(bind_port: u16) -> NodeConfig {
        NodeConfig {
            node_id: format!("Node{}", bind_port),
            bind_port,
            peer_ports: Vec::new(),
            no_forward: false,
            anti_entropy_interval: Duration::from_secs(2),
            ack_check_interval: Duration::from_secs(1),
            ack_timeout: Duration::from_secs(2),
            max_retries: 3,
            peer_health_interval: Duration::from_secs(5),
            peer_timeout: Duration::from_secs(15),
            route_rumor_interval: Duration::from_secs(60),
            initial_rumor_delay: Duration::from_secs(1),
        }
    }
}
