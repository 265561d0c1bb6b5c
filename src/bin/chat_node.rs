use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn, Level};

use meshchat::node::node::Node;
use meshchat::node::node_config::NodeConfig;
use meshchat::node::node_events::{NodeEvent, NodeEventListener};

const DEFAULT_PORT: u16 = 9001;

#[derive(Parser)]
#[command(about = "P2P chat node with DSDV routing and anti-entropy sync")]
struct Args {
    /// port for this node (1024-65535)
    #[arg(short, long, default_value = "9001")]
    port: String,

    /// comma-separated list of peer ports (e.g. 9001,9002,9003)
    #[arg(long)]
    peers: Option<String>,

    /// connect to one additional port (e.g. a rendezvous node)
    #[arg(long)]
    connect: Option<String>,

    /// rendezvous mode: relay route rumors only, never surface chat
    #[arg(long, default_value_t = false)]
    noforward: bool,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn parse_port(s: &str) -> Option<u16> {
    s.trim().parse::<u32>().ok()
        .filter(|&p| (1024..=65535).contains(&p))
        .map(|p| p as u16)
}

/// Prints engine events for the console user.
struct ConsoleListener;

#[async_trait::async_trait]
impl NodeEventListener for ConsoleListener {
    async fn on_node_event(&self, event: NodeEvent) {
        match event {
            NodeEvent::MessageReceived(message) => {
                info!("message from {}: {:?}", message.origin, message.chat_text);
            }
            NodeEvent::PeerDiscovered { peer_id, host, port } => {
                info!("discovered peer {} ({}:{})", peer_id, host, port);
            }
            NodeEvent::PeerStatusChanged { peer_id, active } => {
                info!("peer {} is now {}", peer_id, if active { "up" } else { "down" });
            }
        }
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let port = match parse_port(&args.port) {
        Some(p) => p,
        None => {
            warn!("invalid port {:?}, using default port {}", args.port, DEFAULT_PORT);
            DEFAULT_PORT
        }
    };

    let mut peer_ports = Vec::new();
    if let Some(peers) = &args.peers {
        for entry in peers.split(',') {
            match parse_port(entry) {
                Some(p) => peer_ports.push(p),
                None => warn!("skipping invalid peer port {:?}", entry),
            }
        }
    }
    if let Some(connect) = &args.connect {
        match parse_port(connect) {
            Some(p) => {
                info!("connecting to rendezvous node on port {}", p);
                peer_ports.push(p);
            }
            None => warn!("skipping invalid connect port {:?}", connect),
        }
    }

    if args.noforward {
        info!("running in noforward (rendezvous) mode");
    }

    let mut config = NodeConfig::new(port);
    config.peer_ports = peer_ports;
    config.no_forward = args.noforward;

    let node = Node::start(config).await?;
    node.add_listener(Arc::new(ConsoleListener)).await;

    info!("node {} up on port {}", node.node_id(), port);
    node.run().await
}
