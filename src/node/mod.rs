pub mod engine;
pub mod message_store;
pub mod node;
pub mod node_config;
pub mod node_driver;
pub mod node_events;
pub mod peer_registry;
pub mod routing_table;
