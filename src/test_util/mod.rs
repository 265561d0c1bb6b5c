pub mod listener;
pub mod transport;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::util::random::NodeRandom;

/// convenience for unit test code: a loopback address on the given port
pub fn loopback(port: u16) -> SocketAddr {
    SocketAddrV4::new(Ipv4Addr::LOCALHOST, port).into()
}

/// "random" selection pinned to a fixed index (clamped to the bound)
pub struct FixedRandom(pub usize);

impl NodeRandom for FixedRandom {
    fn gen_index(&self, bound: usize) -> usize {
        self.0.min(bound - 1)
    }
}
