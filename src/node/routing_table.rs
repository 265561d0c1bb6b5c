use rustc_hash::FxHashMap;
use tracing::debug;

/// One DSDV routing entry: the single next hop towards a destination.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Route {
    pub next_hop_id: String,
    pub next_hop_ip: String,
    pub next_hop_port: u16,
    pub seq_no: u32,
    /// the next hop is the destination itself
    pub is_direct: bool,
    pub last_updated_ms: u64,
}

/// Destination-sequenced distance vector table. A route is replaced only by
/// a strictly higher origin sequence number, or by an equal one that
/// upgrades an indirect route to a direct one. There is never an entry for
/// this node itself.
pub struct RoutingTable {
    self_id: String,
    routes: FxHashMap<String, Route>,
}

impl RoutingTable {
    pub fn new(self_id: impl Into<String>) -> RoutingTable {
        RoutingTable {
            self_id: self_id.into(),
            routes: FxHashMap::default(),
        }
    }

    /// Applies the DSDV update rule. Returns whether the entry was installed.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        origin: &str,
        seq_no: u32,
        next_hop_id: &str,
        next_hop_ip: &str,
        next_hop_port: u16,
        is_direct: bool,
        now_ms: u64,
    ) -> bool {
        if origin == self.self_id {
            return false;
        }

        let should_install = match self.routes.get(origin) {
            None => true,
            Some(existing) => {
                seq_no > existing.seq_no
                    || (seq_no == existing.seq_no && is_direct && !existing.is_direct)
            }
        };

        if should_install {
            self.routes.insert(origin.to_string(), Route {
                next_hop_id: next_hop_id.to_string(),
                next_hop_ip: next_hop_ip.to_string(),
                next_hop_port,
                seq_no,
                is_direct,
                last_updated_ms: now_ms,
            });
            debug!("route to {} now via {} (seq {}, direct: {})", origin, next_hop_id, seq_no, is_direct);
        }
        should_install
    }

    pub fn lookup(&self, destination: &str) -> Option<&Route> {
        self.routes.get(destination)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Route)> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
