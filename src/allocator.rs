use tracing::debug;

use crate::errors::{PanelError, PanelResult};
use crate::models::{Node, Server};
use crate::store::{DataStore, StoreError};

/// Dynamic range servers may bind. Below 1024 is reserved on the nodes.
pub const PORT_RANGE_MIN: u16 = 1024;
pub const PORT_RANGE_MAX: u16 = 65535;
/// Probe origin when no usable port was requested.
pub const DEFAULT_BASE_PORT: u16 = 25565;
/// Insert attempts per create before giving up on port allocation.
pub const MAX_PORT_ATTEMPTS: u32 = 10;

/// Online nodes able to take a server of the given size, least-allocated
/// first with the node id as tie-break. The create flow walks this list in
/// order, so a commit-time capacity race falls through to the next node.
pub async fn candidate_nodes(store: &DataStore, required_ram_mb: u64) -> Vec<Node> {
    let mut candidates = Vec::new();
    for node in store.online_nodes().await {
        if node.allocated_ram_mb + required_ram_mb > node.total_ram_mb {
            debug!(
                "Node {} skipped: {} MB allocated of {} MB, {} MB requested",
                node.id, node.allocated_ram_mb, node.total_ram_mb, required_ram_mb
            );
            continue;
        }
        if store.server_count_on_node(&node.id).await >= node.max_servers {
            debug!("Node {} skipped: server limit reached", node.id);
            continue;
        }
        candidates.push(node);
    }
    candidates.sort_by(|a, b| {
        a.allocated_ram_mb
            .cmp(&b.allocated_ram_mb)
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates
}

/// Advisory port pick: the requested port when free on the node, otherwise
/// a linear probe upward from the default base. The durable insert is the
/// real arbiter; this only chooses the first candidate.
pub async fn pick_port(
    store: &DataStore,
    node_id: &str,
    requested: Option<u16>,
) -> PanelResult<u16> {
    let occupied = store.ports_on_node(node_id).await;

    if let Some(port) = requested {
        if !(PORT_RANGE_MIN..=PORT_RANGE_MAX).contains(&port) {
            return Err(PanelError::Validation(format!(
                "port must be between {} and {}",
                PORT_RANGE_MIN, PORT_RANGE_MAX
            )));
        }
        if !occupied.contains(&port) {
            return Ok(port);
        }
    }

    let mut candidate = DEFAULT_BASE_PORT;
    loop {
        if !occupied.contains(&candidate) {
            return Ok(candidate);
        }
        if candidate == PORT_RANGE_MAX {
            return Err(PanelError::NoCapacityAvailable);
        }
        candidate += 1;
    }
}

/// Bounded retry against the store's port-uniqueness check: attempt the
/// durable insert, catch the port conflict specifically, bump the candidate,
/// retry, at most MAX_PORT_ATTEMPTS times. A final `PortConflict` from this
/// function means the attempts were exhausted; any other store error aborts
/// the loop untouched so the caller can react to it.
pub async fn insert_with_port_retry(
    store: &DataStore,
    server: &mut Server,
) -> Result<(), StoreError> {
    for attempt in 1..=MAX_PORT_ATTEMPTS {
        match store.create_server_record(server).await {
            Ok(()) => return Ok(()),
            Err(StoreError::PortConflict) => {
                debug!(
                    "Port {} on node {} raced (attempt {}/{})",
                    server.port, server.node_id, attempt, MAX_PORT_ATTEMPTS
                );
                if attempt == MAX_PORT_ATTEMPTS || server.port == PORT_RANGE_MAX {
                    return Err(StoreError::PortConflict);
                }
                server.port += 1;
            }
            Err(other) => return Err(other),
        }
    }
    Err(StoreError::PortConflict)
}
