//! The factory flow network: nodes, their ports and the conveyors between them

pub mod connection;
pub mod node;
pub mod port;

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, info};

use crate::error::LinkError;
use connection::{Connection, ConnectionFlow, ConnectionId, Conveyor};
use node::{Node, NodeId, Supply};
use port::{Port, PortId};

/// One edge of the graph as seen from its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub from_node: NodeId,
    pub to_node: NodeId,
    pub from_port: PortId,
    pub to_port: PortId,
}

/// What an update pass touched, in processing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateRecord {
    pub nodes: Vec<NodeId>,
    pub connections: Vec<ConnectionId>,
}

impl UpdateRecord {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connections.is_empty()
    }
}

/// Owns every node and connection of a factory plan.
///
/// Nodes keep their insertion order; `node_index` maps each id to its
/// position and is rebuilt whenever a removal shifts positions.
#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: Vec<Node>,
    node_index: HashMap<NodeId, usize>,
    connections: BTreeMap<ConnectionId, Connection>,
    pending: Vec<NodeId>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds `node` unless a node with the same id is already present.
    pub fn push(&mut self, node: Node) -> bool {
        if self.node_index.contains_key(&node.id) {
            debug!("node {} already present, ignoring", node.id);
            return false;
        }
        debug!("adding node {} ({})", node.id, node.name());
        self.node_index.insert(node.id, self.nodes.len());
        self.nodes.push(node);
        true
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.node_index.get(&id).map(|&index| &self.nodes[index])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn port(&self, node: NodeId, port: PortId) -> Option<&Port> {
        self.get_node(node)?.port(port)
    }

    /// Current flow figures of a connection.
    pub fn flow(&self, id: ConnectionId) -> Option<ConnectionFlow> {
        let connection = self.connections.get(&id)?;
        let from = self.port(connection.from.node, connection.from.port)?;
        let to = self.port(connection.to.node, connection.to.port)?;
        Some(connection.flow(from, to))
    }

    /// Queues a node for the next [`update`](Self::update).
    pub fn schedule_update(&mut self, id: NodeId) {
        self.pending.push(id);
    }

    pub fn pending(&self) -> &[NodeId] {
        &self.pending
    }

    /// Links two ports, or returns `None` when the link is refused.
    pub fn connect_nodes(
        &mut self,
        connection_id: ConnectionId,
        from_node: NodeId,
        to_node: NodeId,
        from_port: PortId,
        to_port: PortId,
        conveyor: Conveyor,
    ) -> Option<&Connection> {
        match self.try_connect_nodes(connection_id, from_node, to_node, from_port, to_port, conveyor) {
            Ok(id) => self.connections.get(&id),
            Err(e) => {
                debug!("connection {} refused: {}", connection_id, e);
                None
            }
        }
    }

    /// Links two ports, reporting why a refused link was refused.
    ///
    /// Both ports must be free. A link leaving a dynamic port may not close a
    /// loop through other dynamic outputs, so the dynamic subgraph stays
    /// acyclic. The resource of the link is claimed by every special node
    /// joined to either end.
    pub fn try_connect_nodes(
        &mut self,
        connection_id: ConnectionId,
        from_node: NodeId,
        to_node: NodeId,
        from_port: PortId,
        to_port: PortId,
        conveyor: Conveyor,
    ) -> Result<ConnectionId, LinkError> {
        let from_index = *self
            .node_index
            .get(&from_node)
            .ok_or(LinkError::UnknownNode(from_node))?;
        let to_index = *self
            .node_index
            .get(&to_node)
            .ok_or(LinkError::UnknownNode(to_node))?;
        if from_index == to_index {
            return Err(LinkError::SelfLink(from_node));
        }
        if self.connections.contains_key(&connection_id) {
            return Err(LinkError::DuplicateConnection(connection_id));
        }

        let source_is_dynamic = self.nodes[from_index]
            .port(from_port)
            .is_some_and(|port| port.flow.is_dynamic());
        if source_is_dynamic && self.reaches_dynamically(to_node, from_node) {
            return Err(LinkError::DynamicCycle {
                from: from_node,
                to: to_node,
            });
        }

        let (from, to) = pair_mut(&mut self.nodes, from_index, to_index);
        let connection = from.connect_to(connection_id, from_port, to, to_port, conveyor)?;

        // A dynamic source reaches the target through the new link on its own.
        if source_is_dynamic {
            self.pending.push(from_node);
        } else if to.port(to_port).is_some_and(|port| port.flow.is_dynamic()) {
            self.pending.push(to_node);
        }

        info!(
            "connected {} -> {} with connection {} ({} {}/min)",
            connection.from, connection.to, connection_id, conveyor.kind, conveyor.max_rate
        );
        self.connections.insert(connection_id, connection);

        if let Some(resource) = self.port(from_node, from_port).and_then(|port| port.resource()).cloned() {
            let mut group = self.special_group(from_node);
            group.extend(self.special_group(to_node));
            for id in group {
                if let Some(&index) = self.node_index.get(&id) {
                    self.nodes[index].claim(&resource);
                }
            }
        }
        Ok(connection_id)
    }

    /// Severs a connection on both of its ports.
    ///
    /// A group of special nodes left without any machine attached forgets
    /// its resource.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        for address in [connection.from, connection.to] {
            let Some(&index) = self.node_index.get(&address.node) else {
                continue;
            };
            let node = &mut self.nodes[index];
            let Some(port) = node.port_mut(address.port) else {
                continue;
            };
            let dynamic = port.flow.is_dynamic();
            port.disconnect();
            if dynamic {
                self.pending.push(address.node);
            }
        }
        for address in [connection.from, connection.to] {
            self.release_if_unanchored(address.node);
        }
        info!("removed connection {}", id);
        Some(connection)
    }

    /// Removes a node together with every connection touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let index = *self.node_index.get(&id)?;
        for connection in self.nodes[index].connection_ids() {
            self.remove_connection(connection);
        }

        let node = self.nodes.remove(index);
        self.node_index.remove(&id);
        for (position, shifted) in self.nodes.iter().enumerate().skip(index) {
            self.node_index.insert(shifted.id, position);
        }
        self.pending.retain(|pending| *pending != id);
        info!("removed node {}", id);
        Some(node)
    }

    /// Every connected output port as a flat edge list, node by node.
    pub fn get_link_array(&self) -> Vec<Link> {
        self.nodes
            .iter()
            .flat_map(|node| node.output_ports())
            .filter_map(|port| {
                let connection = self.connections.get(&port.connection?)?;
                Some(Link {
                    from_node: port.node,
                    to_node: connection.to.node,
                    from_port: port.id,
                    to_port: connection.to.port,
                })
            })
            .collect()
    }

    /// Drains the pending worklist, recomputing each node once.
    ///
    /// Nodes are taken last-in first-out. After a node is recomputed, the
    /// nodes fed by its dynamic outputs are queued. A node already handled in
    /// this pass is skipped even if it is reached again. A node whose dynamic
    /// supplier is still due in this pass is put aside; the supplier queues
    /// it again once recomputed.
    pub fn update(&mut self) -> UpdateRecord {
        let mut worklist = std::mem::take(&mut self.pending);
        let affected = self.dynamically_reachable(&worklist);
        let mut visited = HashSet::new();
        let mut record = UpdateRecord::default();

        while let Some(id) = worklist.pop() {
            if visited.contains(&id) {
                continue;
            }
            let Some(&index) = self.node_index.get(&id) else {
                continue;
            };
            if self.waits_on_supplier(&self.nodes[index], &affected, &visited) {
                debug!("node {} waits for its suppliers", id);
                continue;
            }
            visited.insert(id);

            let supplies = self.supplies(&self.nodes[index]);
            let node = &mut self.nodes[index];
            node.update(&supplies);

            record.nodes.push(id);
            record.connections.extend(node.output_connections());
            worklist.extend(
                node.connected_nodes(&self.connections, |port| port.flow.is_dynamic()),
            );
        }

        debug!(
            "update pass touched {} nodes and {} connections",
            record.nodes.len(),
            record.connections.len()
        );
        record
    }

    /// Flow delivered to each connected input port of `node`.
    fn supplies(&self, node: &Node) -> Vec<Supply> {
        node.input_ports()
            .filter_map(|port| {
                let connection = self.connections.get(&port.connection?)?;
                let upstream = self.port(connection.from.node, connection.from.port)?;
                Some(Supply {
                    port: port.id,
                    rate: connection.max_flow(upstream),
                })
            })
            .collect()
    }

    /// Every node reachable from `start` following dynamic outputs, `start` included.
    fn dynamically_reachable(&self, start: &[NodeId]) -> HashSet<NodeId> {
        let mut stack = start.to_vec();
        let mut reached = HashSet::new();
        while let Some(id) = stack.pop() {
            let Some(node) = self.get_node(id) else {
                continue;
            };
            if reached.insert(id) {
                stack.extend(node.connected_nodes(&self.connections, |port| port.flow.is_dynamic()));
            }
        }
        reached
    }

    /// Whether a dynamic output feeding `node` belongs to an affected node not yet recomputed.
    fn waits_on_supplier(&self, node: &Node, affected: &HashSet<NodeId>, visited: &HashSet<NodeId>) -> bool {
        node.input_ports()
            .filter_map(|port| self.connections.get(&port.connection?))
            .filter(|connection| affected.contains(&connection.from.node))
            .filter(|connection| !visited.contains(&connection.from.node))
            .any(|connection| {
                self.port(connection.from.node, connection.from.port)
                    .is_some_and(|port| port.flow.is_dynamic())
            })
    }

    /// Special nodes joined to `start` through links between special nodes.
    fn special_group(&self, start: NodeId) -> Vec<NodeId> {
        let mut group = Vec::new();
        let mut stack = vec![start];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(node) = self.get_node(id) else {
                continue;
            };
            if !node.is_special() {
                continue;
            }
            group.push(id);
            for connection in node.connection_ids().iter().filter_map(|c| self.connections.get(c)) {
                stack.extend([connection.from.node, connection.to.node]);
            }
        }
        group
    }

    /// Releases the group of `start` unless a machine is linked to one of its members.
    fn release_if_unanchored(&mut self, start: NodeId) {
        let group = self.special_group(start);
        let anchored = group
            .iter()
            .filter_map(|id| self.get_node(*id))
            .flat_map(|node| node.connection_ids())
            .filter_map(|id| self.connections.get(&id))
            .flat_map(|connection| [connection.from, connection.to])
            .any(|address| {
                self.get_node(address.node)
                    .is_some_and(|node| !node.is_special())
            });
        if anchored {
            return;
        }
        for id in group {
            if let Some(&index) = self.node_index.get(&id) {
                self.nodes[index].release();
            }
        }
    }

    /// Whether `target` can be reached from `start` following dynamic outputs.
    fn reaches_dynamically(&self, start: NodeId, target: NodeId) -> bool {
        let mut stack = vec![start];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.get_node(id) {
                stack.extend(node.connected_nodes(&self.connections, |port| port.flow.is_dynamic()));
            }
        }
        false
    }
}

/// Mutable access to two distinct nodes.
fn pair_mut(nodes: &mut [Node], a: usize, b: usize) -> (&mut Node, &mut Node) {
    if a < b {
        let (left, right) = nodes.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = nodes.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
