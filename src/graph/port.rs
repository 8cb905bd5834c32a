//! Typed attachment points on a node

use std::fmt;
use std::str::FromStr;

use super::connection::{Connection, ConnectionId, Conveyor};
use super::node::NodeId;
use crate::error::ConfigError;
use crate::flow::{FlowRate, ResourceSlot};
use crate::models::Resource;

/// Port identifier, unique within its node.
pub type PortId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

impl FromStr for PortDirection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(PortDirection::Input),
            "output" => Ok(PortDirection::Output),
            other => Err(ConfigError::UnknownDirection(other.to_string())),
        }
    }
}

/// Locates a port anywhere in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortAddress {
    pub node: NodeId,
    pub port: PortId,
}

impl fmt::Display for PortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.port)
    }
}

/// One connection point of a node.
///
/// `node` refers back to the owning node by id; the node owns the port.
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub id: PortId,
    pub node: NodeId,
    pub direction: PortDirection,
    pub flow: FlowRate,
    pub slot: ResourceSlot,
    pub connection: Option<ConnectionId>,
}

impl Port {
    pub fn new(
        id: PortId,
        node: NodeId,
        direction: PortDirection,
        flow: FlowRate,
        slot: ResourceSlot,
    ) -> Self {
        Self {
            id,
            node,
            direction,
            flow,
            slot,
            connection: None,
        }
    }

    pub fn address(&self) -> PortAddress {
        PortAddress {
            node: self.node,
            port: self.id,
        }
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }

    pub fn resource(&self) -> Option<&Resource> {
        self.slot.resource()
    }

    pub fn rate(&self) -> f64 {
        self.flow.rate()
    }

    pub fn can_connect_to(&self, other: &Port) -> bool {
        self.is_output() && other.is_input() && self.slot.accepts(&other.slot)
    }

    pub fn can_connect_from(&self, other: &Port) -> bool {
        self.is_input() && other.is_output() && self.slot.accepts(&other.slot)
    }

    /// Records a connection with this port on the supplying side. Compatibility
    /// and occupancy are checked by the caller.
    pub fn connect_to(&mut self, id: ConnectionId, other: &Port, conveyor: Conveyor) -> Connection {
        self.connection = Some(id);
        Connection::new(id, self.address(), other.address(), conveyor)
    }

    /// Records a connection with this port on the receiving side.
    pub fn connect_from(&mut self, id: ConnectionId, other: &Port, conveyor: Conveyor) -> Connection {
        self.connection = Some(id);
        Connection::new(id, other.address(), self.address(), conveyor)
    }

    /// Drops the connection. A dynamic rate falls back to zero.
    pub fn disconnect(&mut self) -> Option<ConnectionId> {
        let previous = self.connection.take();
        if previous.is_some() {
            self.flow.update(0.0);
        }
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(id: PortId, direction: PortDirection, resource: &str) -> Port {
        Port::new(
            id,
            1,
            direction,
            FlowRate::Fixed(30.0),
            ResourceSlot::Fixed(Resource::new(resource)),
        )
    }

    #[test]
    fn output_connects_to_matching_input() {
        let out = fixed(0, PortDirection::Output, "Iron Ingot");
        let input = fixed(1, PortDirection::Input, "Iron Ingot");
        assert!(out.can_connect_to(&input));
        assert!(input.can_connect_from(&out));
    }

    #[test]
    fn direction_parses_from_catalog_text() {
        assert_eq!("input".parse::<PortDirection>(), Ok(PortDirection::Input));
        assert_eq!("output".parse::<PortDirection>(), Ok(PortDirection::Output));
        assert!("sideways".parse::<PortDirection>().is_err());
        assert_eq!(PortDirection::Output.to_string(), "output");
    }

    #[test]
    fn direction_matters() {
        let out = fixed(0, PortDirection::Output, "Iron Ingot");
        let input = fixed(1, PortDirection::Input, "Iron Ingot");
        assert!(!input.can_connect_to(&out));
        assert!(!out.can_connect_from(&input));
        assert!(!out.can_connect_to(&fixed(2, PortDirection::Output, "Iron Ingot")));
    }

    #[test]
    fn resource_must_match() {
        let ore = fixed(0, PortDirection::Output, "Iron Ore");
        let ingot = fixed(1, PortDirection::Input, "Iron Ingot");
        assert!(!ore.can_connect_to(&ingot));
        assert!(!ingot.can_connect_from(&ore));
    }

    #[test]
    fn connect_records_sides() {
        let mut out = fixed(0, PortDirection::Output, "Iron Ingot");
        let mut input = fixed(1, PortDirection::Input, "Iron Ingot");
        input.node = 2;

        let forward = out.connect_to(7, &input, Conveyor::belt(60.0));
        let backward = input.connect_from(7, &out, Conveyor::belt(60.0));
        assert_eq!(forward, backward);
        assert_eq!(forward.from, PortAddress { node: 1, port: 0 });
        assert_eq!(forward.to, PortAddress { node: 2, port: 1 });
        assert_eq!(out.connection, Some(7));
        assert_eq!(input.connection, Some(7));
    }

    #[test]
    fn disconnect_resets_dynamic_rate() {
        let mut port = Port::new(
            0,
            1,
            PortDirection::Input,
            FlowRate::Dynamic(42.0),
            ResourceSlot::Dynamic(Some(Resource::new("Coal"))),
        );
        port.connection = Some(3);

        assert_eq!(port.disconnect(), Some(3));
        assert_eq!(port.rate(), 0.0);
        assert_eq!(port.resource(), Some(&Resource::new("Coal")));
        assert_eq!(port.disconnect(), None);
    }
}
