//! Machines and special elements placed on the factory floor

use std::collections::{BTreeMap, HashSet};

use super::connection::{Connection, ConnectionId, Conveyor};
use super::port::{Port, PortDirection, PortId};
use crate::error::{ConfigError, LinkError};
use crate::flow::{FlowRate, ResourceSlot};
use crate::models::{Machine, RecipeEntry, Resource};

/// Node identifier, unique within a graph.
pub type NodeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialKind {
    /// One input shared evenly across up to three outputs.
    Splitter,
    /// Up to three inputs combined into one output.
    Merger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Machine,
    Special(SpecialKind),
}

/// Effective flow arriving at an input port, as delivered by its connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Supply {
    pub port: PortId,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub ports: Vec<Port>,
    /// The configured machine this node was built from. Absent for special nodes.
    pub machine: Option<Machine>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, ports: Vec<Port>, machine: Option<Machine>) -> Self {
        Self {
            id,
            kind,
            ports,
            machine,
        }
    }

    /// Builds a machine node from a configured machine.
    ///
    /// Recipe entries that name a port are bound to it first; the remaining
    /// entries take the free ports of their direction in declaration order.
    pub fn from_machine(id: NodeId, machine: &Machine) -> Result<Self, ConfigError> {
        let config = machine
            .config
            .as_ref()
            .ok_or_else(|| ConfigError::MissingConfiguration {
                machine: machine.name.clone(),
            })?;

        let mut ports = assign_ports(id, machine, &config.inputs, PortDirection::Input)?;
        ports.extend(assign_ports(
            id,
            machine,
            &config.outputs,
            PortDirection::Output,
        )?);

        Ok(Self::new(id, NodeKind::Machine, ports, Some(machine.clone())))
    }

    pub fn splitter(id: NodeId) -> Self {
        let mut ports = vec![dynamic_port(0, id, PortDirection::Input)];
        ports.extend((1..=3).map(|port| dynamic_port(port, id, PortDirection::Output)));
        Self::new(id, NodeKind::Special(SpecialKind::Splitter), ports, None)
    }

    pub fn merger(id: NodeId) -> Self {
        let mut ports: Vec<Port> = (0..3)
            .map(|port| dynamic_port(port, id, PortDirection::Input))
            .collect();
        ports.push(dynamic_port(3, id, PortDirection::Output));
        Self::new(id, NodeKind::Special(SpecialKind::Merger), ports, None)
    }

    pub fn name(&self) -> &str {
        match (&self.machine, self.kind) {
            (Some(machine), _) => &machine.name,
            (None, NodeKind::Special(SpecialKind::Splitter)) => "Splitter",
            (None, NodeKind::Special(SpecialKind::Merger)) => "Merger",
            (None, NodeKind::Machine) => "Machine",
        }
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.iter().find(|port| port.id == id)
    }

    pub fn port_mut(&mut self, id: PortId) -> Option<&mut Port> {
        self.ports.iter_mut().find(|port| port.id == id)
    }

    pub fn input_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|port| port.is_input())
    }

    pub fn output_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|port| port.is_output())
    }

    pub fn dynamic_outputs(&self) -> impl Iterator<Item = &Port> {
        self.output_ports().filter(|port| port.flow.is_dynamic())
    }

    pub fn dynamic_inputs(&self) -> impl Iterator<Item = &Port> {
        self.input_ports().filter(|port| port.flow.is_dynamic())
    }

    pub fn is_special(&self) -> bool {
        matches!(self.kind, NodeKind::Special(_))
    }

    /// Links one of this node's output ports to an input port of `to`.
    ///
    /// Both ports must exist, be free and be compatible; otherwise nothing
    /// changes. An unclaimed special node takes on the resource of the link.
    /// Special nodes further along are claimed by [`NodeGraph`](super::NodeGraph).
    pub fn connect_to(
        &mut self,
        connection_id: ConnectionId,
        from_port: PortId,
        to: &mut Node,
        to_port: PortId,
        conveyor: Conveyor,
    ) -> Result<Connection, LinkError> {
        let from_index = self.port_index(from_port)?;
        let to_index = to.port_index(to_port)?;

        let from = &self.ports[from_index];
        let target = &to.ports[to_index];
        if !from.can_connect_to(target) {
            return Err(LinkError::Incompatible {
                from_node: self.id,
                from_port,
                to_node: to.id,
                to_port,
            });
        }
        for port in [from, target] {
            if let Some(connection) = port.connection {
                return Err(LinkError::PortOccupied {
                    node: port.node,
                    port: port.id,
                    connection,
                });
            }
        }

        let resource = from.resource().or_else(|| target.resource()).cloned();
        let connection = self.ports[from_index].connect_to(connection_id, &to.ports[to_index], conveyor);
        to.ports[to_index].connect_from(connection_id, &self.ports[from_index], conveyor);

        if let Some(resource) = resource {
            self.claim(&resource);
            to.claim(&resource);
        }
        Ok(connection)
    }

    /// Distinct downstream nodes reached through output ports accepted by `filter`.
    pub fn connected_nodes<F>(
        &self,
        connections: &BTreeMap<ConnectionId, Connection>,
        filter: F,
    ) -> Vec<NodeId>
    where
        F: Fn(&Port) -> bool,
    {
        let mut seen = HashSet::new();
        self.output_ports()
            .filter(|port| filter(port))
            .filter_map(|port| port.connection)
            .filter_map(|id| connections.get(&id))
            .map(|connection| connection.to.node)
            .filter(|node| seen.insert(*node))
            .collect()
    }

    pub fn output_connections(&self) -> Vec<ConnectionId> {
        self.output_ports().filter_map(|port| port.connection).collect()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.ports.iter().filter_map(|port| port.connection).collect()
    }

    /// Recomputes dynamic port rates from what arrives at the inputs.
    pub fn update(&mut self, supplies: &[Supply]) {
        match self.kind {
            NodeKind::Machine => {}
            NodeKind::Special(SpecialKind::Splitter) => {
                let total = self.take_supplies(supplies);
                let connected = self
                    .dynamic_outputs()
                    .filter(|port| port.connection.is_some())
                    .count();
                let share = if connected == 0 {
                    0.0
                } else {
                    total / connected as f64
                };
                for port in self.ports.iter_mut().filter(|port| port.is_output()) {
                    let rate = if port.connection.is_some() { share } else { 0.0 };
                    port.flow.update(rate);
                }
            }
            NodeKind::Special(SpecialKind::Merger) => {
                let total = self.take_supplies(supplies);
                for port in self.ports.iter_mut().filter(|port| port.is_output()) {
                    port.flow.update(total);
                }
            }
        }
    }

    /// Fills every empty dynamic slot with `resource`.
    pub fn claim(&mut self, resource: &Resource) {
        for port in &mut self.ports {
            if port.slot.is_dynamic() && port.resource().is_none() {
                port.slot.update(Some(resource.clone()));
            }
        }
    }

    /// Empties every dynamic slot. Fixed slots keep their resource.
    pub fn release(&mut self) {
        for port in &mut self.ports {
            port.slot.update(None);
        }
    }

    fn port_index(&self, port: PortId) -> Result<usize, LinkError> {
        self.ports
            .iter()
            .position(|p| p.id == port)
            .ok_or(LinkError::UnknownPort {
                node: self.id,
                port,
            })
    }

    /// Sets dynamic input rates from `supplies` and returns their sum.
    fn take_supplies(&mut self, supplies: &[Supply]) -> f64 {
        let mut total = 0.0;
        for port in self.ports.iter_mut().filter(|port| port.is_input()) {
            let rate = supplies
                .iter()
                .filter(|supply| supply.port == port.id)
                .map(|supply| supply.rate)
                .sum::<f64>();
            if port.flow.update(rate) {
                total += rate;
            }
        }
        total
    }
}

fn dynamic_port(id: PortId, node: NodeId, direction: PortDirection) -> Port {
    Port::new(
        id,
        node,
        direction,
        FlowRate::Dynamic(0.0),
        ResourceSlot::Dynamic(None),
    )
}

fn assign_ports(
    node: NodeId,
    machine: &Machine,
    entries: &[RecipeEntry],
    direction: PortDirection,
) -> Result<Vec<Port>, ConfigError> {
    let candidates: Vec<PortId> = machine
        .ports
        .iter()
        .filter(|port| port.direction == direction)
        .map(|port| port.id)
        .collect();
    if entries.len() > candidates.len() {
        return Err(ConfigError::PortsExhausted {
            machine: machine.name.clone(),
            direction,
            available: candidates.len(),
            requested: entries.len(),
        });
    }

    let mut used = HashSet::new();
    for port in entries.iter().filter_map(|entry| entry.port) {
        let template = machine
            .ports
            .iter()
            .find(|template| template.id == port)
            .ok_or_else(|| ConfigError::UnknownPort {
                machine: machine.name.clone(),
                port,
            })?;
        if template.direction != direction {
            return Err(ConfigError::PortDirection {
                machine: machine.name.clone(),
                port,
                expected: direction,
            });
        }
        if !used.insert(port) {
            return Err(ConfigError::PortAssignedTwice {
                machine: machine.name.clone(),
                port,
            });
        }
    }

    let mut free = candidates.into_iter().filter(|id| !used.contains(id));
    entries
        .iter()
        .map(|entry| {
            let port = match entry.port {
                Some(port) => port,
                None => free.next().ok_or_else(|| ConfigError::PortsExhausted {
                    machine: machine.name.clone(),
                    direction,
                    available: machine
                        .ports
                        .iter()
                        .filter(|port| port.direction == direction)
                        .count(),
                    requested: entries.len(),
                })?,
            };
            Ok(Port::new(
                port,
                node,
                direction,
                FlowRate::Fixed(entry.rate),
                ResourceSlot::Fixed(entry.resource.clone()),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::port::PortAddress;
    use crate::models::{MachineConfiguration, MachineTemplate, PortTemplate};

    fn constructor() -> MachineTemplate {
        MachineTemplate {
            id: 2,
            name: "Constructor".to_string(),
            ports: vec![
                PortTemplate {
                    id: 0,
                    direction: PortDirection::Input,
                },
                PortTemplate {
                    id: 1,
                    direction: PortDirection::Output,
                },
            ],
        }
    }

    fn assembler() -> MachineTemplate {
        MachineTemplate {
            id: 3,
            name: "Assembler".to_string(),
            ports: vec![
                PortTemplate {
                    id: 0,
                    direction: PortDirection::Input,
                },
                PortTemplate {
                    id: 1,
                    direction: PortDirection::Output,
                },
                PortTemplate {
                    id: 2,
                    direction: PortDirection::Input,
                },
            ],
        }
    }

    fn recipe(target: &str, inputs: Vec<RecipeEntry>, outputs: Vec<RecipeEntry>) -> MachineConfiguration {
        MachineConfiguration {
            name: "Test Recipe".to_string(),
            target_machine: target.to_string(),
            inputs,
            outputs,
        }
    }

    fn entry(resource: &str, rate: f64) -> RecipeEntry {
        RecipeEntry::new(Resource::new(resource), rate)
    }

    fn plate_constructor(id: NodeId) -> Node {
        let config = recipe(
            "Constructor",
            vec![entry("Iron Ingot", 30.0)],
            vec![entry("Iron Plate", 20.0)],
        );
        Node::from_machine(id, &Machine::from_template(&constructor(), config)).unwrap()
    }

    #[test]
    fn machine_without_recipe_is_rejected() {
        let err = Node::from_machine(1, &Machine::unconfigured(&constructor())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingConfiguration { .. }));
    }

    #[test]
    fn recipe_entries_fill_ports_in_declaration_order() {
        let config = recipe(
            "Assembler",
            vec![entry("Iron Plate", 30.0), entry("Screw", 60.0)],
            vec![entry("Reinforced Plate", 5.0)],
        );
        let node = Node::from_machine(9, &Machine::from_template(&assembler(), config)).unwrap();

        assert_eq!(node.kind, NodeKind::Machine);
        assert_eq!(node.port(0).unwrap().resource(), Some(&Resource::new("Iron Plate")));
        assert_eq!(node.port(2).unwrap().resource(), Some(&Resource::new("Screw")));
        assert_eq!(node.port(2).unwrap().rate(), 60.0);
        assert_eq!(node.port(1).unwrap().direction, PortDirection::Output);
        assert!(node.ports.iter().all(|port| port.node == 9));
        assert_eq!(node.dynamic_outputs().count(), 0);
    }

    #[test]
    fn explicit_port_binding_wins() {
        let config = recipe(
            "Assembler",
            vec![entry("Iron Plate", 30.0), entry("Screw", 60.0).on_port(0)],
            vec![entry("Reinforced Plate", 5.0)],
        );
        let node = Node::from_machine(9, &Machine::from_template(&assembler(), config)).unwrap();

        assert_eq!(node.port(0).unwrap().resource(), Some(&Resource::new("Screw")));
        assert_eq!(node.port(2).unwrap().resource(), Some(&Resource::new("Iron Plate")));
    }

    #[test]
    fn too_many_entries_is_a_config_error() {
        let config = recipe(
            "Constructor",
            vec![entry("Iron Ingot", 30.0), entry("Coal", 15.0)],
            vec![entry("Steel Beam", 15.0)],
        );
        let err = Node::from_machine(1, &Machine::from_template(&constructor(), config)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::PortsExhausted {
                machine: "Constructor".to_string(),
                direction: PortDirection::Input,
                available: 1,
                requested: 2,
            }
        );
    }

    #[test]
    fn binding_to_wrong_direction_is_a_config_error() {
        let config = recipe(
            "Constructor",
            vec![entry("Iron Ingot", 30.0).on_port(1)],
            vec![entry("Iron Plate", 20.0)],
        );
        let err = Node::from_machine(1, &Machine::from_template(&constructor(), config)).unwrap_err();
        assert!(matches!(err, ConfigError::PortDirection { port: 1, .. }));
    }

    #[test]
    fn connect_to_mirrors_connection_on_both_ports() {
        let mut producer = plate_constructor(1);
        let mut consumer = plate_constructor(2);
        consumer.port_mut(0).unwrap().slot = ResourceSlot::Fixed(Resource::new("Iron Plate"));

        let connection = producer
            .connect_to(5, 1, &mut consumer, 0, Conveyor::belt(60.0))
            .unwrap();
        assert_eq!(connection.from.node, 1);
        assert_eq!(connection.to.node, 2);
        assert_eq!(producer.port(1).unwrap().connection, Some(5));
        assert_eq!(consumer.port(0).unwrap().connection, Some(5));
        assert_eq!(producer.output_connections(), vec![5]);
    }

    #[test]
    fn incompatible_ports_stay_untouched() {
        let mut a = plate_constructor(1);
        let mut b = plate_constructor(2);

        let err = a.connect_to(5, 1, &mut b, 0, Conveyor::belt(60.0)).unwrap_err();
        assert!(matches!(err, LinkError::Incompatible { .. }));
        assert_eq!(a.port(1).unwrap().connection, None);
        assert_eq!(b.port(0).unwrap().connection, None);

        let err = a.connect_to(5, 7, &mut b, 0, Conveyor::belt(60.0)).unwrap_err();
        assert_eq!(err, LinkError::UnknownPort { node: 1, port: 7 });
    }

    #[test]
    fn occupied_port_is_not_overwritten() {
        let mut source = plate_constructor(1);
        let mut first = Node::splitter(2);
        let mut second = Node::splitter(3);

        source.connect_to(1, 1, &mut first, 0, Conveyor::belt(60.0)).unwrap();
        let err = source
            .connect_to(2, 1, &mut second, 0, Conveyor::belt(60.0))
            .unwrap_err();
        assert_eq!(
            err,
            LinkError::PortOccupied {
                node: 1,
                port: 1,
                connection: 1,
            }
        );
        assert_eq!(source.port(1).unwrap().connection, Some(1));
        assert_eq!(second.port(0).unwrap().connection, None);
    }

    #[test]
    fn splitter_claims_resource_of_first_link() {
        let mut source = plate_constructor(1);
        let mut splitter = Node::splitter(2);

        source.connect_to(1, 1, &mut splitter, 0, Conveyor::belt(60.0)).unwrap();
        assert!(splitter
            .ports
            .iter()
            .all(|port| port.resource() == Some(&Resource::new("Iron Plate"))));
    }

    #[test]
    fn splitter_shares_input_across_connected_outputs() {
        let mut splitter = Node::splitter(4);
        splitter.port_mut(1).unwrap().connection = Some(10);
        splitter.port_mut(3).unwrap().connection = Some(11);

        splitter.update(&[Supply { port: 0, rate: 90.0 }]);
        assert_eq!(splitter.port(0).unwrap().rate(), 90.0);
        assert_eq!(splitter.port(1).unwrap().rate(), 45.0);
        assert_eq!(splitter.port(2).unwrap().rate(), 0.0);
        assert_eq!(splitter.port(3).unwrap().rate(), 45.0);
        assert_eq!(splitter.dynamic_outputs().count(), 3);
        assert_eq!(splitter.dynamic_inputs().count(), 1);
    }

    #[test]
    fn merger_sums_inputs() {
        let mut merger = Node::merger(4);
        merger.update(&[Supply { port: 0, rate: 20.0 }, Supply { port: 2, rate: 15.0 }]);
        assert_eq!(merger.port(3).unwrap().rate(), 35.0);
        assert_eq!(merger.port(1).unwrap().rate(), 0.0);
    }

    #[test]
    fn machine_update_keeps_fixed_rates() {
        let mut node = plate_constructor(1);
        node.update(&[Supply { port: 0, rate: 5.0 }]);
        assert_eq!(node.port(0).unwrap().rate(), 30.0);
        assert_eq!(node.port(1).unwrap().rate(), 20.0);
    }

    #[test]
    fn release_empties_only_dynamic_slots() {
        let mut splitter = Node::splitter(2);
        splitter.claim(&Resource::new("Coal"));
        assert_eq!(splitter.port(2).unwrap().resource(), Some(&Resource::new("Coal")));
        assert!(splitter.is_special());

        splitter.release();
        assert!(splitter.ports.iter().all(|port| port.resource().is_none()));

        let mut constructor = plate_constructor(1);
        constructor.release();
        assert!(!constructor.is_special());
        assert_eq!(constructor.port(1).unwrap().resource(), Some(&Resource::new("Iron Plate")));
    }

    #[test]
    fn connected_nodes_are_distinct() {
        let mut splitter = Node::splitter(1);
        let mut connections = BTreeMap::new();
        for (id, port, target) in [(10, 1, 0), (11, 2, 1)] {
            splitter.port_mut(port).unwrap().connection = Some(id);
            connections.insert(
                id,
                Connection::new(
                    id,
                    splitter.port(port).unwrap().address(),
                    PortAddress { node: 7, port: target },
                    Conveyor::belt(60.0),
                ),
            );
        }

        assert_eq!(splitter.connected_nodes(&connections, |_| true), vec![7]);
        assert!(splitter
            .connected_nodes(&connections, |port| port.id == 3)
            .is_empty());
    }
}
