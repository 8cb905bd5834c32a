//! Error types for catalog configuration and graph linking

use thiserror::Error;

use crate::graph::connection::ConnectionId;
use crate::graph::node::NodeId;
use crate::graph::port::{PortDirection, PortId};

/// A machine could not be built from its catalog data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("machine {machine} must be configured with a recipe")]
    MissingConfiguration { machine: String },

    #[error("recipe {config} cannot be applied to machine {machine}")]
    TargetMismatch { config: String, machine: String },

    #[error("unknown machine: {0}")]
    UnknownMachine(String),

    #[error("unknown recipe: {0}")]
    UnknownRecipe(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("unknown port direction: {0}")]
    UnknownDirection(String),

    #[error("machine {machine} has {available} {direction} ports but recipe needs {requested}")]
    PortsExhausted {
        machine: String,
        direction: PortDirection,
        available: usize,
        requested: usize,
    },

    #[error("machine {machine} has no port {port}")]
    UnknownPort { machine: String, port: PortId },

    #[error("port {port} of machine {machine} is not an {expected} port")]
    PortDirection {
        machine: String,
        port: PortId,
        expected: PortDirection,
    },

    #[error("port {port} of machine {machine} is bound by more than one recipe entry")]
    PortAssignedTwice { machine: String, port: PortId },
}

/// A link between two ports was refused. These are never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {node} has no port {port}")]
    UnknownPort { node: NodeId, port: PortId },

    #[error("node {0} cannot be linked to itself")]
    SelfLink(NodeId),

    #[error("port {from_node}:{from_port} cannot feed port {to_node}:{to_port}")]
    Incompatible {
        from_node: NodeId,
        from_port: PortId,
        to_node: NodeId,
        to_port: PortId,
    },

    #[error("port {node}:{port} is already linked by connection {connection}")]
    PortOccupied {
        node: NodeId,
        port: PortId,
        connection: ConnectionId,
    },

    #[error("connection {0} already exists")]
    DuplicateConnection(ConnectionId),

    #[error("linking node {from} to node {to} would close a loop of dynamic flow")]
    DynamicCycle { from: NodeId, to: NodeId },
}
