//! Conveyor links between an output port and an input port

use std::fmt;

use super::port::{Port, PortAddress};

pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConveyorKind {
    Pipe,
    Conveyor,
}

impl fmt::Display for ConveyorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConveyorKind::Pipe => f.write_str("pipe"),
            ConveyorKind::Conveyor => f.write_str("belt"),
        }
    }
}

/// A belt or pipe with a throughput ceiling in items per minute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conveyor {
    pub kind: ConveyorKind,
    pub max_rate: f64,
}

impl Conveyor {
    /// Belt speeds offered when placing a link.
    pub const TIERS: [f64; 3] = [60.0, 120.0, 270.0];

    pub fn belt(max_rate: f64) -> Self {
        Self {
            kind: ConveyorKind::Conveyor,
            max_rate,
        }
    }

    pub fn pipe(max_rate: f64) -> Self {
        Self {
            kind: ConveyorKind::Pipe,
            max_rate,
        }
    }

    pub fn tiers() -> impl Iterator<Item = Conveyor> {
        Self::TIERS.into_iter().map(Conveyor::belt)
    }
}

/// A directed link. `from` is always an output port and `to` an input port.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub from: PortAddress,
    pub to: PortAddress,
    pub conveyor: Conveyor,
}

impl Connection {
    pub fn new(id: ConnectionId, from: PortAddress, to: PortAddress, conveyor: Conveyor) -> Self {
        Self {
            id,
            from,
            to,
            conveyor,
        }
    }

    /// What actually moves: the supply, capped by the conveyor.
    pub fn max_flow(&self, from: &Port) -> f64 {
        from.rate().min(self.conveyor.max_rate)
    }

    /// Supply minus conveyor capacity. Below zero the conveyor has room to spare.
    pub fn calculate_under_overflow_on_input(&self, from: &Port) -> f64 {
        from.rate() - self.conveyor.max_rate
    }

    /// Delivered flow minus demand. Below zero the receiving port is starved.
    pub fn calculate_under_overflow_on_output(&self, from: &Port, to: &Port) -> f64 {
        self.conveyor.max_rate.min(from.rate()) - to.rate()
    }

    pub fn flow(&self, from: &Port, to: &Port) -> ConnectionFlow {
        ConnectionFlow {
            max_flow: self.max_flow(from),
            under_overflow_on_input: self.calculate_under_overflow_on_input(from),
            under_overflow_on_output: self.calculate_under_overflow_on_output(from, to),
        }
    }
}

/// Derived flow figures of a connection, computed from its current port rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionFlow {
    pub max_flow: f64,
    pub under_overflow_on_input: f64,
    pub under_overflow_on_output: f64,
}
