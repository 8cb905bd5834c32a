//! Plan scripts: build a factory graph from text and report its flows
//!
//! One statement per line, `#` starts a comment:
//!
//! ```text
//! machine 1 Miner using Iron Ore
//! splitter 2
//! link 10 1:0 -> 2:0 belt 120
//! update
//! ```

use std::fmt;

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use regex::Regex;

use crate::catalog::Catalog;
use crate::graph::NodeGraph;
use crate::graph::connection::{ConnectionFlow, ConnectionId, Conveyor};
use crate::graph::node::{Node, NodeId};
use crate::graph::port::{PortAddress, PortDirection, PortId};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Machine {
        id: NodeId,
        machine: String,
        recipe: String,
    },
    Splitter(NodeId),
    Merger(NodeId),
    Link {
        id: ConnectionId,
        from: PortAddress,
        to: PortAddress,
        conveyor: Conveyor,
    },
    Unlink(ConnectionId),
    Remove(NodeId),
    Update,
}

/// Compiled statement patterns
struct Grammar {
    machine: Regex,
    special: Regex,
    link: Regex,
    unlink: Regex,
    remove: Regex,
}

impl Grammar {
    fn new() -> Result<Self> {
        Ok(Self {
            machine: Regex::new(r"^machine\s+(\d+)\s+(.+?)\s+using\s+(.+)$")?,
            special: Regex::new(r"^(splitter|merger)\s+(\d+)$")?,
            link: Regex::new(
                r"^link\s+(\d+)\s+(\d+):(\d+)\s*->\s*(\d+):(\d+)(?:\s+(belt|pipe))?\s+(\d+(?:\.\d+)?)$",
            )?,
            unlink: Regex::new(r"^unlink\s+(\d+)$")?,
            remove: Regex::new(r"^remove\s+(\d+)$")?,
        })
    }

    fn parse(&self, text: &str) -> Result<Statement> {
        if text == "update" {
            return Ok(Statement::Update);
        }
        if let Some(cap) = self.machine.captures(text) {
            return Ok(Statement::Machine {
                id: cap[1].parse()?,
                machine: cap[2].to_string(),
                recipe: cap[3].trim().to_string(),
            });
        }
        if let Some(cap) = self.special.captures(text) {
            let id: NodeId = cap[2].parse()?;
            return Ok(match &cap[1] {
                "splitter" => Statement::Splitter(id),
                _ => Statement::Merger(id),
            });
        }
        if let Some(cap) = self.link.captures(text) {
            let rate: f64 = cap[7].parse()?;
            let conveyor = match cap.get(6).map(|m| m.as_str()) {
                Some("pipe") => Conveyor::pipe(rate),
                _ => Conveyor::belt(rate),
            };
            return Ok(Statement::Link {
                id: cap[1].parse()?,
                from: PortAddress {
                    node: cap[2].parse()?,
                    port: cap[3].parse()?,
                },
                to: PortAddress {
                    node: cap[4].parse()?,
                    port: cap[5].parse()?,
                },
                conveyor,
            });
        }
        if let Some(cap) = self.unlink.captures(text) {
            return Ok(Statement::Unlink(cap[1].parse()?));
        }
        if let Some(cap) = self.remove.captures(text) {
            return Ok(Statement::Remove(cap[1].parse()?));
        }
        Err(anyhow!("unrecognised statement: {}", text))
    }
}

/// A parsed plan script. Each statement keeps its 1-based line number.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub statements: Vec<(usize, Statement)>,
}

impl Plan {
    pub fn parse(source: &str) -> Result<Self> {
        let grammar = Grammar::new()?;
        let mut statements = Vec::new();
        for (index, line) in source.lines().enumerate() {
            let text = line.split('#').next().unwrap_or("").trim();
            if text.is_empty() {
                continue;
            }
            let statement = grammar.parse(text).with_context(|| format!("line {}", index + 1))?;
            statements.push((index + 1, statement));
        }
        Ok(Self { statements })
    }

    /// Runs every statement against `graph`, then settles it with a last update.
    ///
    /// Machines that cannot be configured abort the run. Refused links and
    /// removals of unknown ids are collected in the report instead.
    pub fn apply(&self, catalog: &Catalog, graph: &mut NodeGraph) -> Result<PlanReport> {
        let mut rejected = Vec::new();
        let mut passes = 0;

        for (line, statement) in &self.statements {
            debug!("line {}: {:?}", line, statement);
            match statement {
                Statement::Machine {
                    id,
                    machine,
                    recipe,
                } => {
                    let node = catalog
                        .build_node(*id, machine, recipe)
                        .with_context(|| format!("line {}", line))?;
                    if !graph.push(node) {
                        rejected.push(format!("line {}: node {} already exists", line, id));
                    }
                }
                Statement::Splitter(id) | Statement::Merger(id) => {
                    let node = match statement {
                        Statement::Splitter(_) => Node::splitter(*id),
                        _ => Node::merger(*id),
                    };
                    if !graph.push(node) {
                        rejected.push(format!("line {}: node {} already exists", line, id));
                    }
                }
                Statement::Link {
                    id,
                    from,
                    to,
                    conveyor,
                } => {
                    if let Err(e) =
                        graph.try_connect_nodes(*id, from.node, to.node, from.port, to.port, *conveyor)
                    {
                        warn!("line {}: link {} refused: {}", line, id, e);
                        rejected.push(format!("line {}: {}", line, e));
                    }
                }
                Statement::Unlink(id) => {
                    if graph.remove_connection(*id).is_none() {
                        rejected.push(format!("line {}: unknown connection {}", line, id));
                    }
                }
                Statement::Remove(id) => {
                    if graph.remove_node(*id).is_none() {
                        rejected.push(format!("line {}: unknown node {}", line, id));
                    }
                }
                Statement::Update => {
                    graph.update();
                    passes += 1;
                }
            }
        }

        graph.update();
        passes += 1;

        Ok(PlanReport::new(graph, rejected, passes))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortReport {
    pub id: PortId,
    pub direction: PortDirection,
    pub resource: Option<String>,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeReport {
    pub id: NodeId,
    pub name: String,
    pub recipe: Option<String>,
    pub ports: Vec<PortReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkReport {
    pub id: ConnectionId,
    pub from: PortAddress,
    pub to: PortAddress,
    pub conveyor: Conveyor,
    pub flow: ConnectionFlow,
}

/// Snapshot of a graph after a plan ran
#[derive(Debug, Clone, PartialEq)]
pub struct PlanReport {
    pub nodes: Vec<NodeReport>,
    pub links: Vec<LinkReport>,
    pub rejected: Vec<String>,
    pub passes: usize,
}

impl PlanReport {
    pub fn new(graph: &NodeGraph, rejected: Vec<String>, passes: usize) -> Self {
        let nodes = graph
            .nodes()
            .iter()
            .map(|node| NodeReport {
                id: node.id,
                name: node.name().to_string(),
                recipe: node
                    .machine
                    .as_ref()
                    .and_then(|m| m.config.as_ref())
                    .map(|c| c.name.clone()),
                ports: node
                    .ports
                    .iter()
                    .map(|port| PortReport {
                        id: port.id,
                        direction: port.direction,
                        resource: port.resource().map(|r| r.name.clone()),
                        rate: port.rate(),
                    })
                    .collect(),
            })
            .collect();

        let links = graph
            .connections()
            .filter_map(|connection| {
                Some(LinkReport {
                    id: connection.id,
                    from: connection.from,
                    to: connection.to,
                    conveyor: connection.conveyor,
                    flow: graph.flow(connection.id)?,
                })
            })
            .collect();

        Self {
            nodes,
            links,
            rejected,
            passes,
        }
    }

    /// Links whose receiving end gets less than it asks for.
    pub fn starved_links(&self) -> impl Iterator<Item = &LinkReport> {
        self.links
            .iter()
            .filter(|link| link.flow.under_overflow_on_output < 0.0)
    }
}

impl fmt::Display for PlanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Factory Plan ===")?;
        writeln!(f)?;

        writeln!(f, "Nodes:")?;
        for node in &self.nodes {
            match &node.recipe {
                Some(recipe) => writeln!(f, "  [{}] {} ({})", node.id, node.name, recipe)?,
                None => writeln!(f, "  [{}] {}", node.id, node.name)?,
            }
            for port in &node.ports {
                let arrow = match port.direction {
                    PortDirection::Input => "in ",
                    PortDirection::Output => "out",
                };
                writeln!(
                    f,
                    "      {} {}: {} @ {:.1}/min",
                    arrow,
                    port.id,
                    port.resource.as_deref().unwrap_or("-"),
                    port.rate
                )?;
            }
        }
        writeln!(f)?;

        writeln!(f, "Links:")?;
        for link in &self.links {
            writeln!(
                f,
                "  #{} {} -> {} ({} {:.0}/min): flow {:.1}, input {:+.1}, output {:+.1}",
                link.id,
                link.from,
                link.to,
                link.conveyor.kind,
                link.conveyor.max_rate,
                link.flow.max_flow,
                link.flow.under_overflow_on_input,
                link.flow.under_overflow_on_output
            )?;
        }

        if !self.rejected.is_empty() {
            writeln!(f)?;
            writeln!(f, "Rejected ({}):", self.rejected.len())?;
            for message in &self.rejected {
                writeln!(f, "  {}", message)?;
            }
        }

        let starved = self.starved_links().count();
        if starved > 0 {
            writeln!(f)?;
            writeln!(f, "{} link(s) deliver less than their consumer needs", starved)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::ConfigError;
    use rusqlite::Connection;

    fn sample_catalog() -> Catalog {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        db::load_sample_data(&conn).unwrap();
        db::load_catalog(&conn).unwrap()
    }

    const IRON_LINE: &str = r#"
        # ore feeds two smelters through a splitter
        machine 1 Miner using Iron Ore
        splitter 2
        machine 3 Smelter using Iron Ingot
        machine 4 Smelter using Iron Ingot
        machine 5 Constructor using Iron Plate

        link 10 1:0 -> 2:0 belt 120
        link 11 2:1 -> 3:0 belt 60
        link 12 2:2 -> 4:0 belt 60
        link 13 3:1 -> 5:0 pipe 60
        link 14 1:0 -> 5:0 belt 60   # ore into a plate constructor
    "#;

    #[test]
    fn parses_all_statement_kinds() {
        let plan = Plan::parse(
            "machine 1 Smelter using Iron Ingot\nmerger 4\nlink 7 1:1 -> 4:0 270\nunlink 7\nremove 4\nupdate\n",
        )
        .unwrap();
        let statements: Vec<Statement> = plan.statements.into_iter().map(|(_, s)| s).collect();
        assert_eq!(
            statements,
            vec![
                Statement::Machine {
                    id: 1,
                    machine: "Smelter".to_string(),
                    recipe: "Iron Ingot".to_string(),
                },
                Statement::Merger(4),
                Statement::Link {
                    id: 7,
                    from: PortAddress { node: 1, port: 1 },
                    to: PortAddress { node: 4, port: 0 },
                    conveyor: Conveyor::belt(270.0),
                },
                Statement::Unlink(7),
                Statement::Remove(4),
                Statement::Update,
            ]
        );
    }

    #[test]
    fn syntax_error_names_the_line() {
        let err = Plan::parse("splitter 1\n\nconnect 1 to 2\n").unwrap_err();
        assert_eq!(err.to_string(), "line 3");
        assert!(format!("{:#}", err).contains("unrecognised statement: connect 1 to 2"));
    }

    #[test]
    fn iron_line_flows() {
        let catalog = sample_catalog();
        let mut graph = NodeGraph::new();
        let report = Plan::parse(IRON_LINE)
            .unwrap()
            .apply(&catalog, &mut graph)
            .unwrap();

        assert_eq!(report.nodes.len(), 5);
        assert_eq!(report.links.len(), 4);
        assert_eq!(report.rejected.len(), 1);
        assert!(report.rejected[0].starts_with("line 13:"));

        let splitter = &report.nodes[1];
        assert_eq!(splitter.name, "Splitter");
        assert_eq!(splitter.ports[0].rate, 60.0);
        assert_eq!(splitter.ports[1].rate, 30.0);
        assert_eq!(splitter.ports[1].resource.as_deref(), Some("Iron Ore"));

        let to_smelter = report.links.iter().find(|l| l.id == 11).unwrap();
        assert_eq!(to_smelter.flow.max_flow, 30.0);
        assert_eq!(to_smelter.flow.under_overflow_on_output, 0.0);

        let ingots = report.links.iter().find(|l| l.id == 13).unwrap();
        assert_eq!(ingots.conveyor.kind, crate::graph::connection::ConveyorKind::Pipe);
        assert_eq!(ingots.flow.under_overflow_on_input, -30.0);
        assert_eq!(ingots.flow.under_overflow_on_output, 0.0);
        assert_eq!(report.starved_links().count(), 0);
    }

    #[test]
    fn unlinking_starves_the_splitter() {
        let catalog = sample_catalog();
        let mut graph = NodeGraph::new();
        let script = format!("{}\nupdate\nunlink 10\n", IRON_LINE);
        let report = Plan::parse(&script)
            .unwrap()
            .apply(&catalog, &mut graph)
            .unwrap();

        let splitter = &report.nodes[1];
        assert!(splitter.ports.iter().all(|p| p.rate == 0.0));
        assert_eq!(report.starved_links().count(), 2);
        assert_eq!(report.passes, 2);
        assert!(report.to_string().contains("2 link(s) deliver less"));
    }

    #[test]
    fn splitter_chain_linked_from_the_far_end() {
        let catalog = sample_catalog();
        let mut graph = NodeGraph::new();
        let script = "machine 1 Miner using Iron Ore\n\
                      splitter 2\n\
                      splitter 3\n\
                      machine 4 Smelter using Iron Ingot\n\
                      link 10 2:1 -> 3:0 belt 120\n\
                      link 11 1:0 -> 2:0 belt 120\n\
                      link 12 3:1 -> 4:0 belt 120\n";
        let report = Plan::parse(script)
            .unwrap()
            .apply(&catalog, &mut graph)
            .unwrap();

        assert!(report.rejected.is_empty());
        let into_smelter = report.links.iter().find(|l| l.id == 12).unwrap();
        assert_eq!(into_smelter.flow.max_flow, 60.0);
        assert_eq!(into_smelter.flow.under_overflow_on_output, 30.0);
        assert_eq!(report.starved_links().count(), 0);
    }

    #[test]
    fn bad_recipe_aborts_the_plan() {
        let catalog = sample_catalog();
        let mut graph = NodeGraph::new();
        let err = Plan::parse("machine 1 Smelter using Iron Plate")
            .unwrap()
            .apply(&catalog, &mut graph)
            .unwrap_err();
        assert_eq!(err.to_string(), "line 1");
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::TargetMismatch { .. })
        ));
    }

    #[test]
    fn report_lists_nodes_and_links() {
        let catalog = sample_catalog();
        let mut graph = NodeGraph::new();
        let report = Plan::parse("machine 1 Miner using Iron Ore\nmachine 2 Smelter using Iron Ingot\nlink 3 1:0 -> 2:0 belt 60\nremove 9")
            .unwrap()
            .apply(&catalog, &mut graph)
            .unwrap();

        let text = report.to_string();
        assert!(text.contains("[1] Miner (Iron Ore)"));
        assert!(text.contains("out 0: Iron Ore @ 60.0/min"));
        assert!(text.contains("#3 1:0 -> 2:0 (belt 60/min): flow 60.0, input +0.0, output +30.0"));
        assert!(text.contains("line 4: unknown node 9"));
    }
}
