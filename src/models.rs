//! Catalog data models: resources, machine templates and recipes

use std::fmt;

use crate::graph::port::{PortDirection, PortId};

/// A named item that flows through the factory.
///
/// Names are unique within a catalog, so two resources are the same
/// resource exactly when their names match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resource {
    pub name: String,
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortTemplate {
    pub id: PortId,
    pub direction: PortDirection,
}

/// The fixed port layout of a machine type.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineTemplate {
    pub id: i64,
    pub name: String,
    pub ports: Vec<PortTemplate>,
}

/// One input or output line of a recipe, in items per minute.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeEntry {
    pub resource: Resource,
    pub rate: f64,
    /// Binds the entry to a specific port instead of the next free one.
    pub port: Option<PortId>,
}

impl RecipeEntry {
    pub fn new(resource: Resource, rate: f64) -> Self {
        Self {
            resource,
            rate,
            port: None,
        }
    }

    pub fn on_port(mut self, port: PortId) -> Self {
        self.port = Some(port);
        self
    }
}

/// A recipe that can be applied to the machine named by `target_machine`.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineConfiguration {
    pub name: String,
    pub target_machine: String,
    pub inputs: Vec<RecipeEntry>,
    pub outputs: Vec<RecipeEntry>,
}

impl MachineConfiguration {
    pub fn entries(&self, direction: PortDirection) -> &[RecipeEntry] {
        match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        }
    }
}

/// A machine template, optionally configured with a recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct Machine {
    pub id: i64,
    pub name: String,
    pub config: Option<MachineConfiguration>,
    pub ports: Vec<PortTemplate>,
}

impl Machine {
    pub fn from_template(template: &MachineTemplate, config: MachineConfiguration) -> Self {
        Self {
            id: template.id,
            name: template.name.clone(),
            config: Some(config),
            ports: template.ports.clone(),
        }
    }

    pub fn unconfigured(template: &MachineTemplate) -> Self {
        Self {
            id: template.id,
            name: template.name.clone(),
            config: None,
            ports: template.ports.clone(),
        }
    }
}
