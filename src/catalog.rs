//! Read-only registry of resources, machine templates and recipes

use crate::error::ConfigError;
use crate::graph::node::{Node, NodeId};
use crate::models::{Machine, MachineConfiguration, MachineTemplate, Resource};

/// Catalog data loaded once and handed to whatever builds nodes.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    resources: Vec<Resource>,
    machines: Vec<MachineTemplate>,
    recipes: Vec<MachineConfiguration>,
}

impl Catalog {
    pub fn new(
        resources: Vec<Resource>,
        machines: Vec<MachineTemplate>,
        recipes: Vec<MachineConfiguration>,
    ) -> Self {
        Self {
            resources,
            machines,
            recipes,
        }
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn machine_template(&self, name: &str) -> Option<&MachineTemplate> {
        self.machines.iter().find(|m| m.name == name)
    }

    pub fn machine_templates(&self) -> &[MachineTemplate] {
        &self.machines
    }

    pub fn recipe(&self, name: &str) -> Option<&MachineConfiguration> {
        self.recipes.iter().find(|c| c.name == name)
    }

    pub fn recipes(&self) -> &[MachineConfiguration] {
        &self.recipes
    }

    /// Recipes that can run on the named machine.
    pub fn recipes_for<'a>(&'a self, machine: &'a str) -> impl Iterator<Item = &'a MachineConfiguration> {
        self.recipes.iter().filter(move |c| c.target_machine == machine)
    }

    /// Applies `config` to the machine template called `name`.
    ///
    /// Returns `Ok(None)` when there is no such template.
    pub fn configured_machine(
        &self,
        name: &str,
        config: &MachineConfiguration,
    ) -> Result<Option<Machine>, ConfigError> {
        let Some(template) = self.machine_template(name) else {
            return Ok(None);
        };
        if config.target_machine != template.name {
            return Err(ConfigError::TargetMismatch {
                config: config.name.clone(),
                machine: template.name.clone(),
            });
        }
        Ok(Some(Machine::from_template(template, config.clone())))
    }

    /// Builds a machine node from a template name and a recipe name.
    pub fn build_node(&self, id: NodeId, machine: &str, recipe: &str) -> Result<Node, ConfigError> {
        let config = self
            .recipe(recipe)
            .ok_or_else(|| ConfigError::UnknownRecipe(recipe.to_string()))?;
        let machine = self
            .configured_machine(machine, config)?
            .ok_or_else(|| ConfigError::UnknownMachine(machine.to_string()))?;
        Node::from_machine(id, &machine)
    }
}
