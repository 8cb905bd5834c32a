//! Flow rates and resource slots carried by ports
//!
//! Both come in a fixed flavour, set once when a machine is configured, and a
//! dynamic flavour that only network recomputation changes.

use crate::models::Resource;

/// Items per minute moving through a port.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlowRate {
    Fixed(f64),
    Dynamic(f64),
}

impl FlowRate {
    pub fn rate(&self) -> f64 {
        match *self {
            FlowRate::Fixed(rate) | FlowRate::Dynamic(rate) => rate,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, FlowRate::Dynamic(_))
    }

    /// Sets a dynamic rate. Fixed rates are left alone and `false` is returned.
    pub fn update(&mut self, rate: f64) -> bool {
        match self {
            FlowRate::Dynamic(current) => {
                *current = rate;
                true
            }
            FlowRate::Fixed(_) => false,
        }
    }
}

/// The resource occupying a port.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSlot {
    Fixed(Resource),
    Dynamic(Option<Resource>),
}

impl ResourceSlot {
    pub fn resource(&self) -> Option<&Resource> {
        match self {
            ResourceSlot::Fixed(resource) => Some(resource),
            ResourceSlot::Dynamic(resource) => resource.as_ref(),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ResourceSlot::Dynamic(_))
    }

    /// Two slots can share a link when they hold the same resource. An empty
    /// dynamic slot has not been claimed yet and accepts anything.
    pub fn accepts(&self, other: &ResourceSlot) -> bool {
        match (self.resource(), other.resource()) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }

    /// Reassigns a dynamic slot. Fixed slots are left alone and `false` is returned.
    pub fn update(&mut self, resource: Option<Resource>) -> bool {
        match self {
            ResourceSlot::Dynamic(current) => {
                *current = resource;
                true
            }
            ResourceSlot::Fixed(_) => false,
        }
    }
}
