//! Factory planner
//!
//! A flow network model for factory assembly lines: machines and special
//! elements joined by conveyors, with dynamic flow propagated through the graph.

pub mod catalog;
pub mod db;
pub mod error;
pub mod flow;
pub mod graph;
pub mod import;
pub mod models;
pub mod plan;
