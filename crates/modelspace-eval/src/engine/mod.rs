//! Modelspace engine
//!
//! Spaces, cells and their lazily maintained member views, evaluated on
//! demand against a merged namespace.

mod cells;
mod derive;
pub mod ingest;
pub mod lazy;
pub mod model;
pub mod mro;
mod persist;
pub mod space;
pub mod trace;

#[cfg(test)]
mod tests;

pub use ingest::{ExportRow, IngestRecord};
pub use lazy::{LazyGraph, NodeData, NodeId, NodeKind};
pub use model::Model;
pub use space::{MemberKind, SpaceOptions, SpaceOrigin};

use serde::{Deserialize, Serialize};

/// Configuration for a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Nested formula evaluations allowed before `DeepReference`.
    pub max_depth: usize,
    pub cells_prefix: String,
    pub space_prefix: String,
    /// Prefix of parametrized children's names.
    pub dynamic_prefix: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            max_depth: 1000,
            cells_prefix: "Cells".to_string(),
            space_prefix: "Space".to_string(),
            dynamic_prefix: "__Space".to_string(),
        }
    }
}

impl ModelConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Construct a new model with the given configuration
pub fn new_model(name: &str, config: ModelConfig) -> Model {
    Model::with_config(name, config)
}
