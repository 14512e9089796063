//! Utilities shared across analysis stages.

mod graph_trait;

pub use graph_trait::GraphTraversal;
