use crate::{
    patrol::PatrolState,
    types::{EntityId, NodeId},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Time rate must be a positive integer, got {rate}")]
    InvalidTimeRate { rate: i64 },

    #[error("Simulation clock has not been started")]
    ClockNotStarted,

    #[error("Unknown road node {node}")]
    UnknownNode { node: NodeId },

    #[error("Edge {source_node} -> {target_node} references a node that does not exist")]
    DanglingEdge { source_node: NodeId, target_node: NodeId },

    #[error("No path could be found between {from} and {to}")]
    NoPath { from: String, to: String },

    #[error("Patrol {patrol} in state {state:?} holds the wrong action (expected {expected})")]
    ActionMismatch {
        patrol:   EntityId,
        state:    PatrolState,
        expected: &'static str,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SimResult<T> = Result<T, SimError>;
