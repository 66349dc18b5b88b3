//! State model and change-request types for the VertexSim tissue simulation.
//!
//! This crate is the single source of truth for the serialized shape of a
//! simulation instant. Every other crate in the workspace reads and writes
//! [`VertexModelState`] and [`ModelChangeRequest`] values defined here.
//!
//! # Modules
//!
//! - [`ids`] -- Integer-backed identifier newtypes and the cell-type tag
//! - [`state`] -- [`VertexModelState`] and its parts, with validation and
//!   JSON round-tripping
//! - [`requests`] -- [`ModelChangeRequest`], the vocabulary of mid-run edits
//! - [`error`] -- [`StateError`], raised for malformed states

pub mod error;
pub mod ids;
pub mod requests;
pub mod state;

// Re-export all public types at crate root for convenience.
pub use error::StateError;
pub use ids::{CellId, CellType, VertexId};
pub use requests::ModelChangeRequest;
pub use state::{
    Cell, CellTypeParams, Environment, ForcingField, IntegratorKind, IntegratorSettings, Region,
    SimulationSettings, Vec2, Vertex, VertexModelState,
};
