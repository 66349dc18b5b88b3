//! Error types for the `vertexsim-types` crate.
//!
//! Every way a [`VertexModelState`] can be malformed maps to one
//! [`StateError`] variant. These errors are never repaired silently: the
//! caller receives the offending id and decides what to do.
//!
//! [`VertexModelState`]: crate::state::VertexModelState

use crate::ids::{CellId, CellType, VertexId};

/// A serialized or constructed state violates the data-model invariants.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The JSON document does not match the state schema (missing field,
    /// wrong type, unparseable text).
    #[error("malformed state document: {source}")]
    Malformed {
        /// The underlying deserialization error.
        #[from]
        source: serde_json::Error,
    },

    /// Two vertices share an id.
    #[error("duplicate vertex id: {0}")]
    DuplicateVertex(VertexId),

    /// Two cells share an id.
    #[error("duplicate cell id: {0}")]
    DuplicateCell(CellId),

    /// A cell references a vertex that does not exist.
    #[error("cell {cell} references unknown vertex {vertex}")]
    UnknownVertex {
        /// The referencing cell.
        cell: CellId,
        /// The missing vertex.
        vertex: VertexId,
    },

    /// A cell boundary has fewer than three vertices.
    #[error("cell {cell} has {len} vertices, at least 3 required")]
    DegenerateCell {
        /// The degenerate cell.
        cell: CellId,
        /// Number of vertices on its boundary.
        len: usize,
    },

    /// A vertex appears more than once on a cell boundary.
    #[error("cell {cell} lists vertex {vertex} more than once")]
    RepeatedVertex {
        /// The offending cell.
        cell: CellId,
        /// The repeated vertex.
        vertex: VertexId,
    },

    /// A vertex position is NaN or infinite.
    #[error("vertex {0} has a non-finite position")]
    NonFinitePosition(VertexId),

    /// A cell's type has no registered force parameters.
    #[error("cell {cell} has type {cell_type:?} with no force parameters")]
    MissingCellType {
        /// The cell whose type is unregistered.
        cell: CellId,
        /// The unregistered type tag.
        cell_type: CellType,
    },

    /// A numeric parameter is out of its allowed range.
    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        /// Dotted parameter path, e.g. `integrator_settings.dt`.
        name: String,
        /// The rejected value.
        value: f64,
        /// Which constraint was violated.
        reason: &'static str,
    },
}
