//! Model-change requests: discrete structural edits issued mid-run.
//!
//! Each [`ModelChangeRequest`] variant carries exactly the fields its edit
//! needs. Requests are serialized with an internal `kind` tag so that a
//! request file reads naturally:
//!
//! ```json
//! { "kind": "move_vertex", "vertex_id": 4, "position": [7.5, 2.5] }
//! ```
//!
//! Applying a request to a state is the job of the applicator in
//! `vertexsim-tissue`; this module only defines the vocabulary.

use serde::{Deserialize, Serialize};

use crate::ids::{CellId, CellType, VertexId};
use crate::state::{CellTypeParams, IntegratorSettings, Vec2};

/// One discrete edit to a [`VertexModelState`].
///
/// [`VertexModelState`]: crate::state::VertexModelState
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelChangeRequest {
    /// Move a vertex to a new position.
    MoveVertex {
        /// The vertex to move.
        vertex_id: VertexId,
        /// Its new position.
        position: Vec2,
    },
    /// Remove a cell. Vertices used by no other cell are removed with it.
    RemoveCell {
        /// The cell to remove.
        cell_id: CellId,
    },
    /// Split a cell along the chord between two of its boundary vertices.
    ///
    /// The original cell keeps the arc from `vertex_a` to `vertex_b`; the new
    /// cell takes the arc from `vertex_b` back to `vertex_a`. Both inherit
    /// the parent's type.
    SplitCell {
        /// The cell to split.
        cell_id: CellId,
        /// First chord endpoint.
        vertex_a: VertexId,
        /// Second chord endpoint.
        vertex_b: VertexId,
        /// Id given to the newly created cell.
        new_cell_id: CellId,
    },
    /// Change the type tag of one cell.
    SetCellType {
        /// The cell to retag.
        cell_id: CellId,
        /// Its new type.
        cell_type: CellType,
    },
    /// Add or replace the force parameters of a cell type.
    UpsertCellTypeParams {
        /// The type being configured.
        cell_type: CellType,
        /// Its parameters.
        params: CellTypeParams,
    },
    /// Remove the parameters of a cell type no cell uses any more.
    RemoveCellTypeParams {
        /// The type being removed.
        cell_type: CellType,
    },
    /// Replace the integrator settings.
    SetIntegrator {
        /// The new settings.
        settings: IntegratorSettings,
    },
}

impl ModelChangeRequest {
    /// Wire name of the request variant.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MoveVertex { .. } => "move_vertex",
            Self::RemoveCell { .. } => "remove_cell",
            Self::SplitCell { .. } => "split_cell",
            Self::SetCellType { .. } => "set_cell_type",
            Self::UpsertCellTypeParams { .. } => "upsert_cell_type_params",
            Self::RemoveCellTypeParams { .. } => "remove_cell_type_params",
            Self::SetIntegrator { .. } => "set_integrator",
        }
    }

    /// Serialize to a JSON value, for logs and error reports.
    ///
    /// # Errors
    ///
    /// Returns the serialization error if a field cannot be represented.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
