//! Transactional application of model-change requests.
//!
//! [`apply`] is a pure function: it borrows the current state, builds the
//! edited copy, and returns it only if every invariant still holds. A
//! rejected request therefore never leaves a partial mutation behind.
//!
//! Failure modes:
//!
//! - [`ApplyError::Inapplicable`] -- the request does not fit the state
//!   (unknown id, adjacent split vertices, parameters in use, ...).
//! - [`ApplyError::InvalidInput`] -- the state handed in was already broken.
//! - [`ApplyError::InvariantViolation`] -- the edit produced a broken state.
//!   This signals a bug in this module and must never be swallowed.

use std::collections::BTreeSet;

use tracing::debug;
use vertexsim_types::{
    Cell, CellId, CellType, CellTypeParams, IntegratorSettings, ModelChangeRequest, Vec2,
    VertexId, VertexModelState,
};

use crate::error::ApplyError;

/// Apply one request to `state`, returning the edited state.
///
/// # Errors
///
/// See the [module documentation](self) for the three failure modes.
pub fn apply(
    state: &VertexModelState,
    request: &ModelChangeRequest,
) -> Result<VertexModelState, ApplyError> {
    state
        .validate()
        .map_err(|source| ApplyError::InvalidInput { source })?;

    let mut next = state.clone();
    let outcome = match request {
        ModelChangeRequest::MoveVertex { vertex_id, position } => {
            move_vertex(&mut next, *vertex_id, *position)
        }
        ModelChangeRequest::RemoveCell { cell_id } => remove_cell(&mut next, *cell_id),
        ModelChangeRequest::SplitCell {
            cell_id,
            vertex_a,
            vertex_b,
            new_cell_id,
        } => split_cell(&mut next, *cell_id, *vertex_a, *vertex_b, *new_cell_id),
        ModelChangeRequest::SetCellType { cell_id, cell_type } => {
            set_cell_type(&mut next, *cell_id, cell_type)
        }
        ModelChangeRequest::UpsertCellTypeParams { cell_type, params } => {
            upsert_params(&mut next, cell_type, *params)
        }
        ModelChangeRequest::RemoveCellTypeParams { cell_type } => {
            remove_params(&mut next, cell_type)
        }
        ModelChangeRequest::SetIntegrator { settings } => set_integrator(&mut next, *settings),
    };

    outcome.map_err(|reason| ApplyError::Inapplicable {
        request: Box::new(request.clone()),
        reason,
    })?;

    next.validate()
        .map_err(|source| ApplyError::InvariantViolation {
            request: Box::new(request.clone()),
            source,
        })?;

    debug!(
        kind = request.kind(),
        cells = next.cells.len(),
        vertices = next.vertices.len(),
        "Change request applied"
    );
    Ok(next)
}

/// Apply `requests` one at a time, in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the first [`ApplyError`]; no later request is attempted.
pub fn apply_all(
    state: &VertexModelState,
    requests: &[ModelChangeRequest],
) -> Result<VertexModelState, ApplyError> {
    let mut current = state.clone();
    for request in requests {
        current = apply(&current, request)?;
    }
    Ok(current)
}

// ---------------------------------------------------------------------------
// Per-variant edits. Each returns the rejection reason on failure.
// ---------------------------------------------------------------------------

fn move_vertex(state: &mut VertexModelState, id: VertexId, position: Vec2) -> Result<(), String> {
    if !position.is_finite() {
        return Err(format!("target position for vertex {id} is not finite"));
    }
    let vertex = state
        .vertex_mut(id)
        .ok_or_else(|| format!("vertex {id} does not exist"))?;
    vertex.position = position;
    Ok(())
}

fn remove_cell(state: &mut VertexModelState, id: CellId) -> Result<(), String> {
    let index = state
        .cells
        .iter()
        .position(|c| c.id == id)
        .ok_or_else(|| format!("cell {id} does not exist"))?;
    let removed = state.cells.remove(index);

    let still_used: BTreeSet<VertexId> = state
        .cells
        .iter()
        .flat_map(|c| c.vertex_ids.iter().copied())
        .collect();
    let orphaned: BTreeSet<VertexId> = removed
        .vertex_ids
        .iter()
        .copied()
        .filter(|v| !still_used.contains(v))
        .collect();
    state.vertices.retain(|v| !orphaned.contains(&v.id));
    Ok(())
}

fn split_cell(
    state: &mut VertexModelState,
    id: CellId,
    vertex_a: VertexId,
    vertex_b: VertexId,
    new_id: CellId,
) -> Result<(), String> {
    if state.cell(new_id).is_some() {
        return Err(format!(
            "new cell id {new_id} is already in use; the next free id is {}",
            state.next_cell_id()
        ));
    }
    if vertex_a == vertex_b {
        return Err(format!("split endpoints are both vertex {vertex_a}"));
    }
    let index = state
        .cells
        .iter()
        .position(|c| c.id == id)
        .ok_or_else(|| format!("cell {id} does not exist"))?;
    let parent = state
        .cells
        .get(index)
        .ok_or_else(|| format!("cell {id} does not exist"))?;

    let n = parent.vertex_ids.len();
    let ia = parent
        .boundary_index(vertex_a)
        .ok_or_else(|| format!("vertex {vertex_a} is not on the boundary of cell {id}"))?;
    let ib = parent
        .boundary_index(vertex_b)
        .ok_or_else(|| format!("vertex {vertex_b} is not on the boundary of cell {id}"))?;

    // Number of boundary steps going forward from a to b.
    let forward = (ib + n - ia) % n;
    if forward < 2 || forward > n - 2 {
        return Err(format!(
            "vertices {vertex_a} and {vertex_b} are adjacent on cell {id}; the split would be degenerate"
        ));
    }

    let ring = || parent.vertex_ids.iter().copied().cycle();
    let kept: Vec<VertexId> = ring().skip(ia).take(forward + 1).collect();
    let split_off: Vec<VertexId> = ring().skip(ib).take(n - forward + 1).collect();
    let child = Cell {
        id: new_id,
        vertex_ids: split_off,
        cell_type: parent.cell_type.clone(),
    };

    if let Some(parent) = state.cells.get_mut(index) {
        parent.vertex_ids = kept;
    }
    state.cells.insert(index + 1, child);
    Ok(())
}

fn set_cell_type(
    state: &mut VertexModelState,
    id: CellId,
    cell_type: &CellType,
) -> Result<(), String> {
    if !state.cell_type_params.contains_key(cell_type) {
        return Err(format!("cell type '{cell_type}' has no force parameters"));
    }
    let cell = state
        .cell_mut(id)
        .ok_or_else(|| format!("cell {id} does not exist"))?;
    cell.cell_type = cell_type.clone();
    Ok(())
}

fn upsert_params(
    state: &mut VertexModelState,
    cell_type: &CellType,
    params: CellTypeParams,
) -> Result<(), String> {
    params
        .validate(&format!("cell_type_params.{cell_type}"))
        .map_err(|e| e.to_string())?;
    state.cell_type_params.insert(cell_type.clone(), params);
    Ok(())
}

fn remove_params(state: &mut VertexModelState, cell_type: &CellType) -> Result<(), String> {
    if let Some(user) = state.cells.iter().find(|c| &c.cell_type == cell_type) {
        return Err(format!(
            "cell type '{cell_type}' is still used by cell {}",
            user.id
        ));
    }
    state
        .cell_type_params
        .remove(cell_type)
        .map(|_| ())
        .ok_or_else(|| format!("cell type '{cell_type}' has no force parameters"))
}

fn set_integrator(state: &mut VertexModelState, settings: IntegratorSettings) -> Result<(), String> {
    settings.validate().map_err(|e| e.to_string())?;
    state.integrator_settings = settings;
    Ok(())
}
