//! Deterministic initial tissue layouts.
//!
//! [`build_lattice`] lays out a rectangular grid of square cells centred in
//! the simulation box. Cells start at their target area (side `√A0`) and
//! neighbouring cells share boundary vertices, so a 2×2 lattice has 4 cells
//! and 9 vertices.
//!
//! # Numbering
//!
//! Vertex `(i, j)` (column `i`, row `j`, from the bottom-left corner) gets id
//! `j·(cells_x + 1) + i`. Cell `(i, j)` gets id `j·cells_x + i` and the
//! counter-clockwise boundary `(i,j) → (i+1,j) → (i+1,j+1) → (i,j+1)`.
//! Ids are assigned in row-major order, so identical inputs always yield
//! identical states.
//!
//! # Forcing
//!
//! With a [`ForcingSpec`], two slabs squeeze the tissue horizontally: the
//! left slab runs from the box edge to `relative_width` of the lattice width
//! past the lattice's left edge and pushes in `+x`; the right slab mirrors
//! it and pushes in `-x`. Both span the full box height.

use std::collections::BTreeMap;

use tracing::debug;
use vertexsim_types::{
    Cell, CellId, CellType, CellTypeParams, Environment, ForcingField, IntegratorSettings, Region,
    SimulationSettings, Vec2, Vertex, VertexId, VertexModelState,
};

use crate::error::BuildError;

/// Horizontal squeezing fields at both ends of the lattice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForcingSpec {
    /// Magnitude of the force on each vertex inside a slab.
    pub strength: f64,
    /// Slab width as a fraction of the lattice width, in `(0, 0.5]`.
    pub relative_width: f64,
}

/// High-level description of an initial lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeSpec {
    /// Cells along x.
    pub cells_x: u32,
    /// Cells along y.
    pub cells_y: u32,
    /// Type tag given to every cell.
    pub cell_type: CellType,
    /// Mechanical properties of that type.
    pub mechanics: CellTypeParams,
    /// Box dimensions `(lx, ly)`.
    pub box_size: Vec2,
    /// Optional squeezing fields.
    pub forcing: Option<ForcingSpec>,
    /// Integrator configuration carried into the state.
    pub integrator: IntegratorSettings,
    /// Run parameters carried into the state.
    pub simulation: SimulationSettings,
}

/// Build the initial state for `spec`.
///
/// # Errors
///
/// Returns [`BuildError`] if the lattice is empty, a parameter is out of
/// range, the lattice does not fit in the box, or the assembled state fails
/// validation (for instance a non-positive `dt`).
pub fn build_lattice(spec: &LatticeSpec) -> Result<VertexModelState, BuildError> {
    if spec.cells_x == 0 || spec.cells_y == 0 {
        return Err(BuildError::EmptyLattice {
            cells_x: spec.cells_x,
            cells_y: spec.cells_y,
        });
    }
    let a0 = spec.mechanics.a0;
    if !a0.is_finite() || a0 <= 0.0 {
        return Err(BuildError::InvalidParameter {
            name: "A0",
            value: a0,
            reason: "must be finite and strictly positive",
        });
    }

    let side = a0.sqrt();
    let width = f64::from(spec.cells_x) * side;
    let height = f64::from(spec.cells_y) * side;
    let (box_x, box_y) = (spec.box_size.x, spec.box_size.y);
    if !(width <= box_x && height <= box_y) {
        return Err(BuildError::DoesNotFit {
            width,
            height,
            box_x,
            box_y,
        });
    }
    let origin = Vec2::new((box_x - width) / 2.0, (box_y - height) / 2.0);

    let columns = u64::from(spec.cells_x) + 1;
    let mut vertices = Vec::new();
    for j in 0..=spec.cells_y {
        for i in 0..=spec.cells_x {
            vertices.push(Vertex {
                id: VertexId::new(u64::from(j) * columns + u64::from(i)),
                position: Vec2::new(
                    origin.x + f64::from(i) * side,
                    origin.y + f64::from(j) * side,
                ),
            });
        }
    }

    let vertex_at = |i: u32, j: u32| VertexId::new(u64::from(j) * columns + u64::from(i));
    let mut cells = Vec::new();
    for j in 0..spec.cells_y {
        for i in 0..spec.cells_x {
            cells.push(Cell {
                id: CellId::new(u64::from(j) * u64::from(spec.cells_x) + u64::from(i)),
                vertex_ids: vec![
                    vertex_at(i, j),
                    vertex_at(i + 1, j),
                    vertex_at(i + 1, j + 1),
                    vertex_at(i, j + 1),
                ],
                cell_type: spec.cell_type.clone(),
            });
        }
    }

    let fields = match spec.forcing {
        Some(forcing) => squeeze_fields(forcing, origin, width, spec.box_size)?,
        None => Vec::new(),
    };

    let mut cell_type_params = BTreeMap::new();
    cell_type_params.insert(spec.cell_type.clone(), spec.mechanics);

    let state = VertexModelState {
        step: 0,
        vertices,
        cells,
        cell_type_params,
        environment: Some(Environment {
            box_size: spec.box_size,
            fields,
        }),
        integrator_settings: spec.integrator,
        simulation_settings: spec.simulation,
    };
    state.validate()?;

    debug!(
        cells = state.cells.len(),
        vertices = state.vertices.len(),
        side,
        "Lattice built"
    );
    Ok(state)
}

/// Left and right squeezing slabs for a lattice starting at `origin`.
fn squeeze_fields(
    forcing: ForcingSpec,
    origin: Vec2,
    width: f64,
    box_size: Vec2,
) -> Result<Vec<ForcingField>, BuildError> {
    if !(forcing.relative_width > 0.0 && forcing.relative_width <= 0.5) {
        return Err(BuildError::InvalidParameter {
            name: "forcing.relative_width",
            value: forcing.relative_width,
            reason: "must lie in (0, 0.5]",
        });
    }
    if !forcing.strength.is_finite() || forcing.strength < 0.0 {
        return Err(BuildError::InvalidParameter {
            name: "forcing.strength",
            value: forcing.strength,
            reason: "must be finite and non-negative",
        });
    }

    let slab = forcing.relative_width * width;
    let right_edge = origin.x + width;
    Ok(vec![
        ForcingField {
            region: Region {
                x_min: 0.0,
                x_max: origin.x + slab,
                y_min: 0.0,
                y_max: box_size.y,
            },
            force: Vec2::new(forcing.strength, 0.0),
        },
        ForcingField {
            region: Region {
                x_min: right_edge - slab,
                x_max: box_size.x,
                y_min: 0.0,
                y_max: box_size.y,
            },
            force: Vec2::new(-forcing.strength, 0.0),
        },
    ])
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::indexing_slicing)]
mod tests {
    use vertexsim_types::IntegratorKind;

    use super::*;
    use crate::geometry;

    fn squeeze_spec() -> LatticeSpec {
        LatticeSpec {
            cells_x: 2,
            cells_y: 2,
            cell_type: CellType::default(),
            mechanics: CellTypeParams { kappa: 1.0, a0: 1.0, gamma: 0.16, p0: 0.3 },
            box_size: Vec2::new(15.0, 5.0),
            forcing: Some(ForcingSpec { strength: 0.005, relative_width: 0.25 }),
            integrator: IntegratorSettings {
                kind: IntegratorKind::Brownian,
                dt: 0.05,
                friction: 0.1,
                temperature: 0.0,
                seed: 0,
            },
            simulation: SimulationSettings::default(),
        }
    }

    #[test]
    fn two_by_two_shares_vertices() {
        let state = build_lattice(&squeeze_spec()).unwrap();
        assert_eq!(state.cells.len(), 4);
        assert_eq!(state.vertices.len(), 9);
        // The centre vertex (1, 1) has id 4 and belongs to every cell.
        assert_eq!(state.cells_touching(VertexId::new(4)).len(), 4);
    }

    #[test]
    fn identical_specs_build_identical_states() {
        let a = build_lattice(&squeeze_spec()).unwrap();
        let b = build_lattice(&squeeze_spec()).unwrap();
        assert_eq!(a, b);
        let ids: Vec<u64> = a.vertices.iter().map(|v| v.id.into_inner()).collect();
        assert_eq!(ids, (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn lattice_is_centred_in_box() {
        let state = build_lattice(&squeeze_spec()).unwrap();
        let first = state.vertex(VertexId::new(0)).unwrap().position;
        let last = state.vertex(VertexId::new(8)).unwrap().position;
        assert_eq!(first, Vec2::new(6.5, 1.5));
        assert_eq!(last, Vec2::new(8.5, 3.5));
    }

    #[test]
    fn cells_start_at_target_area_counter_clockwise() {
        let mut spec = squeeze_spec();
        spec.mechanics.a0 = 2.25;
        let state = build_lattice(&spec).unwrap();
        for cell in &state.cells {
            let poly = geometry::cell_polygon(&state, cell).unwrap();
            assert!((geometry::signed_area(&poly) - 2.25).abs() < 1e-12);
        }
    }

    #[test]
    fn forcing_slabs_cover_outer_columns() {
        let state = build_lattice(&squeeze_spec()).unwrap();
        let env = state.environment.as_ref().unwrap();
        assert_eq!(env.fields.len(), 2);
        let left = &env.fields[0];
        let right = &env.fields[1];
        assert!(left.force.x > 0.0 && right.force.x < 0.0);
        for v in &state.vertices {
            let column = v.id.into_inner() % 3;
            assert_eq!(left.region.contains(v.position), column == 0);
            assert_eq!(right.region.contains(v.position), column == 2);
        }
    }

    #[test]
    fn no_forcing_means_no_fields() {
        let mut spec = squeeze_spec();
        spec.forcing = None;
        let state = build_lattice(&spec).unwrap();
        assert!(state.environment.unwrap().fields.is_empty());
    }

    #[test]
    fn oversized_lattice_is_rejected() {
        let mut spec = squeeze_spec();
        spec.cells_y = 6;
        assert!(matches!(build_lattice(&spec), Err(BuildError::DoesNotFit { .. })));
    }

    #[test]
    fn empty_lattice_is_rejected() {
        let mut spec = squeeze_spec();
        spec.cells_x = 0;
        assert!(matches!(build_lattice(&spec), Err(BuildError::EmptyLattice { .. })));
    }

    #[test]
    fn bad_relative_width_is_rejected() {
        let mut spec = squeeze_spec();
        spec.forcing = Some(ForcingSpec { strength: 0.005, relative_width: 0.75 });
        assert!(matches!(
            build_lattice(&spec),
            Err(BuildError::InvalidParameter { name: "forcing.relative_width", .. })
        ));
    }

    #[test]
    fn invalid_integrator_surfaces_as_state_error() {
        let mut spec = squeeze_spec();
        spec.integrator.dt = -1.0;
        assert!(matches!(build_lattice(&spec), Err(BuildError::InvalidState { .. })));
    }
}
