//! The canonical vertex-model state: one serializable simulation instant.
//!
//! A [`VertexModelState`] carries the mesh (vertices and the cells they
//! bound), the per-cell-type force parameters, the optional forcing
//! environment and the integrator/simulation settings. It has no behaviour
//! beyond construction, lookup, validation and JSON round-tripping.
//!
//! # Validation tiers
//!
//! - [`VertexModelState::validate_structure`] checks what every state must
//!   satisfy to be meaningful at all: unique ids, cells referencing existing
//!   vertices, non-degenerate boundaries, finite coordinates. Deserialization
//!   runs this check eagerly.
//! - [`VertexModelState::validate`] additionally checks what the physics
//!   engine needs at hand-off: every cell type has parameters, and every
//!   parameter lies in its allowed range.
//!
//! # Determinism
//!
//! Vertices and cells are ordered sequences and parameters live in a
//! [`BTreeMap`], so [`VertexModelState::to_json`] produces the same
//! document for equal states. `serde_json` writes shortest round-trip float
//! representations, so `from_json(to_json(s)) == s` holds exactly.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::ids::{CellId, CellType, VertexId};

/// A 2D real-valued coordinate or vector, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Vec2 {
    /// Horizontal component.
    pub x: f64,
    /// Vertical component.
    pub y: f64,
}

impl Vec2 {
    /// Create a vector from its components.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Whether both components are finite.
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Vec2 {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Vec2> for [f64; 2] {
    fn from(v: Vec2) -> Self {
        [v.x, v.y]
    }
}

/// A mesh vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Stable vertex identifier.
    pub id: VertexId,
    /// Current position.
    pub position: Vec2,
}

/// A polygonal cell bounded by an ordered cycle of vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Stable cell identifier.
    pub id: CellId,
    /// Boundary vertices in cyclic order (at least 3, no repeats).
    pub vertex_ids: Vec<VertexId>,
    /// Type tag selecting the force parameters.
    pub cell_type: CellType,
}

impl Cell {
    /// Position of `vertex` on this cell's boundary, if present.
    pub fn boundary_index(&self, vertex: VertexId) -> Option<usize> {
        self.vertex_ids.iter().position(|&v| v == vertex)
    }

    /// Whether `vertex` lies on this cell's boundary.
    pub fn contains_vertex(&self, vertex: VertexId) -> bool {
        self.vertex_ids.contains(&vertex)
    }
}

/// Mechanical parameters shared by all cells of one type.
///
/// Area energy is `½·κ·(A − A0)²`; the perimeter term uses the stiffness
/// `γ` together with the line-tension term `λ = P0·γ`, which is always
/// derived and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellTypeParams {
    /// Area stiffness κ.
    pub kappa: f64,
    /// Target area A0.
    #[serde(rename = "A0")]
    pub a0: f64,
    /// Perimeter stiffness γ.
    pub gamma: f64,
    /// Target perimeter P0.
    #[serde(rename = "P0")]
    pub p0: f64,
}

impl CellTypeParams {
    /// Line-tension term `λ = P0·γ`.
    pub const fn lambda(&self) -> f64 {
        self.p0 * self.gamma
    }

    /// Check the parameter ranges, naming failures under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidParameter`] if a value is non-finite or
    /// a stiffness is negative.
    pub fn validate(&self, prefix: &str) -> Result<(), StateError> {
        check_finite(prefix, "A0", self.a0)?;
        check_finite(prefix, "P0", self.p0)?;
        check_non_negative(prefix, "kappa", self.kappa)?;
        check_non_negative(prefix, "gamma", self.gamma)?;
        Ok(())
    }
}

/// Axis-aligned rectangular region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Left edge.
    pub x_min: f64,
    /// Right edge.
    pub x_max: f64,
    /// Bottom edge.
    pub y_min: f64,
    /// Top edge.
    pub y_max: f64,
}

impl Region {
    /// Whether `point` lies inside the region (edges inclusive).
    pub const fn contains(&self, point: Vec2) -> bool {
        point.x >= self.x_min
            && point.x <= self.x_max
            && point.y >= self.y_min
            && point.y <= self.y_max
    }
}

/// A constant force applied to every vertex inside a region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForcingField {
    /// Where the field acts.
    pub region: Region,
    /// Force added to each vertex in the region.
    pub force: Vec2,
}

/// Simulation box and boundary forcing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Box dimensions `(lx, ly)`; the box spans `[0, lx] × [0, ly]`.
    pub box_size: Vec2,
    /// Forcing fields acting on cell-boundary vertices.
    #[serde(default)]
    pub fields: Vec<ForcingField>,
}

/// Numerical integrator selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorKind {
    /// Overdamped Euler step with thermal noise.
    Brownian,
    /// Overdamped Euler step without noise.
    Euler,
    /// Classic fourth-order Runge-Kutta on the overdamped equation.
    RungeKutta,
}

impl IntegratorKind {
    /// Wire name of the integrator.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Brownian => "brownian",
            Self::Euler => "euler",
            Self::RungeKutta => "runge_kutta",
        }
    }
}

/// Integrator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegratorSettings {
    /// Which integrator advances the mesh.
    pub kind: IntegratorKind,
    /// Time step, strictly positive.
    pub dt: f64,
    /// Friction coefficient ξ, strictly positive.
    pub friction: f64,
    /// Temperature driving the Brownian noise, non-negative.
    #[serde(default)]
    pub temperature: f64,
    /// Seed for stochastic integrators. Noise at step `n` is derived from
    /// `(seed, n)` only, so runs are reproducible.
    #[serde(default)]
    pub seed: u64,
}

impl IntegratorSettings {
    /// Check the parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidParameter`] naming the first bad value.
    pub fn validate(&self) -> Result<(), StateError> {
        const PREFIX: &str = "integrator_settings";
        check_positive(PREFIX, "dt", self.dt)?;
        check_positive(PREFIX, "friction", self.friction)?;
        check_non_negative(PREFIX, "temperature", self.temperature)?;
        Ok(())
    }
}

/// Miscellaneous run parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Whether the engine may perform topological transitions (T1 flips).
    #[serde(default)]
    pub topological_changes: bool,
}

/// One simulation instant: mesh, force parameters and settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexModelState {
    /// Engine step count at which this state was captured.
    #[serde(default)]
    pub step: u64,
    /// Vertices in stable order.
    pub vertices: Vec<Vertex>,
    /// Cells in stable order.
    pub cells: Vec<Cell>,
    /// Force parameters per cell type.
    pub cell_type_params: BTreeMap<CellType, CellTypeParams>,
    /// Box and forcing fields, if any.
    #[serde(default)]
    pub environment: Option<Environment>,
    /// Integrator configuration.
    pub integrator_settings: IntegratorSettings,
    /// Miscellaneous run parameters.
    #[serde(default)]
    pub simulation_settings: SimulationSettings,
}

impl VertexModelState {
    // -------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------

    /// Find a vertex by id.
    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.iter().find(|v| v.id == id)
    }

    /// Find a vertex by id, mutably.
    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex> {
        self.vertices.iter_mut().find(|v| v.id == id)
    }

    /// Find a cell by id.
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id == id)
    }

    /// Find a cell by id, mutably.
    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.iter_mut().find(|c| c.id == id)
    }

    /// Map from vertex id to position, for geometry over many cells.
    pub fn position_index(&self) -> BTreeMap<VertexId, Vec2> {
        self.vertices.iter().map(|v| (v.id, v.position)).collect()
    }

    /// Ids of all cells whose boundary contains `vertex`.
    pub fn cells_touching(&self, vertex: VertexId) -> Vec<CellId> {
        self.cells
            .iter()
            .filter(|c| c.contains_vertex(vertex))
            .map(|c| c.id)
            .collect()
    }

    /// Smallest cell id strictly greater than every existing one.
    pub fn next_cell_id(&self) -> CellId {
        self.cells
            .iter()
            .map(|c| c.id.into_inner().saturating_add(1))
            .max()
            .map_or(CellId::new(0), CellId::new)
    }

    // -------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------

    /// Check the structural invariants every state must satisfy.
    ///
    /// # Errors
    ///
    /// Returns the first violation found: duplicate ids, non-finite
    /// positions, degenerate boundaries, repeated or unknown vertices.
    pub fn validate_structure(&self) -> Result<(), StateError> {
        let mut vertex_ids = BTreeSet::new();
        for vertex in &self.vertices {
            if !vertex_ids.insert(vertex.id) {
                return Err(StateError::DuplicateVertex(vertex.id));
            }
            if !vertex.position.is_finite() {
                return Err(StateError::NonFinitePosition(vertex.id));
            }
        }

        let mut cell_ids = BTreeSet::new();
        for cell in &self.cells {
            if !cell_ids.insert(cell.id) {
                return Err(StateError::DuplicateCell(cell.id));
            }
            if cell.vertex_ids.len() < 3 {
                return Err(StateError::DegenerateCell {
                    cell: cell.id,
                    len: cell.vertex_ids.len(),
                });
            }
            let mut seen = BTreeSet::new();
            for &vertex in &cell.vertex_ids {
                if !seen.insert(vertex) {
                    return Err(StateError::RepeatedVertex {
                        cell: cell.id,
                        vertex,
                    });
                }
                if !vertex_ids.contains(&vertex) {
                    return Err(StateError::UnknownVertex {
                        cell: cell.id,
                        vertex,
                    });
                }
            }
        }
        Ok(())
    }

    /// Check every invariant required before handing the state to an engine.
    ///
    /// # Errors
    ///
    /// Returns the first structural violation, a cell whose type has no
    /// parameters, or an out-of-range parameter.
    pub fn validate(&self) -> Result<(), StateError> {
        self.validate_structure()?;

        for cell in &self.cells {
            if !self.cell_type_params.contains_key(&cell.cell_type) {
                return Err(StateError::MissingCellType {
                    cell: cell.id,
                    cell_type: cell.cell_type.clone(),
                });
            }
        }
        for (cell_type, params) in &self.cell_type_params {
            params.validate(&format!("cell_type_params.{cell_type}"))?;
        }

        self.integrator_settings.validate()?;

        if let Some(env) = &self.environment {
            check_positive("environment.box_size", "x", env.box_size.x)?;
            check_positive("environment.box_size", "y", env.box_size.y)?;
            for field in &env.fields {
                let r = &field.region;
                check_finite("environment.fields", "region.x_min", r.x_min)?;
                check_finite("environment.fields", "region.x_max", r.x_max)?;
                check_finite("environment.fields", "region.y_min", r.y_min)?;
                check_finite("environment.fields", "region.y_max", r.y_max)?;
                check_finite("environment.fields", "force.x", field.force.x)?;
                check_finite("environment.fields", "force.y", field.force.y)?;
                if r.x_min > r.x_max {
                    return Err(invalid(
                        "environment.fields",
                        "region.x_min",
                        r.x_min,
                        "must not exceed region.x_max",
                    ));
                }
                if r.y_min > r.y_max {
                    return Err(invalid(
                        "environment.fields",
                        "region.y_min",
                        r.y_min,
                        "must not exceed region.y_max",
                    ));
                }
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Serialization
    // -------------------------------------------------------------------

    /// Serialize to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Malformed`] if serialization fails.
    pub fn to_json(&self) -> Result<serde_json::Value, StateError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Serialize to a compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Malformed`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from a JSON value and check the structural invariants.
    ///
    /// Unknown fields are ignored, so checkpoints carrying engine-native
    /// extras load cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] for missing fields, duplicate ids, unknown
    /// vertex references or degenerate cells.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, StateError> {
        let state = Self::deserialize(value)?;
        state.validate_structure()?;
        Ok(state)
    }

    /// Deserialize from JSON text and check the structural invariants.
    ///
    /// # Errors
    ///
    /// Same as [`from_json`](Self::from_json), plus unparseable text.
    pub fn from_json_str(text: &str) -> Result<Self, StateError> {
        let state: Self = serde_json::from_str(text)?;
        state.validate_structure()?;
        Ok(state)
    }
}

fn invalid(prefix: &str, name: &str, value: f64, reason: &'static str) -> StateError {
    StateError::InvalidParameter {
        name: format!("{prefix}.{name}"),
        value,
        reason,
    }
}

fn check_finite(prefix: &str, name: &str, value: f64) -> Result<(), StateError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(prefix, name, value, "must be finite"))
    }
}

fn check_non_negative(prefix: &str, name: &str, value: f64) -> Result<(), StateError> {
    check_finite(prefix, name, value)?;
    if value < 0.0 {
        return Err(invalid(prefix, name, value, "must be non-negative"));
    }
    Ok(())
}

fn check_positive(prefix: &str, name: &str, value: f64) -> Result<(), StateError> {
    check_finite(prefix, name, value)?;
    if value <= 0.0 {
        return Err(invalid(prefix, name, value, "must be strictly positive"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn triangle_state() -> VertexModelState {
        let mut params = BTreeMap::new();
        params.insert(
            CellType::default(),
            CellTypeParams {
                kappa: 1.0,
                a0: 1.0,
                gamma: 0.16,
                p0: 0.3,
            },
        );
        VertexModelState {
            step: 0,
            vertices: vec![
                Vertex { id: VertexId::new(0), position: Vec2::new(0.0, 0.0) },
                Vertex { id: VertexId::new(1), position: Vec2::new(1.0, 0.0) },
                Vertex { id: VertexId::new(2), position: Vec2::new(0.0, 1.0) },
            ],
            cells: vec![Cell {
                id: CellId::new(0),
                vertex_ids: vec![VertexId::new(0), VertexId::new(1), VertexId::new(2)],
                cell_type: CellType::default(),
            }],
            cell_type_params: params,
            environment: None,
            integrator_settings: IntegratorSettings {
                kind: IntegratorKind::Euler,
                dt: 0.05,
                friction: 0.1,
                temperature: 0.0,
                seed: 0,
            },
            simulation_settings: SimulationSettings::default(),
        }
    }

    #[test]
    fn valid_state_passes_both_tiers() {
        let state = triangle_state();
        assert!(state.validate_structure().is_ok());
        assert!(state.validate().is_ok());
    }

    #[test]
    fn lambda_is_derived_from_p0_and_gamma() {
        let params = CellTypeParams { kappa: 1.0, a0: 1.0, gamma: 0.5, p0: 3.0 };
        assert!((params.lambda() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn duplicate_vertex_is_rejected() {
        let mut state = triangle_state();
        state.vertices.push(Vertex { id: VertexId::new(1), position: Vec2::new(5.0, 5.0) });
        assert!(matches!(
            state.validate_structure(),
            Err(StateError::DuplicateVertex(id)) if id == VertexId::new(1)
        ));
    }

    #[test]
    fn unknown_vertex_reference_is_rejected() {
        let mut state = triangle_state();
        state.cells[0].vertex_ids.push(VertexId::new(99));
        assert!(matches!(
            state.validate_structure(),
            Err(StateError::UnknownVertex { vertex, .. }) if vertex == VertexId::new(99)
        ));
    }

    #[test]
    fn degenerate_and_repeated_boundaries_are_rejected() {
        let mut state = triangle_state();
        state.cells[0].vertex_ids.truncate(2);
        assert!(matches!(
            state.validate_structure(),
            Err(StateError::DegenerateCell { len: 2, .. })
        ));

        let mut state = triangle_state();
        state.cells[0].vertex_ids = vec![VertexId::new(0), VertexId::new(1), VertexId::new(0)];
        assert!(matches!(
            state.validate_structure(),
            Err(StateError::RepeatedVertex { .. })
        ));
    }

    #[test]
    fn non_finite_position_is_rejected() {
        let mut state = triangle_state();
        state.vertices[2].position.y = f64::NAN;
        assert!(matches!(
            state.validate_structure(),
            Err(StateError::NonFinitePosition(_))
        ));
    }

    #[test]
    fn missing_cell_type_fails_engine_validation_only() {
        let mut state = triangle_state();
        state.cells[0].cell_type = CellType::new("mystery");
        assert!(state.validate_structure().is_ok());
        assert!(matches!(
            state.validate(),
            Err(StateError::MissingCellType { .. })
        ));
    }

    #[test]
    fn non_positive_dt_is_rejected() {
        let mut state = triangle_state();
        state.integrator_settings.dt = 0.0;
        let err = state.validate().unwrap_err();
        assert!(err.to_string().contains("integrator_settings.dt"));
    }

    #[test]
    fn negative_stiffness_is_rejected() {
        let mut state = triangle_state();
        if let Some(p) = state.cell_type_params.get_mut(&CellType::default()) {
            p.gamma = -0.1;
        }
        assert!(matches!(
            state.validate(),
            Err(StateError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn inverted_field_region_is_rejected() {
        let mut state = triangle_state();
        state.environment = Some(Environment {
            box_size: Vec2::new(4.0, 4.0),
            fields: vec![ForcingField {
                region: Region { x_min: 2.0, x_max: 1.0, y_min: 0.0, y_max: 4.0 },
                force: Vec2::new(0.1, 0.0),
            }],
        });
        let err = state.validate().unwrap_err();
        assert!(err.to_string().contains("environment.fields.region.x_min"));

        if let Some(env) = &mut state.environment {
            env.fields[0].region = Region { x_min: 1.0, x_max: 1.0, y_min: 3.0, y_max: 0.0 };
        }
        let err = state.validate().unwrap_err();
        assert!(err.to_string().contains("environment.fields.region.y_min"));
    }

    #[test]
    fn json_uses_documented_keys() {
        let json = triangle_state().to_json().unwrap();
        assert_eq!(json["vertices"][1]["position"], serde_json::json!([1.0, 0.0]));
        assert_eq!(json["cells"][0]["cell_type"], "default");
        assert_eq!(json["cell_type_params"]["default"]["A0"], 1.0);
        assert_eq!(json["integrator_settings"]["kind"], "euler");
    }

    #[test]
    fn from_json_ignores_unknown_fields() {
        let mut json = triangle_state().to_json().unwrap();
        json["energy"] = serde_json::json!(0.25);
        let back = VertexModelState::from_json(&json).unwrap();
        assert_eq!(back, triangle_state());
    }

    #[test]
    fn from_json_reports_missing_field() {
        let mut json = triangle_state().to_json().unwrap();
        json.as_object_mut().unwrap().remove("cells");
        assert!(matches!(
            VertexModelState::from_json(&json),
            Err(StateError::Malformed { .. })
        ));
    }

    #[test]
    fn next_cell_id_follows_the_largest() {
        let mut state = triangle_state();
        assert_eq!(state.next_cell_id(), CellId::new(1));
        state.cells[0].id = CellId::new(10);
        assert_eq!(state.next_cell_id(), CellId::new(11));
        state.cells.clear();
        assert_eq!(state.next_cell_id(), CellId::new(0));
    }

    #[test]
    fn region_contains_edges() {
        let r = Region { x_min: 0.0, x_max: 1.0, y_min: 0.0, y_max: 1.0 };
        assert!(r.contains(Vec2::new(1.0, 0.5)));
        assert!(!r.contains(Vec2::new(1.0001, 0.5)));
    }
}
