//! The physics-engine boundary and a deterministic in-process engine.
//!
//! [`PhysicsEngine`] is the seam between the driver and whatever computes
//! forces and moves vertices. It speaks plain JSON so that an engine living
//! in another process or library can sit behind it unchanged:
//!
//! - the mesh handed to [`PhysicsEngine::initialize`] is a [`MeshDescription`];
//! - force parameters are per-kind JSON objects (see [`ForceKind`]);
//! - integrator parameters are an [`IntegratorParams`] object;
//! - [`PhysicsEngine::export_state`] returns the mesh keys plus any extras.
//!
//! [`ReferenceEngine`] implements the area, perimeter and boundary-field
//! forces with Euler, Brownian and fourth-order Runge-Kutta integrators. It
//! does not perform topological changes.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use vertexsim_types::{
    CellId, CellType, ForcingField, IntegratorKind, Vec2, Vertex, VertexId,
};

/// Errors reported by a physics engine.
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    /// A JSON payload did not have the expected shape.
    #[error("malformed {what}: {source}")]
    Malformed {
        /// Which payload was being decoded.
        what: &'static str,
        /// The decode error.
        source: serde_json::Error,
    },

    /// The mesh decoded but is not usable.
    #[error("invalid mesh: {reason}")]
    InvalidMesh {
        /// What is wrong with it.
        reason: String,
    },

    /// The engine does not implement a requested feature.
    #[error("unsupported feature: {feature}")]
    Unsupported {
        /// The feature name.
        feature: &'static str,
    },

    /// A cell's type has no parameters for a registered force.
    #[error("{force} force has no parameters for cell type '{cell_type}'")]
    MissingParams {
        /// The force missing the entry.
        force: &'static str,
        /// The cell type.
        cell_type: CellType,
    },

    /// `advance` was called before the engine had everything it needs.
    #[error("engine not ready: no {missing}")]
    NotReady {
        /// What is missing.
        missing: &'static str,
    },

    /// Integration produced a non-finite position.
    #[error("integration diverged at step {step}")]
    Diverged {
        /// The step that produced it.
        step: u64,
    },
}

/// The force terms an engine can be asked to register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceKind {
    /// `E = ½κ(A − A0)²` per cell. Params: `{type: {kappa, A0}}`.
    Area,
    /// `E = ½γP² − λP` per cell. Params: `{type: {gamma, lambda}}`.
    Perimeter,
    /// Constant force on vertices inside a region. Params: `[{region, force}]`.
    BoundaryField,
}

impl ForceKind {
    /// Wire name of the force.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Area => "area",
            Self::Perimeter => "perimeter",
            Self::BoundaryField => "boundary_field",
        }
    }
}

/// A physics engine as seen by the adapter.
///
/// Implementations own all of their state. `initialize` replaces any mesh,
/// forces and integrator from an earlier call.
pub trait PhysicsEngine {
    /// Load a mesh described by a [`MeshDescription`] JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError`] if the mesh is malformed or requests an
    /// unsupported feature.
    fn initialize(&mut self, mesh: &Value) -> Result<(), PhysicsError>;

    /// Register (or replace) one force term.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::Malformed`] if `params` has the wrong shape.
    fn register_force(&mut self, kind: ForceKind, params: &Value) -> Result<(), PhysicsError>;

    /// Register (or replace) the integrator.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::Malformed`] if `params` has the wrong shape.
    fn register_integrator(
        &mut self,
        kind: IntegratorKind,
        params: &Value,
    ) -> Result<(), PhysicsError>;

    /// Advance exactly `n_steps` integration steps.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError`] if the engine is not ready or integration fails.
    fn advance(&mut self, n_steps: u64) -> Result<(), PhysicsError>;

    /// Export the current mesh, plus any engine-specific extras.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError`] if the export cannot be produced.
    fn export_state(&self) -> Result<Value, PhysicsError>;
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Mesh document exchanged with an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshDescription {
    /// Engine step counter.
    #[serde(default)]
    pub step: u64,
    /// Whether the engine should perform T1 transitions.
    #[serde(default)]
    pub topological_changes: bool,
    /// Vertices in order.
    pub vertices: Vec<Vertex>,
    /// Cells in order.
    pub cells: Vec<MeshCell>,
}

/// A cell as the engine sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshCell {
    /// Cell id.
    pub id: CellId,
    /// Counter-clockwise boundary.
    pub vertex_ids: Vec<VertexId>,
    /// Type tag.
    #[serde(rename = "type")]
    pub cell_type: CellType,
}

/// Area-force parameters for one cell type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaParams {
    /// Area stiffness.
    pub kappa: f64,
    /// Target area.
    #[serde(rename = "A0")]
    pub a0: f64,
}

/// Perimeter-force parameters for one cell type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerimeterParams {
    /// Perimeter stiffness.
    pub gamma: f64,
    /// Line tension.
    pub lambda: f64,
}

/// Integrator parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegratorParams {
    /// Time step.
    pub dt: f64,
    /// Friction coefficient; velocity is force over friction.
    pub friction: f64,
    /// Noise temperature (Brownian only).
    #[serde(default)]
    pub temperature: f64,
    /// Noise seed (Brownian only).
    #[serde(default)]
    pub seed: u64,
}

fn decode<T: serde::de::DeserializeOwned>(
    what: &'static str,
    value: &Value,
) -> Result<T, PhysicsError> {
    T::deserialize(value).map_err(|source| PhysicsError::Malformed { what, source })
}

// ---------------------------------------------------------------------------
// Reference engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct EngineCell {
    id: CellId,
    ring: Vec<usize>,
    cell_type: CellType,
}

/// Deterministic single-threaded vertex-model engine.
#[derive(Debug, Clone, Default)]
pub struct ReferenceEngine {
    step: u64,
    vertex_ids: Vec<VertexId>,
    positions: Vec<Vec2>,
    cells: Vec<EngineCell>,
    loaded: bool,
    area: Option<BTreeMap<CellType, AreaParams>>,
    perimeter: Option<BTreeMap<CellType, PerimeterParams>>,
    fields: Vec<ForcingField>,
    integrator: Option<(IntegratorKind, IntegratorParams)>,
}

impl ReferenceEngine {
    /// Create an engine with no mesh loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current step counter.
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Total area and perimeter energy of the current mesh.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::MissingParams`] if a registered force lacks
    /// an entry for some cell's type.
    pub fn energy(&self) -> Result<f64, PhysicsError> {
        let mut total = 0.0;
        for cell in &self.cells {
            let (signed_area, perimeter) = shape(&self.positions, &cell.ring);
            if let Some(p) = self.area_params(cell)? {
                let excess = signed_area.abs() - p.a0;
                total += 0.5 * p.kappa * excess * excess;
            }
            if let Some(p) = self.perimeter_params(cell)? {
                total += (0.5 * p.gamma).mul_add(perimeter * perimeter, -p.lambda * perimeter);
            }
        }
        Ok(total)
    }

    fn area_params(&self, cell: &EngineCell) -> Result<Option<AreaParams>, PhysicsError> {
        self.area
            .as_ref()
            .map(|table| {
                table.get(&cell.cell_type).copied().ok_or_else(|| PhysicsError::MissingParams {
                    force: ForceKind::Area.as_str(),
                    cell_type: cell.cell_type.clone(),
                })
            })
            .transpose()
    }

    fn perimeter_params(&self, cell: &EngineCell) -> Result<Option<PerimeterParams>, PhysicsError> {
        self.perimeter
            .as_ref()
            .map(|table| {
                table.get(&cell.cell_type).copied().ok_or_else(|| PhysicsError::MissingParams {
                    force: ForceKind::Perimeter.as_str(),
                    cell_type: cell.cell_type.clone(),
                })
            })
            .transpose()
    }

    /// Total force on every vertex for the given positions.
    fn forces(&self, positions: &[Vec2]) -> Result<Vec<Vec2>, PhysicsError> {
        let mut forces = vec![Vec2::default(); positions.len()];

        for cell in &self.cells {
            let area_params = self.area_params(cell)?;
            let perimeter_params = self.perimeter_params(cell)?;
            if area_params.is_none() && perimeter_params.is_none() {
                continue;
            }
            let (signed_area, perimeter) = shape(positions, &cell.ring);
            // The gradient below is for counter-clockwise rings; a clockwise
            // ring flips its sign.
            let winding = if signed_area < 0.0 { -1.0 } else { 1.0 };
            // -dE/dA and -dE/dP for this cell.
            let area_pressure = area_params
                .map_or(0.0, |p| -winding * p.kappa * (signed_area.abs() - p.a0));
            let tension = perimeter_params.map_or(0.0, |p| p.gamma.mul_add(-perimeter, p.lambda));

            let n = cell.ring.len();
            for k in 0..n {
                let (Some(&prev), Some(&here), Some(&next)) = (
                    cell.ring.get((k + n - 1) % n),
                    cell.ring.get(k),
                    cell.ring.get((k + 1) % n),
                ) else {
                    continue;
                };
                let (Some(&rp), Some(&r), Some(&rn)) =
                    (positions.get(prev), positions.get(here), positions.get(next))
                else {
                    continue;
                };

                // d(signed A)/dr.
                let da = Vec2::new(0.5 * (rn.y - rp.y), 0.5 * (rp.x - rn.x));
                let dp = add(unit(sub(r, rp)), unit(sub(r, rn)));

                if let Some(f) = forces.get_mut(here) {
                    f.x += area_pressure.mul_add(da.x, tension * dp.x);
                    f.y += area_pressure.mul_add(da.y, tension * dp.y);
                }
            }
        }

        for field in &self.fields {
            for (f, r) in forces.iter_mut().zip(positions) {
                if field.region.contains(*r) {
                    f.x += field.force.x;
                    f.y += field.force.y;
                }
            }
        }
        Ok(forces)
    }

    fn one_step(&mut self, kind: IntegratorKind, params: IntegratorParams) -> Result<(), PhysicsError> {
        let mobility = 1.0 / params.friction;
        let dt = params.dt;

        let next = match kind {
            IntegratorKind::Euler => {
                let f = self.forces(&self.positions)?;
                displaced(&self.positions, &f, dt * mobility)
            }
            IntegratorKind::Brownian => {
                let f = self.forces(&self.positions)?;
                let mut next = displaced(&self.positions, &f, dt * mobility);
                if params.temperature > 0.0 {
                    let amplitude = (2.0 * params.temperature * dt * mobility).sqrt();
                    let mut rng = StdRng::seed_from_u64(step_seed(params.seed, self.step));
                    for r in &mut next {
                        let (gx, gy) = gaussian_pair(&mut rng);
                        r.x += amplitude * gx;
                        r.y += amplitude * gy;
                    }
                }
                next
            }
            IntegratorKind::RungeKutta => {
                let h = dt * mobility;
                let k1 = self.forces(&self.positions)?;
                let k2 = self.forces(&displaced(&self.positions, &k1, 0.5 * h))?;
                let k3 = self.forces(&displaced(&self.positions, &k2, 0.5 * h))?;
                let k4 = self.forces(&displaced(&self.positions, &k3, h))?;
                self.positions
                    .iter()
                    .zip(k1.iter().zip(&k2))
                    .zip(k3.iter().zip(&k4))
                    .map(|((r, (a, b)), (c, d))| {
                        Vec2::new(
                            r.x + h / 6.0 * 2.0f64.mul_add(b.x + c.x, a.x + d.x),
                            r.y + h / 6.0 * 2.0f64.mul_add(b.y + c.y, a.y + d.y),
                        )
                    })
                    .collect()
            }
        };

        if next.iter().any(|r| !r.is_finite()) {
            return Err(PhysicsError::Diverged { step: self.step });
        }
        self.positions = next;
        self.step = self.step.saturating_add(1);
        Ok(())
    }
}

impl PhysicsEngine for ReferenceEngine {
    fn initialize(&mut self, mesh: &Value) -> Result<(), PhysicsError> {
        let mesh: MeshDescription = decode("mesh", mesh)?;
        if mesh.topological_changes {
            return Err(PhysicsError::Unsupported {
                feature: "topological_changes",
            });
        }

        let mut index = BTreeMap::new();
        for (i, vertex) in mesh.vertices.iter().enumerate() {
            if index.insert(vertex.id, i).is_some() {
                return Err(PhysicsError::InvalidMesh {
                    reason: format!("duplicate vertex {}", vertex.id),
                });
            }
        }
        let mut cells = Vec::with_capacity(mesh.cells.len());
        for cell in mesh.cells {
            if cell.vertex_ids.len() < 3 {
                return Err(PhysicsError::InvalidMesh {
                    reason: format!("cell {} has fewer than 3 vertices", cell.id),
                });
            }
            let ring = cell
                .vertex_ids
                .iter()
                .map(|v| {
                    index.get(v).copied().ok_or_else(|| PhysicsError::InvalidMesh {
                        reason: format!("cell {} references unknown vertex {v}", cell.id),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            cells.push(EngineCell {
                id: cell.id,
                ring,
                cell_type: cell.cell_type,
            });
        }

        *self = Self {
            step: mesh.step,
            vertex_ids: mesh.vertices.iter().map(|v| v.id).collect(),
            positions: mesh.vertices.iter().map(|v| v.position).collect(),
            cells,
            loaded: true,
            ..Self::default()
        };
        debug!(
            step = self.step,
            vertices = self.positions.len(),
            cells = self.cells.len(),
            "Mesh loaded"
        );
        Ok(())
    }

    fn register_force(&mut self, kind: ForceKind, params: &Value) -> Result<(), PhysicsError> {
        match kind {
            ForceKind::Area => self.area = Some(decode("area force params", params)?),
            ForceKind::Perimeter => {
                self.perimeter = Some(decode("perimeter force params", params)?);
            }
            ForceKind::BoundaryField => {
                self.fields = decode("boundary field params", params)?;
            }
        }
        debug!(force = kind.as_str(), "Force registered");
        Ok(())
    }

    fn register_integrator(
        &mut self,
        kind: IntegratorKind,
        params: &Value,
    ) -> Result<(), PhysicsError> {
        let params: IntegratorParams = decode("integrator params", params)?;
        self.integrator = Some((kind, params));
        debug!(
            integrator = kind.as_str(),
            dt = params.dt,
            friction = params.friction,
            "Integrator registered"
        );
        Ok(())
    }

    fn advance(&mut self, n_steps: u64) -> Result<(), PhysicsError> {
        if !self.loaded {
            return Err(PhysicsError::NotReady { missing: "mesh" });
        }
        let (kind, params) = self
            .integrator
            .ok_or(PhysicsError::NotReady { missing: "integrator" })?;
        for _ in 0..n_steps {
            self.one_step(kind, params)?;
        }
        Ok(())
    }

    fn export_state(&self) -> Result<Value, PhysicsError> {
        let vertices = self
            .vertex_ids
            .iter()
            .zip(&self.positions)
            .map(|(&id, &position)| Vertex { id, position })
            .collect();
        let cells = self
            .cells
            .iter()
            .map(|c| MeshCell {
                id: c.id,
                vertex_ids: c
                    .ring
                    .iter()
                    .filter_map(|&i| self.vertex_ids.get(i).copied())
                    .collect(),
                cell_type: c.cell_type.clone(),
            })
            .collect();
        let mesh = MeshDescription {
            step: self.step,
            topological_changes: false,
            vertices,
            cells,
        };

        let mut value = serde_json::to_value(&mesh)
            .map_err(|source| PhysicsError::Malformed { what: "export", source })?;
        if let Value::Object(map) = &mut value {
            map.insert(String::from("energy"), Value::from(self.energy()?));
        }
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Small vector helpers
// ---------------------------------------------------------------------------

const fn sub(a: Vec2, b: Vec2) -> Vec2 {
    Vec2::new(a.x - b.x, a.y - b.y)
}

const fn add(a: Vec2, b: Vec2) -> Vec2 {
    Vec2::new(a.x + b.x, a.y + b.y)
}

fn unit(v: Vec2) -> Vec2 {
    let len = v.x.hypot(v.y);
    if len > 0.0 {
        Vec2::new(v.x / len, v.y / len)
    } else {
        Vec2::default()
    }
}

/// Signed area and perimeter of the polygon `ring` indexes into `positions`.
fn shape(positions: &[Vec2], ring: &[usize]) -> (f64, f64) {
    let points: Vec<Vec2> = ring.iter().filter_map(|&i| positions.get(i).copied()).collect();
    (
        vertexsim_tissue::geometry::signed_area(&points),
        vertexsim_tissue::geometry::perimeter(&points),
    )
}

fn displaced(positions: &[Vec2], velocity: &[Vec2], scale: f64) -> Vec<Vec2> {
    positions
        .iter()
        .zip(velocity)
        .map(|(r, v)| Vec2::new(scale.mul_add(v.x, r.x), scale.mul_add(v.y, r.y)))
        .collect()
}

/// Per-step noise seed, so a trajectory does not depend on how steps are
/// grouped into `advance` calls.
const fn step_seed(seed: u64, step: u64) -> u64 {
    seed ^ step.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Two independent standard normal samples (Box-Muller).
fn gaussian_pair(rng: &mut impl Rng) -> (f64, f64) {
    // random() is in [0, 1); shift to (0, 1] so ln never sees zero.
    let u1 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    let radius = (-2.0 * u1.ln()).sqrt();
    let angle = std::f64::consts::TAU * u2;
    (radius * angle.cos(), radius * angle.sin())
}
