//! Translation between [`VertexModelState`] and a [`PhysicsEngine`].
//!
//! The adapter owns its engine exclusively. It turns a validated state into
//! the engine's mesh, force and integrator payloads, and turns the engine's
//! export back into a state. Sections the engine does not know about (cell
//! type parameters, environment, integrator settings) are remembered from
//! the last state loaded and carried into every snapshot.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;
use vertexsim_types::{
    Cell, CellType, CellTypeParams, Environment, IntegratorSettings, StateError, VertexModelState,
};

use crate::physics::{
    AreaParams, ForceKind, IntegratorParams, MeshCell, MeshDescription, PerimeterParams,
    PhysicsEngine, PhysicsError,
};

/// Keys of an engine export that belong to the mesh itself.
const MESH_KEYS: [&str; 4] = ["step", "topological_changes", "vertices", "cells"];

/// Errors raised by the [`EngineAdapter`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The state cannot be handed to the engine.
    #[error("cannot initialize engine from invalid state: {source}")]
    Init {
        /// The validation failure.
        source: StateError,
    },

    /// `advance` or a configure call came before the engine was ready.
    #[error("engine not configured: no {missing}")]
    NotConfigured {
        /// What is missing.
        missing: &'static str,
    },

    /// The engine itself failed.
    #[error("physics engine error: {source}")]
    Physics {
        /// The engine's error.
        #[from]
        source: PhysicsError,
    },

    /// A payload for the engine could not be encoded.
    #[error("failed to encode engine payload: {source}")]
    Encode {
        /// The encode error.
        #[from]
        source: serde_json::Error,
    },

    /// The engine export does not translate into a valid state.
    #[error("engine export is not a valid state: {source}")]
    Snapshot {
        /// The decode or validation failure.
        source: StateError,
    },
}

/// Exclusive owner of a physics engine, speaking [`VertexModelState`].
#[derive(Debug)]
pub struct EngineAdapter<E> {
    engine: E,
    /// Last loaded state; supplies the sections the engine does not export.
    template: Option<VertexModelState>,
    forces_configured: bool,
    integrator_configured: bool,
}

impl<E: PhysicsEngine> EngineAdapter<E> {
    /// Wrap an engine. Nothing is loaded yet.
    pub const fn new(engine: E) -> Self {
        Self {
            engine,
            template: None,
            forces_configured: false,
            integrator_configured: false,
        }
    }

    /// Borrow the wrapped engine.
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Whether mesh, forces and integrator are all in place.
    pub const fn is_configured(&self) -> bool {
        self.template.is_some() && self.forces_configured && self.integrator_configured
    }

    /// Load `state` into the engine: mesh, every force, and the integrator
    /// with exactly the supplied `dt` and friction.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Init`] if `state` fails validation, or
    /// [`EngineError::Physics`] if the engine rejects a payload.
    pub fn initialize_from_state(&mut self, state: &VertexModelState) -> Result<(), EngineError> {
        state
            .validate()
            .map_err(|source| EngineError::Init { source })?;

        let mesh = MeshDescription {
            step: state.step,
            topological_changes: state.simulation_settings.topological_changes,
            vertices: state.vertices.clone(),
            cells: state
                .cells
                .iter()
                .map(|c| MeshCell {
                    id: c.id,
                    vertex_ids: c.vertex_ids.clone(),
                    cell_type: c.cell_type.clone(),
                })
                .collect(),
        };
        self.forces_configured = false;
        self.integrator_configured = false;
        self.template = None;
        self.engine.initialize(&serde_json::to_value(&mesh)?)?;
        self.template = Some(state.clone());

        self.configure_forces(&state.cell_type_params, state.environment.as_ref())?;
        self.configure_integrator(&state.integrator_settings)?;

        debug!(
            step = state.step,
            vertices = state.vertices.len(),
            cells = state.cells.len(),
            "Engine initialized from state"
        );
        Ok(())
    }

    /// Register area, perimeter and boundary-field forces. Calling this
    /// again replaces the previous registration.
    ///
    /// Nothing is registered unless every parameter is in range and every
    /// loaded cell's type has an entry.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotConfigured`] before a mesh is loaded,
    /// [`EngineError::Init`] if the parameters are invalid or incomplete, or
    /// [`EngineError::Physics`] if the engine rejects a payload.
    pub fn configure_forces(
        &mut self,
        params: &BTreeMap<CellType, CellTypeParams>,
        environment: Option<&Environment>,
    ) -> Result<(), EngineError> {
        let Some(template) = &self.template else {
            return Err(EngineError::NotConfigured { missing: "mesh" });
        };
        let mut candidate = template.clone();
        candidate.cell_type_params.clone_from(params);
        candidate.environment = environment.cloned();
        candidate
            .validate()
            .map_err(|source| EngineError::Init { source })?;

        let area: BTreeMap<&CellType, AreaParams> = params
            .iter()
            .map(|(t, p)| (t, AreaParams { kappa: p.kappa, a0: p.a0 }))
            .collect();
        let perimeter: BTreeMap<&CellType, PerimeterParams> = params
            .iter()
            .map(|(t, p)| (t, PerimeterParams { gamma: p.gamma, lambda: p.lambda() }))
            .collect();
        let fields = environment.map_or_else(Vec::new, |env| env.fields.clone());

        self.engine
            .register_force(ForceKind::Area, &serde_json::to_value(&area)?)?;
        self.engine
            .register_force(ForceKind::Perimeter, &serde_json::to_value(&perimeter)?)?;
        self.engine
            .register_force(ForceKind::BoundaryField, &serde_json::to_value(&fields)?)?;

        if let Some(template) = &mut self.template {
            template.cell_type_params.clone_from(params);
            template.environment = environment.cloned();
        }
        self.forces_configured = true;
        Ok(())
    }

    /// Register the integrator. Calling this again replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotConfigured`] before a mesh is loaded,
    /// [`EngineError::Init`] if `settings` is out of range, or
    /// [`EngineError::Physics`] if the engine rejects the payload.
    pub fn configure_integrator(&mut self, settings: &IntegratorSettings) -> Result<(), EngineError> {
        if self.template.is_none() {
            return Err(EngineError::NotConfigured { missing: "mesh" });
        }
        settings
            .validate()
            .map_err(|source| EngineError::Init { source })?;
        let params = IntegratorParams {
            dt: settings.dt,
            friction: settings.friction,
            temperature: settings.temperature,
            seed: settings.seed,
        };
        self.engine
            .register_integrator(settings.kind, &serde_json::to_value(params)?)?;

        if let Some(template) = &mut self.template {
            template.integrator_settings = *settings;
        }
        self.integrator_configured = true;
        Ok(())
    }

    /// Run exactly `n_steps` engine steps. Blocks until done.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotConfigured`] if mesh, forces or integrator
    /// are missing, or [`EngineError::Physics`] if the engine fails.
    pub fn advance(&mut self, n_steps: u64) -> Result<(), EngineError> {
        if self.template.is_none() {
            return Err(EngineError::NotConfigured { missing: "mesh" });
        }
        if !self.forces_configured {
            return Err(EngineError::NotConfigured { missing: "forces" });
        }
        if !self.integrator_configured {
            return Err(EngineError::NotConfigured { missing: "integrator" });
        }
        self.engine.advance(n_steps)?;
        debug!(n_steps, "Engine advanced");
        Ok(())
    }

    /// The engine's current mesh as a state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotConfigured`] before a mesh is loaded,
    /// [`EngineError::Physics`] if the export fails, or
    /// [`EngineError::Snapshot`] if it does not translate to a valid state.
    pub fn snapshot_state(&self) -> Result<VertexModelState, EngineError> {
        self.export().map(|(state, _)| state)
    }

    /// The engine's current mesh as a state document, with any extra keys
    /// the engine exported (such as `energy`) added at the top level.
    ///
    /// # Errors
    ///
    /// Same as [`snapshot_state`](Self::snapshot_state).
    pub fn snapshot(&self) -> Result<Value, EngineError> {
        let (state, extras) = self.export()?;
        let mut value = state
            .to_json()
            .map_err(|source| EngineError::Snapshot { source })?;
        if let Value::Object(map) = &mut value {
            for (key, extra) in extras {
                map.entry(key).or_insert(extra);
            }
        }
        Ok(value)
    }

    fn export(&self) -> Result<(VertexModelState, BTreeMap<String, Value>), EngineError> {
        let template = self
            .template
            .as_ref()
            .ok_or(EngineError::NotConfigured { missing: "mesh" })?;
        let mut export = self.engine.export_state()?;

        let mut extras = BTreeMap::new();
        if let Value::Object(map) = &mut export {
            let extra_keys: Vec<String> = map
                .keys()
                .filter(|k| !MESH_KEYS.contains(&k.as_str()))
                .cloned()
                .collect();
            for key in extra_keys {
                if let Some(value) = map.remove(&key) {
                    extras.insert(key, value);
                }
            }
        }

        let mesh: MeshDescription = serde_json::from_value(export)
            .map_err(|e| EngineError::Snapshot { source: StateError::from(e) })?;
        let state = VertexModelState {
            step: mesh.step,
            vertices: mesh.vertices,
            cells: mesh
                .cells
                .into_iter()
                .map(|c| Cell {
                    id: c.id,
                    vertex_ids: c.vertex_ids,
                    cell_type: c.cell_type,
                })
                .collect(),
            ..template.clone()
        };
        state
            .validate_structure()
            .map_err(|source| EngineError::Snapshot { source })?;
        Ok((state, extras))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;
    use vertexsim_tissue::{LatticeSpec, build_lattice};
    use vertexsim_types::{IntegratorKind, SimulationSettings, Vec2};

    use super::*;
    use crate::physics::ReferenceEngine;

    /// Records every call and echoes the loaded mesh back on export.
    #[derive(Debug, Default)]
    struct RecordingEngine {
        calls: Vec<String>,
        mesh: Option<Value>,
        integrator: Option<(IntegratorKind, Value)>,
        forces: BTreeMap<ForceKind, Value>,
        steps: u64,
    }

    impl PhysicsEngine for RecordingEngine {
        fn initialize(&mut self, mesh: &Value) -> Result<(), PhysicsError> {
            self.calls.push(String::from("initialize"));
            self.mesh = Some(mesh.clone());
            Ok(())
        }

        fn register_force(&mut self, kind: ForceKind, params: &Value) -> Result<(), PhysicsError> {
            self.calls.push(format!("force:{}", kind.as_str()));
            self.forces.insert(kind, params.clone());
            Ok(())
        }

        fn register_integrator(
            &mut self,
            kind: IntegratorKind,
            params: &Value,
        ) -> Result<(), PhysicsError> {
            self.calls.push(format!("integrator:{}", kind.as_str()));
            self.integrator = Some((kind, params.clone()));
            Ok(())
        }

        fn advance(&mut self, n_steps: u64) -> Result<(), PhysicsError> {
            self.calls.push(format!("advance:{n_steps}"));
            self.steps += n_steps;
            Ok(())
        }

        fn export_state(&self) -> Result<Value, PhysicsError> {
            let mut mesh = self.mesh.clone().unwrap_or(Value::Null);
            mesh["step"] = json!(self.steps);
            mesh["energy"] = json!(1.5);
            Ok(mesh)
        }
    }

    fn lattice() -> VertexModelState {
        build_lattice(&LatticeSpec {
            cells_x: 2,
            cells_y: 1,
            cell_type: CellType::default(),
            mechanics: CellTypeParams { kappa: 1.0, a0: 1.0, gamma: 0.16, p0: 0.3 },
            box_size: Vec2::new(15.0, 5.0),
            forcing: None,
            integrator: IntegratorSettings {
                kind: IntegratorKind::Euler,
                dt: 0.013,
                friction: 0.7,
                temperature: 0.0,
                seed: 3,
            },
            simulation: SimulationSettings::default(),
        })
        .unwrap()
    }

    #[test]
    fn supplied_integrator_parameters_reach_the_engine() {
        let mut adapter = EngineAdapter::new(RecordingEngine::default());
        adapter.initialize_from_state(&lattice()).unwrap();

        let (kind, params) = adapter.engine().integrator.clone().unwrap();
        assert_eq!(kind, IntegratorKind::Euler);
        assert_eq!(params["dt"], 0.013);
        assert_eq!(params["friction"], 0.7);
        assert_eq!(params["seed"], 3);
        assert_eq!(
            adapter.engine().calls,
            vec![
                "initialize",
                "force:area",
                "force:perimeter",
                "force:boundary_field",
                "integrator:euler",
            ]
        );
    }

    #[test]
    fn perimeter_payload_uses_derived_lambda() {
        let mut adapter = EngineAdapter::new(RecordingEngine::default());
        adapter.initialize_from_state(&lattice()).unwrap();
        let perimeter = &adapter.engine().forces[&ForceKind::Perimeter];
        let lambda = perimeter["default"]["lambda"].as_f64().unwrap();
        assert!((lambda - 0.3 * 0.16).abs() < 1e-15);
        assert_eq!(adapter.engine().forces[&ForceKind::BoundaryField], json!([]));
    }

    #[test]
    fn mesh_uses_type_key() {
        let mut adapter = EngineAdapter::new(RecordingEngine::default());
        adapter.initialize_from_state(&lattice()).unwrap();
        let mesh = adapter.engine().mesh.clone().unwrap();
        assert_eq!(mesh["cells"][1]["type"], "default");
        assert_eq!(mesh["cells"][1]["vertex_ids"], json!([1, 2, 5, 4]));
        assert_eq!(mesh["topological_changes"], false);
    }

    #[test]
    fn advance_before_initialize_is_refused() {
        let mut adapter = EngineAdapter::new(RecordingEngine::default());
        let err = adapter.advance(5).unwrap_err();
        assert!(matches!(err, EngineError::NotConfigured { missing: "mesh" }));
        assert!(adapter.engine().calls.is_empty());
    }

    #[test]
    fn invalid_state_is_an_init_error() {
        let mut state = lattice();
        state.integrator_settings.dt = -1.0;
        let mut adapter = EngineAdapter::new(RecordingEngine::default());
        let err = adapter.initialize_from_state(&state).unwrap_err();
        assert!(matches!(err, EngineError::Init { .. }));
        assert!(!adapter.is_configured());
    }

    #[test]
    fn snapshot_keeps_extras_and_unexported_sections() {
        let mut adapter = EngineAdapter::new(RecordingEngine::default());
        let state = lattice();
        adapter.initialize_from_state(&state).unwrap();
        adapter.advance(40).unwrap();

        let snapshot = adapter.snapshot().unwrap();
        assert_eq!(snapshot["energy"], 1.5);
        assert_eq!(snapshot["step"], 40);

        let back = adapter.snapshot_state().unwrap();
        assert_eq!(back.step, 40);
        assert_eq!(back.cell_type_params, state.cell_type_params);
        assert_eq!(back.integrator_settings, state.integrator_settings);
        assert_eq!(VertexModelState::from_json(&snapshot).unwrap(), back);
    }

    #[test]
    fn out_of_range_integrator_is_refused_before_registration() {
        let mut adapter = EngineAdapter::new(RecordingEngine::default());
        let state = lattice();
        adapter.initialize_from_state(&state).unwrap();
        let calls = adapter.engine().calls.len();

        let mut settings = state.integrator_settings;
        settings.dt = -0.5;
        let err = adapter.configure_integrator(&settings).unwrap_err();
        assert!(matches!(err, EngineError::Init { .. }));
        assert_eq!(adapter.engine().calls.len(), calls);

        let snapshot = adapter.snapshot_state().unwrap();
        assert_eq!(snapshot.integrator_settings, state.integrator_settings);
        snapshot.validate().unwrap();
    }

    #[test]
    fn incomplete_or_negative_force_params_are_refused() {
        let mut adapter = EngineAdapter::new(ReferenceEngine::new());
        let state = lattice();
        adapter.initialize_from_state(&state).unwrap();

        let mut other = BTreeMap::new();
        other.insert(
            CellType::new("other"),
            CellTypeParams { kappa: 1.0, a0: 1.0, gamma: 0.1, p0: 0.3 },
        );
        let err = adapter
            .configure_forces(&other, state.environment.as_ref())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Init { source: StateError::MissingCellType { .. } }
        ));

        let mut negative = state.cell_type_params.clone();
        if let Some(p) = negative.get_mut(&CellType::default()) {
            p.kappa = -3.0;
        }
        let err = adapter
            .configure_forces(&negative, state.environment.as_ref())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Init { source: StateError::InvalidParameter { .. } }
        ));

        // The earlier registration is still in force.
        adapter.advance(1).unwrap();
        let snapshot = adapter.snapshot_state().unwrap();
        assert_eq!(snapshot.cell_type_params, state.cell_type_params);
        snapshot.validate().unwrap();
    }

    #[test]
    fn reconfiguring_integrator_is_idempotent() {
        let mut adapter = EngineAdapter::new(ReferenceEngine::new());
        let state = lattice();
        adapter.initialize_from_state(&state).unwrap();
        adapter.configure_integrator(&state.integrator_settings).unwrap();
        adapter.configure_integrator(&state.integrator_settings).unwrap();
        adapter.advance(3).unwrap();
        assert_eq!(adapter.engine().step(), 3);
        assert_eq!(adapter.snapshot_state().unwrap().integrator_settings, state.integrator_settings);
    }
}
