//! The checkpointed simulation loop.
//!
//! [`SimulationDriver`] owns an [`EngineAdapter`] and a [`CheckpointStore`]
//! and moves through a small state machine:
//!
//! ```text
//! Uninitialized --configure--> Configured --run_cycle--> Running --...--> Done
//!        \                          \                        \
//!         `------------------------- `---- fatal error ------ `--> Failed
//! ```
//!
//! Each cycle writes checkpoint `i` from the engine's current state and only
//! then advances the engine by `step_size` steps, so checkpoint 0 is always
//! the configured initial state. Change requests may be applied between
//! cycles; the driver keeps the last known state and re-initializes the
//! engine from every successfully edited state.
//!
//! The driver is the only component that decides whether an error ends the
//! run. An inapplicable request is reported to the caller without touching
//! the driver; everything else moves it to [`DriverPhase::Failed`], after
//! which no engine call is made again.

use tracing::{debug, error, info, warn};
use vertexsim_tissue::{ApplyError, apply, geometry};
use vertexsim_types::{ModelChangeRequest, VertexModelState};

use crate::adapter::{EngineAdapter, EngineError};
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::physics::PhysicsEngine;
use crate::requests::ChangeRequestSource;

/// Where the driver is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    /// No state loaded yet.
    Uninitialized,
    /// State loaded, no checkpoint written.
    Configured,
    /// At least one checkpoint written, more to go.
    Running,
    /// Every checkpoint written.
    Done,
    /// A fatal error occurred. Terminal.
    Failed,
}

impl DriverPhase {
    /// Whether no further progress is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for DriverPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Errors raised by the [`SimulationDriver`].
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The engine adapter failed. Fatal.
    #[error("engine error: {source}")]
    Engine {
        /// The adapter's error.
        #[from]
        source: EngineError,
    },

    /// A change request failed. Fatal unless the error is recoverable and
    /// the caller handles it.
    #[error("change request failed: {source}")]
    Request {
        /// The applicator's error.
        #[from]
        source: ApplyError,
    },

    /// A checkpoint could not be persisted. Fatal.
    #[error("checkpoint error: {source}")]
    Checkpoint {
        /// The store's error.
        #[from]
        source: CheckpointError,
    },

    /// The operation is not allowed in the current phase.
    #[error("cannot {operation} while {phase}")]
    InvalidPhase {
        /// What was attempted.
        operation: &'static str,
        /// The phase the driver was in.
        phase: DriverPhase,
    },
}

impl DriverError {
    /// Whether the driver is still usable after this error. A call refused
    /// in a terminal phase is not: nothing can move the driver on.
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Request { source } => source.is_recoverable(),
            Self::InvalidPhase { phase, .. } => !phase.is_terminal(),
            Self::Engine { .. } | Self::Checkpoint { .. } => false,
        }
    }
}

/// How many checkpoints to write and how far apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointSchedule {
    /// Number of checkpoints.
    pub checkpoints: u64,
    /// Engine steps between consecutive checkpoints.
    pub step_size: u64,
}

/// What a run accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Checkpoints persisted.
    pub checkpoints_written: u64,
    /// Engine steps advanced by this driver.
    pub total_steps: u64,
    /// Change requests applied successfully.
    pub requests_applied: u64,
}

/// Orchestrates engine, applicator and checkpoint store for one run.
#[derive(Debug)]
pub struct SimulationDriver<E, S> {
    adapter: EngineAdapter<E>,
    store: S,
    schedule: CheckpointSchedule,
    phase: DriverPhase,
    state: Option<VertexModelState>,
    next_checkpoint: u64,
    total_steps: u64,
    requests_applied: u64,
}

impl<E: PhysicsEngine, S: CheckpointStore> SimulationDriver<E, S> {
    /// Create a driver. Nothing happens until [`configure`](Self::configure).
    pub const fn new(engine: E, store: S, schedule: CheckpointSchedule) -> Self {
        Self {
            adapter: EngineAdapter::new(engine),
            store,
            schedule,
            phase: DriverPhase::Uninitialized,
            state: None,
            next_checkpoint: 0,
            total_steps: 0,
            requests_applied: 0,
        }
    }

    /// Current lifecycle phase.
    pub const fn phase(&self) -> DriverPhase {
        self.phase
    }

    /// The last known state: the configured state, the latest edit, or the
    /// engine's state after the latest advance.
    pub const fn state(&self) -> Option<&VertexModelState> {
        self.state.as_ref()
    }

    /// Index of the next checkpoint to write.
    pub const fn next_checkpoint(&self) -> u64 {
        self.next_checkpoint
    }

    /// The checkpoint cadence.
    pub const fn schedule(&self) -> CheckpointSchedule {
        self.schedule
    }

    /// The checkpoint store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The engine adapter.
    pub const fn adapter(&self) -> &EngineAdapter<E> {
        &self.adapter
    }

    /// Progress so far.
    pub const fn summary(&self) -> RunSummary {
        RunSummary {
            checkpoints_written: self.next_checkpoint,
            total_steps: self.total_steps,
            requests_applied: self.requests_applied,
        }
    }

    /// Load `state` into the engine after clearing the checkpoint store.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidPhase`] unless uninitialized; a store
    /// or engine failure moves the driver to [`DriverPhase::Failed`].
    pub fn configure(&mut self, state: &VertexModelState) -> Result<(), DriverError> {
        self.require("configure", &[DriverPhase::Uninitialized])?;

        let result = self.load(state);
        self.fatal_on_err(result)?;

        self.phase = if self.schedule.checkpoints == 0 {
            DriverPhase::Done
        } else {
            DriverPhase::Configured
        };
        info!(
            vertices = state.vertices.len(),
            cells = state.cells.len(),
            checkpoints = self.schedule.checkpoints,
            step_size = self.schedule.step_size,
            "Driver configured"
        );
        Ok(())
    }

    fn load(&mut self, state: &VertexModelState) -> Result<(), DriverError> {
        self.store.clear()?;
        self.adapter.initialize_from_state(state)?;
        self.state = Some(state.clone());
        Ok(())
    }

    /// Write the next checkpoint, then advance the engine by `step_size`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidPhase`] unless configured or running;
    /// any engine or store failure moves the driver to
    /// [`DriverPhase::Failed`].
    pub fn run_cycle(&mut self) -> Result<(), DriverError> {
        self.require("run a cycle", &[DriverPhase::Configured, DriverPhase::Running])?;
        self.phase = DriverPhase::Running;

        let result = self.cycle();
        self.fatal_on_err(result)?;

        if self.next_checkpoint >= self.schedule.checkpoints {
            self.phase = DriverPhase::Done;
            info!(
                checkpoints = self.next_checkpoint,
                total_steps = self.total_steps,
                "All checkpoints written"
            );
        }
        Ok(())
    }

    fn cycle(&mut self) -> Result<(), DriverError> {
        let index = self.next_checkpoint;
        let snapshot = self.adapter.snapshot()?;
        let state = VertexModelState::from_json(&snapshot)
            .map_err(|source| EngineError::Snapshot { source })?;
        let step = state.step;
        log_shapes(index, &state);
        self.state = Some(state);

        self.store.write(index, &snapshot)?;
        self.next_checkpoint = index.saturating_add(1);
        info!(
            checkpoint = index,
            step,
            energy = snapshot.get("energy").and_then(serde_json::Value::as_f64),
            "Checkpoint written"
        );

        self.adapter.advance(self.schedule.step_size)?;
        self.total_steps = self.total_steps.saturating_add(self.schedule.step_size);
        self.state = Some(self.adapter.snapshot_state()?);
        Ok(())
    }

    /// Apply one change request to the last known state and push the result
    /// into the engine.
    ///
    /// An inapplicable request is logged and returned; the cached state and
    /// the phase are left exactly as they were, so the caller may retry.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidPhase`] unless configured or running,
    /// or [`DriverError::Request`] if the request fails. Invariant
    /// violations and engine failures move the driver to
    /// [`DriverPhase::Failed`].
    pub fn process_change_request(&mut self, request: &ModelChangeRequest) -> Result<(), DriverError> {
        self.require(
            "apply a change request",
            &[DriverPhase::Configured, DriverPhase::Running],
        )?;
        let Some(current) = &self.state else {
            return Err(DriverError::InvalidPhase {
                operation: "apply a change request",
                phase: self.phase,
            });
        };

        let next = match apply(current, request) {
            Ok(next) => next,
            Err(e) if e.is_recoverable() => {
                warn!(
                    kind = request.kind(),
                    request = ?request,
                    reason = %e,
                    "Change request rejected"
                );
                return Err(DriverError::Request { source: e });
            }
            Err(e) => return Err(self.fail(DriverError::Request { source: e })),
        };

        let result = self
            .adapter
            .initialize_from_state(&next)
            .map_err(DriverError::from);
        self.fatal_on_err(result)?;

        self.state = Some(next);
        self.requests_applied = self.requests_applied.saturating_add(1);
        info!(
            kind = request.kind(),
            before_checkpoint = self.next_checkpoint,
            "Change request applied"
        );
        Ok(())
    }

    /// Run every remaining cycle, consulting `requests` before each
    /// checkpoint after the first.
    ///
    /// Within a run a rejected request is fatal: the driver moves to
    /// [`DriverPhase::Failed`] and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn run(&mut self, requests: &mut dyn ChangeRequestSource) -> Result<RunSummary, DriverError> {
        if self.phase == DriverPhase::Done {
            self.report_unused(requests);
            return Ok(self.summary());
        }
        self.require("run", &[DriverPhase::Configured, DriverPhase::Running])?;
        info!(
            from_checkpoint = self.next_checkpoint,
            checkpoints = self.schedule.checkpoints,
            "Simulation starting"
        );

        while !self.phase.is_terminal() {
            let index = self.next_checkpoint;
            if index > 0 {
                for request in requests.requests_before(index) {
                    if let Err(e) = self.process_change_request(&request) {
                        return Err(self.fail(e));
                    }
                }
            }
            self.run_cycle()?;
        }

        self.report_unused(requests);

        let summary = self.summary();
        info!(
            checkpoints_written = summary.checkpoints_written,
            total_steps = summary.total_steps,
            requests_applied = summary.requests_applied,
            "Simulation finished"
        );
        Ok(summary)
    }

    fn report_unused(&self, requests: &dyn ChangeRequestSource) {
        let unused = requests.remaining();
        if unused > 0 {
            warn!(
                unused,
                checkpoints = self.schedule.checkpoints,
                "Change requests scheduled past the last checkpoint were not applied"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Phase bookkeeping
    // -----------------------------------------------------------------------

    fn require(&self, operation: &'static str, allowed: &[DriverPhase]) -> Result<(), DriverError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(DriverError::InvalidPhase {
                operation,
                phase: self.phase,
            })
        }
    }

    fn fatal_on_err(&mut self, result: Result<(), DriverError>) -> Result<(), DriverError> {
        result.map_err(|e| self.fail(e))
    }

    fn fail(&mut self, err: DriverError) -> DriverError {
        if self.phase != DriverPhase::Failed {
            error!(
                phase = %self.phase,
                checkpoint = self.next_checkpoint,
                error = %err,
                "Simulation failed"
            );
            self.phase = DriverPhase::Failed;
        }
        err
    }
}

/// Mean cell area and perimeter at a checkpoint.
fn log_shapes(checkpoint: u64, state: &VertexModelState) {
    let shapes = geometry::cell_shapes(state);
    if shapes.is_empty() {
        return;
    }
    let n = shapes.len() as f64;
    let mean_area = shapes.iter().map(|s| s.area).sum::<f64>() / n;
    let mean_perimeter = shapes.iter().map(|s| s.perimeter).sum::<f64>() / n;
    debug!(checkpoint, cells = shapes.len(), mean_area, mean_perimeter, "Cell shapes");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::Value;
    use vertexsim_tissue::{LatticeSpec, build_lattice};
    use vertexsim_types::{
        CellId, CellType, CellTypeParams, IntegratorKind, IntegratorSettings, SimulationSettings,
        Vec2, VertexId,
    };

    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::physics::ReferenceEngine;
    use crate::requests::{NoChangeRequests, ScheduledChangeRequests, ScheduledRequest};

    fn lattice() -> VertexModelState {
        build_lattice(&LatticeSpec {
            cells_x: 2,
            cells_y: 2,
            cell_type: CellType::default(),
            mechanics: CellTypeParams { kappa: 1.0, a0: 1.0, gamma: 0.16, p0: 0.3 },
            box_size: Vec2::new(15.0, 5.0),
            forcing: None,
            integrator: IntegratorSettings {
                kind: IntegratorKind::Euler,
                dt: 0.05,
                friction: 0.1,
                temperature: 0.0,
                seed: 0,
            },
            simulation: SimulationSettings::default(),
        })
        .unwrap()
    }

    fn driver(checkpoints: u64) -> SimulationDriver<ReferenceEngine, MemoryCheckpointStore> {
        SimulationDriver::new(
            ReferenceEngine::new(),
            MemoryCheckpointStore::new(),
            CheckpointSchedule { checkpoints, step_size: 5 },
        )
    }

    /// A store whose writes fail after `ok` successes.
    #[derive(Debug, Default)]
    struct FlakyStore {
        ok: u64,
        written: u64,
    }

    impl CheckpointStore for FlakyStore {
        fn write(&mut self, index: u64, _checkpoint: &Value) -> Result<(), CheckpointError> {
            if self.written >= self.ok {
                return Err(CheckpointError::Missing { index });
            }
            self.written += 1;
            Ok(())
        }

        fn list_existing(&self) -> Result<Vec<u64>, CheckpointError> {
            Ok((0..self.written).collect())
        }

        fn clear(&mut self) -> Result<(), CheckpointError> {
            self.written = 0;
            Ok(())
        }
    }

    #[test]
    fn phases_progress_to_done() {
        let mut driver = driver(2);
        assert_eq!(driver.phase(), DriverPhase::Uninitialized);
        driver.configure(&lattice()).unwrap();
        assert_eq!(driver.phase(), DriverPhase::Configured);
        driver.run_cycle().unwrap();
        assert_eq!(driver.phase(), DriverPhase::Running);
        driver.run_cycle().unwrap();
        assert_eq!(driver.phase(), DriverPhase::Done);

        let err = driver.run_cycle().unwrap_err();
        assert!(matches!(err, DriverError::InvalidPhase { phase: DriverPhase::Done, .. }));
        assert_eq!(driver.summary().total_steps, 10);
    }

    #[test]
    fn checkpoint_zero_is_the_configured_state() {
        let mut driver = driver(3);
        let initial = lattice();
        driver.configure(&initial).unwrap();
        driver.run(&mut NoChangeRequests::new()).unwrap();

        let first = VertexModelState::from_json(driver.store().get(0).unwrap()).unwrap();
        assert_eq!(first, initial);
        let steps: Vec<(u64, u64)> = driver
            .store()
            .iter()
            .map(|(index, checkpoint)| (index, checkpoint["step"].as_u64().unwrap()))
            .collect();
        assert_eq!(steps, vec![(0, 0), (1, 5), (2, 10)]);
        assert!(driver.adapter().is_configured());
    }

    #[test]
    fn run_before_configure_is_refused() {
        let mut driver = driver(1);
        let err = driver.run(&mut NoChangeRequests::new()).unwrap_err();
        assert!(matches!(
            err,
            DriverError::InvalidPhase { phase: DriverPhase::Uninitialized, .. }
        ));
        assert_eq!(driver.phase(), DriverPhase::Uninitialized);
    }

    #[test]
    fn invalid_initial_state_fails_the_driver() {
        let mut state = lattice();
        state.integrator_settings.friction = 0.0;
        let mut driver = driver(1);
        let err = driver.configure(&state).unwrap_err();
        assert!(matches!(err, DriverError::Engine { source: EngineError::Init { .. } }));
        assert_eq!(driver.phase(), DriverPhase::Failed);
        assert!(matches!(
            driver.run_cycle().unwrap_err(),
            DriverError::InvalidPhase { phase: DriverPhase::Failed, .. }
        ));
    }

    #[test]
    fn inapplicable_request_keeps_cache_and_phase() {
        let mut driver = driver(4);
        driver.configure(&lattice()).unwrap();
        driver.run_cycle().unwrap();
        let before = driver.state().cloned().unwrap();

        let err = driver
            .process_change_request(&ModelChangeRequest::RemoveCell { cell_id: CellId::new(99) })
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(err, DriverError::Request { source: ApplyError::Inapplicable { .. } }));
        assert_eq!(driver.state(), Some(&before));
        assert_eq!(driver.phase(), DriverPhase::Running);

        driver.run_cycle().unwrap();
        assert_eq!(driver.summary().checkpoints_written, 2);
    }

    #[test]
    fn applied_request_reaches_the_engine() {
        let mut driver = driver(2);
        driver.configure(&lattice()).unwrap();
        driver.run_cycle().unwrap();
        driver
            .process_change_request(&ModelChangeRequest::RemoveCell { cell_id: CellId::new(3) })
            .unwrap();
        assert_eq!(driver.state().unwrap().cells.len(), 3);

        driver.run_cycle().unwrap();
        let last = driver.store().get(1).unwrap();
        assert_eq!(last["cells"].as_array().unwrap().len(), 3);
        assert_eq!(last["vertices"].as_array().unwrap().len(), 8);
        assert_eq!(last["step"], 5);
        assert_eq!(driver.summary().requests_applied, 1);
    }

    #[test]
    fn scheduled_requests_run_before_their_checkpoint() {
        let mut driver = driver(3);
        driver.configure(&lattice()).unwrap();
        let mut schedule = ScheduledChangeRequests::new(vec![ScheduledRequest {
            before_checkpoint: 2,
            request: ModelChangeRequest::MoveVertex {
                vertex_id: VertexId::new(0),
                position: Vec2::new(6.0, 1.0),
            },
        }])
        .unwrap();
        let summary = driver.run(&mut schedule).unwrap();
        assert_eq!(summary.requests_applied, 1);

        let moved = &driver.store().get(2).unwrap()["vertices"][0]["position"];
        assert_eq!(moved[0], 6.0);
        assert_eq!(moved[1], 1.0);
    }

    #[test]
    fn rejected_scheduled_request_fails_the_run() {
        let mut driver = driver(3);
        driver.configure(&lattice()).unwrap();
        let mut schedule = ScheduledChangeRequests::new(vec![ScheduledRequest {
            before_checkpoint: 1,
            request: ModelChangeRequest::RemoveCell { cell_id: CellId::new(42) },
        }])
        .unwrap();
        let err = driver.run(&mut schedule).unwrap_err();
        assert!(matches!(err, DriverError::Request { .. }));
        assert_eq!(driver.phase(), DriverPhase::Failed);
        assert_eq!(driver.store().len(), 1);
    }

    #[test]
    fn checkpoint_failure_is_fatal() {
        let mut driver = SimulationDriver::new(
            ReferenceEngine::new(),
            FlakyStore { ok: 2, written: 0 },
            CheckpointSchedule { checkpoints: 5, step_size: 1 },
        );
        driver.configure(&lattice()).unwrap();
        let err = driver.run(&mut NoChangeRequests::new()).unwrap_err();
        assert!(matches!(err, DriverError::Checkpoint { .. }));
        assert_eq!(driver.phase(), DriverPhase::Failed);
        assert_eq!(driver.summary().checkpoints_written, 2);
        assert!(driver
            .process_change_request(&ModelChangeRequest::RemoveCell { cell_id: CellId::new(0) })
            .is_err());
        assert_eq!(driver.phase(), DriverPhase::Failed);
    }

    #[test]
    fn requests_past_the_last_checkpoint_are_left_over() {
        let mut driver = driver(3);
        driver.configure(&lattice()).unwrap();
        let mut schedule = ScheduledChangeRequests::new(vec![ScheduledRequest {
            before_checkpoint: 7,
            request: ModelChangeRequest::RemoveCell { cell_id: CellId::new(0) },
        }])
        .unwrap();
        let summary = driver.run(&mut schedule).unwrap();
        assert_eq!(summary.requests_applied, 0);
        assert_eq!(schedule.remaining(), 1);
        assert_eq!(driver.state().unwrap().cells.len(), 4);
    }

    #[test]
    fn refused_calls_are_recoverable_only_before_a_terminal_phase() {
        let mut failed = driver(1);
        let mut done = driver(1);

        let early = done.run_cycle().unwrap_err();
        assert!(early.is_recoverable());

        done.configure(&lattice()).unwrap();
        done.run_cycle().unwrap();
        let late = done.run_cycle().unwrap_err();
        assert!(matches!(late, DriverError::InvalidPhase { phase: DriverPhase::Done, .. }));
        assert!(!late.is_recoverable());

        let mut state = lattice();
        state.integrator_settings.dt = 0.0;
        assert!(failed.configure(&state).is_err());
        let refused = failed.run_cycle().unwrap_err();
        assert!(matches!(refused, DriverError::InvalidPhase { phase: DriverPhase::Failed, .. }));
        assert!(!refused.is_recoverable());
    }

    #[test]
    fn zero_checkpoints_is_done_immediately() {
        let mut driver = driver(0);
        driver.configure(&lattice()).unwrap();
        assert_eq!(driver.phase(), DriverPhase::Done);
        let summary = driver.run(&mut NoChangeRequests::new()).unwrap();
        assert_eq!(summary.checkpoints_written, 0);
        assert_eq!(summary.total_steps, 0);
    }
}
