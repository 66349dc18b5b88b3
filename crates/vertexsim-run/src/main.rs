//! Batch runner for the VertexSim tissue simulation.
//!
//! Loads configuration, prepares the initial tissue, and runs the
//! checkpointed simulation loop with the reference engine until every
//! checkpoint is written or a fatal error occurs.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `vertexsim-config.yaml` (or the path given
//!    as the first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Build the initial lattice, or load `run.initial_state`
//! 4. Load the change-request schedule, if any
//! 5. Open the checkpoint directory
//! 6. Configure the driver and run every checkpoint
//! 7. Log the result

mod error;

use std::path::{Path, PathBuf};

use tracing::info;
use tracing_subscriber::EnvFilter;
use vertexsim_core::{
    ChangeRequestSource, DirectoryCheckpointStore, NoChangeRequests, ReferenceEngine,
    ScheduledChangeRequests, SimulationConfig, SimulationDriver,
};
use vertexsim_types::VertexModelState;

use crate::error::RunError;

/// Default configuration file, relative to the working directory.
const CONFIG_FILE: &str = "vertexsim-config.yaml";

/// Application entry point for the runner.
///
/// # Errors
///
/// Returns an error if any initialization step or the simulation fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from);
    let (config, loaded_from_file) = load_config(&config_path)?;

    init_logging(&config);
    info!("vertexsim-run starting");
    if loaded_from_file {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }

    run(&config)?;
    Ok(())
}

fn run(config: &SimulationConfig) -> Result<(), RunError> {
    let initial = initial_state(config)?;
    info!(
        cells = initial.cells.len(),
        vertices = initial.vertices.len(),
        step = initial.step,
        integrator = initial.integrator_settings.kind.as_str(),
        dt = initial.integrator_settings.dt,
        friction = initial.integrator_settings.friction,
        "Initial state ready"
    );

    let mut requests: Box<dyn ChangeRequestSource> = match &config.run.change_requests {
        Some(path) => {
            let schedule = ScheduledChangeRequests::from_file(path)?;
            info!(
                path = %path.display(),
                requests = schedule.remaining(),
                "Change-request schedule loaded"
            );
            Box::new(schedule)
        }
        None => Box::new(NoChangeRequests::new()),
    };

    let store =
        DirectoryCheckpointStore::new(&config.run.checkpoint_dir, &config.run.checkpoint_prefix)?;
    info!(
        dir = %store.dir().display(),
        prefix = %config.run.checkpoint_prefix,
        "Checkpoint directory ready"
    );

    let mut driver = SimulationDriver::new(ReferenceEngine::new(), store, config.schedule());
    driver.configure(&initial)?;
    let summary = driver.run(requests.as_mut())?;

    info!(
        checkpoints_written = summary.checkpoints_written,
        total_steps = summary.total_steps,
        requests_applied = summary.requests_applied,
        "vertexsim-run complete"
    );
    Ok(())
}

/// Load the configuration, falling back to defaults if the file is absent.
fn load_config(path: &Path) -> Result<(SimulationConfig, bool), RunError> {
    if path.exists() {
        Ok((SimulationConfig::from_file(path)?, true))
    } else {
        Ok((SimulationConfig::default(), false))
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(config: &SimulationConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// The configured initial state file, or a freshly built lattice.
fn initial_state(config: &SimulationConfig) -> Result<VertexModelState, RunError> {
    let Some(path) = &config.run.initial_state else {
        return Ok(vertexsim_tissue::build_lattice(&config.lattice_spec())?);
    };
    let text = std::fs::read_to_string(path).map_err(|source| RunError::InitialStateIo {
        path: path.clone(),
        source,
    })?;
    let state = VertexModelState::from_json_str(&text).map_err(|source| RunError::InitialState {
        path: path.clone(),
        source,
    })?;
    state.validate().map_err(|source| RunError::InitialState {
        path: path.clone(),
        source,
    })?;
    Ok(state)
}
