//! Error types for the runner binary.
//!
//! [`RunError`] is the top-level error type that wraps every failure mode
//! between startup and the end of the run.

use std::path::PathBuf;

/// Top-level error for the runner binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: vertexsim_core::ConfigError,
    },

    /// The initial lattice could not be built.
    #[error("lattice error: {source}")]
    Build {
        /// The underlying builder error.
        #[from]
        source: vertexsim_tissue::BuildError,
    },

    /// The initial state file could not be read.
    #[error("failed to read initial state {}: {source}", .path.display())]
    InitialStateIo {
        /// The state file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The initial state file is not a valid state.
    #[error("invalid initial state {}: {source}", .path.display())]
    InitialState {
        /// The state file.
        path: PathBuf,
        /// The validation failure.
        source: vertexsim_types::StateError,
    },

    /// The change-request schedule could not be loaded.
    #[error("request schedule error: {source}")]
    Schedule {
        /// The underlying schedule error.
        #[from]
        source: vertexsim_core::ScheduleError,
    },

    /// The checkpoint directory could not be prepared.
    #[error("checkpoint error: {source}")]
    Checkpoint {
        /// The underlying checkpoint error.
        #[from]
        source: vertexsim_core::CheckpointError,
    },

    /// The simulation itself failed.
    #[error("simulation error: {source}")]
    Driver {
        /// The underlying driver error.
        #[from]
        source: vertexsim_core::DriverError,
    },
}
