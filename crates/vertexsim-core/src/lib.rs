//! Engine boundary, checkpointing and the simulation driver for VertexSim.
//!
//! This crate turns a [`VertexModelState`] into a running simulation: it
//! hands the state to a physics engine, advances it in fixed batches, and
//! persists a checkpoint before every batch. Change requests can be applied
//! between batches.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `vertexsim-config.yaml` into
//!   strongly-typed structs.
//! - [`physics`] -- [`PhysicsEngine`] trait and the in-process
//!   [`ReferenceEngine`].
//! - [`adapter`] -- [`EngineAdapter`], translating states to and from an
//!   engine.
//! - [`checkpoint`] -- [`CheckpointStore`] trait with directory and memory
//!   stores.
//! - [`requests`] -- [`ChangeRequestSource`] trait, [`NoChangeRequests`]
//!   and [`ScheduledChangeRequests`].
//! - [`driver`] -- [`SimulationDriver`], the checkpointed run loop.
//!
//! [`VertexModelState`]: vertexsim_types::VertexModelState

pub mod adapter;
pub mod checkpoint;
pub mod config;
pub mod driver;
pub mod physics;
pub mod requests;

// Re-export primary items at crate root.
pub use adapter::{EngineAdapter, EngineError};
pub use checkpoint::{
    CheckpointError, CheckpointStore, DirectoryCheckpointStore, MemoryCheckpointStore,
};
pub use config::{ConfigError, SimulationConfig};
pub use driver::{CheckpointSchedule, DriverError, DriverPhase, RunSummary, SimulationDriver};
pub use physics::{ForceKind, PhysicsEngine, PhysicsError, ReferenceEngine};
pub use requests::{
    ChangeRequestSource, NoChangeRequests, ScheduleError, ScheduledChangeRequests,
    ScheduledRequest,
};
