//! Lattice builder, polygon geometry and change-request applicator.
//!
//! This crate works purely on [`VertexModelState`] values: it builds them,
//! measures them and edits them. It never talks to a physics engine.
//!
//! # Modules
//!
//! - [`lattice`] -- Deterministic rectangular lattice inside a bounding box,
//!   with optional squeezing fields.
//! - [`applicator`] -- All-or-nothing application of
//!   [`ModelChangeRequest`]s.
//! - [`geometry`] -- Signed area, perimeter and centroid of cell boundaries.
//! - [`error`] -- [`BuildError`] and [`ApplyError`].
//!
//! [`VertexModelState`]: vertexsim_types::VertexModelState
//! [`ModelChangeRequest`]: vertexsim_types::ModelChangeRequest

pub mod applicator;
pub mod error;
pub mod geometry;
pub mod lattice;

// Re-export primary items at crate root.
pub use applicator::{apply, apply_all};
pub use error::{ApplyError, BuildError};
pub use lattice::{ForcingSpec, LatticeSpec, build_lattice};
