//! Error types for the `vertexsim-tissue` crate.
//!
//! [`BuildError`] covers lattice construction; [`ApplyError`] covers
//! change-request application and separates a bad request (recoverable)
//! from a broken result (always fatal).

use vertexsim_types::{ModelChangeRequest, StateError};

/// Errors raised while synthesizing an initial lattice.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The lattice needs at least one cell along each axis.
    #[error("lattice must have at least one cell per axis, got {cells_x}x{cells_y}")]
    EmptyLattice {
        /// Cells along x.
        cells_x: u32,
        /// Cells along y.
        cells_y: u32,
    },

    /// A builder parameter is out of range.
    #[error("invalid lattice parameter {name} = {value}: {reason}")]
    InvalidParameter {
        /// The parameter name.
        name: &'static str,
        /// The rejected value.
        value: f64,
        /// Which constraint was violated.
        reason: &'static str,
    },

    /// The lattice is larger than the box it must sit in.
    #[error("lattice of {width}x{height} does not fit in box {box_x}x{box_y}")]
    DoesNotFit {
        /// Lattice width.
        width: f64,
        /// Lattice height.
        height: f64,
        /// Box width.
        box_x: f64,
        /// Box height.
        box_y: f64,
    },

    /// The assembled state failed validation.
    #[error("built state is invalid: {source}")]
    InvalidState {
        /// The validation failure.
        #[from]
        source: StateError,
    },
}

/// Errors raised while applying a [`ModelChangeRequest`].
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// The request does not apply to the given state. Recoverable: the
    /// state is untouched and the caller may retry with a corrected request.
    #[error("inapplicable {} request: {reason}", .request.kind())]
    Inapplicable {
        /// The offending request.
        request: Box<ModelChangeRequest>,
        /// Why it was rejected.
        reason: String,
    },

    /// The input state already violates the data-model invariants.
    #[error("input state is invalid: {source}")]
    InvalidInput {
        /// The validation failure.
        source: StateError,
    },

    /// Applying the request produced a state that violates the data-model
    /// invariants. This is an internal bug and always fatal.
    #[error("{} request produced an invalid state: {source}", .request.kind())]
    InvariantViolation {
        /// The request being applied.
        request: Box<ModelChangeRequest>,
        /// The violated invariant.
        source: StateError,
    },
}

impl ApplyError {
    /// Whether the caller may continue after this error.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Inapplicable { .. })
    }

    /// The request involved, if the error is tied to one.
    pub fn request(&self) -> Option<&ModelChangeRequest> {
        match self {
            Self::Inapplicable { request, .. } | Self::InvariantViolation { request, .. } => {
                Some(&**request)
            }
            Self::InvalidInput { .. } => None,
        }
    }
}
