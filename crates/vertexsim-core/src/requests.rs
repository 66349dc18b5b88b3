//! Sources of mid-run model-change requests.
//!
//! Before each checkpoint after the first, the driver asks its
//! [`ChangeRequestSource`] which requests to apply. [`NoChangeRequests`]
//! never has any; [`ScheduledChangeRequests`] replays a fixed schedule
//! loaded from a JSON file:
//!
//! ```json
//! [
//!   { "before_checkpoint": 10, "request": { "kind": "remove_cell", "cell_id": 3 } }
//! ]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use vertexsim_types::ModelChangeRequest;

/// Errors raised while loading a request schedule.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// The schedule file could not be read.
    #[error("failed to read request schedule: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The schedule is not a valid list of entries.
    #[error("failed to parse request schedule: {source}")]
    Json {
        /// The underlying decode error.
        #[from]
        source: serde_json::Error,
    },

    /// An entry targets checkpoint 0, which is written before any request
    /// can be applied.
    #[error("request {position} targets checkpoint 0; the first usable checkpoint is 1")]
    BeforeFirstCheckpoint {
        /// Zero-based position of the entry in the file.
        position: usize,
    },
}

/// Provider of change requests, consulted once per checkpoint.
pub trait ChangeRequestSource {
    /// Requests to apply, in order, before checkpoint `checkpoint` is taken.
    fn requests_before(&mut self, checkpoint: u64) -> Vec<ModelChangeRequest>;

    /// Number of requests not yet handed out.
    fn remaining(&self) -> usize {
        0
    }
}

/// A source with nothing to say.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoChangeRequests;

impl NoChangeRequests {
    /// Create the empty source.
    pub const fn new() -> Self {
        Self
    }
}

impl ChangeRequestSource for NoChangeRequests {
    fn requests_before(&mut self, _checkpoint: u64) -> Vec<ModelChangeRequest> {
        Vec::new()
    }
}

/// One entry of a request schedule file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledRequest {
    /// The checkpoint the request is applied before.
    pub before_checkpoint: u64,
    /// The request itself.
    pub request: ModelChangeRequest,
}

/// A fixed schedule of requests, each handed out exactly once.
#[derive(Debug, Clone, Default)]
pub struct ScheduledChangeRequests {
    pending: BTreeMap<u64, Vec<ModelChangeRequest>>,
}

impl ScheduledChangeRequests {
    /// Build a schedule. Requests for the same checkpoint keep their order.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::BeforeFirstCheckpoint`] if an entry targets
    /// checkpoint 0.
    pub fn new(entries: Vec<ScheduledRequest>) -> Result<Self, ScheduleError> {
        let mut pending: BTreeMap<u64, Vec<ModelChangeRequest>> = BTreeMap::new();
        for (position, entry) in entries.into_iter().enumerate() {
            if entry.before_checkpoint == 0 {
                return Err(ScheduleError::BeforeFirstCheckpoint { position });
            }
            pending
                .entry(entry.before_checkpoint)
                .or_default()
                .push(entry.request);
        }
        Ok(Self { pending })
    }

    /// Parse a schedule from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Json`] for malformed input, or
    /// [`ScheduleError::BeforeFirstCheckpoint`] as in [`new`](Self::new).
    pub fn parse(json: &str) -> Result<Self, ScheduleError> {
        Self::new(serde_json::from_str(json)?)
    }

    /// Load a schedule from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Io`] if the file cannot be read, otherwise
    /// as in [`parse`](Self::parse).
    pub fn from_file(path: &Path) -> Result<Self, ScheduleError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }
}

impl ChangeRequestSource for ScheduledChangeRequests {
    fn requests_before(&mut self, checkpoint: u64) -> Vec<ModelChangeRequest> {
        self.pending.remove(&checkpoint).unwrap_or_default()
    }

    fn remaining(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }
}
