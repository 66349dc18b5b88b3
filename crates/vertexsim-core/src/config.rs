//! Configuration loading and typed config structures for VertexSim.
//!
//! The canonical configuration lives in `vertexsim-config.yaml` at the
//! project root. Every field has a default, so an empty file (or no file at
//! all) reproduces the reference squeeze run: a 2×2 lattice in a 15×5 box,
//! squeezed from both sides, 50 checkpoints of 40 steps each.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use vertexsim_tissue::{ForcingSpec, LatticeSpec};
use vertexsim_types::{
    CellType, CellTypeParams, IntegratorKind, IntegratorSettings, SimulationSettings, Vec2,
};

use crate::driver::CheckpointSchedule;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Which constraint was violated.
        reason: &'static str,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `vertexsim-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Lattice shape and cell mechanics.
    #[serde(default)]
    pub tissue: TissueConfig,

    /// Simulation box and squeezing fields.
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Time integration.
    #[serde(default)]
    pub integrator: IntegratorConfig,

    /// Engine feature toggles.
    #[serde(default)]
    pub simulation: SimulationToggles,

    /// Checkpoint schedule and file locations.
    #[serde(default)]
    pub run: RunConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the ranges serde cannot express.
    ///
    /// Mechanics and integrator values are validated again, more
    /// precisely, when the state is built; this pass catches the values
    /// that never reach the state.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tissue.cells_x == 0 || self.tissue.cells_y == 0 {
            return Err(ConfigError::Invalid {
                field: "tissue.cells_x/cells_y",
                reason: "must be at least 1",
            });
        }
        if self.run.step_size == 0 {
            return Err(ConfigError::Invalid {
                field: "run.step_size",
                reason: "must be at least 1",
            });
        }
        if self.run.checkpoint_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "run.checkpoint_prefix",
                reason: "must not be empty",
            });
        }
        if self
            .run
            .checkpoint_prefix
            .contains(['/', '\\'])
        {
            return Err(ConfigError::Invalid {
                field: "run.checkpoint_prefix",
                reason: "must not contain path separators",
            });
        }
        Ok(())
    }

    /// The lattice this configuration describes.
    pub fn lattice_spec(&self) -> LatticeSpec {
        let t = &self.tissue;
        let env = &self.environment;
        LatticeSpec {
            cells_x: t.cells_x,
            cells_y: t.cells_y,
            cell_type: CellType::new(t.cell_type.clone()),
            mechanics: CellTypeParams {
                kappa: t.kappa,
                a0: t.a0,
                gamma: t.gamma,
                p0: t.p0,
            },
            box_size: Vec2::new(env.box_x, env.box_y),
            forcing: env.forcing.then_some(ForcingSpec {
                strength: env.force_strength,
                relative_width: env.relative_width,
            }),
            integrator: self.integrator_settings(),
            simulation: SimulationSettings {
                topological_changes: self.simulation.topological_changes,
            },
        }
    }

    /// Integrator settings carried into the initial state.
    pub const fn integrator_settings(&self) -> IntegratorSettings {
        let i = &self.integrator;
        IntegratorSettings {
            kind: i.kind,
            dt: i.dt,
            friction: i.friction,
            temperature: i.temperature,
            seed: i.seed,
        }
    }

    /// Checkpoint cadence for the driver.
    pub const fn schedule(&self) -> CheckpointSchedule {
        CheckpointSchedule {
            checkpoints: self.run.checkpoints,
            step_size: self.run.step_size,
        }
    }
}

/// Lattice shape and mechanics of its single cell type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TissueConfig {
    /// Cells along x.
    #[serde(default = "default_cells")]
    pub cells_x: u32,

    /// Cells along y.
    #[serde(default = "default_cells")]
    pub cells_y: u32,

    /// Type tag given to every cell.
    #[serde(default = "default_cell_type")]
    pub cell_type: String,

    /// Target area `A0`.
    #[serde(default = "default_a0", rename = "A0")]
    pub a0: f64,

    /// Target shape index `P0`.
    #[serde(default = "default_p0", rename = "P0")]
    pub p0: f64,

    /// Perimeter stiffness `γ`.
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    /// Area stiffness `κ`.
    #[serde(default = "default_kappa")]
    pub kappa: f64,
}

impl Default for TissueConfig {
    fn default() -> Self {
        Self {
            cells_x: default_cells(),
            cells_y: default_cells(),
            cell_type: default_cell_type(),
            a0: default_a0(),
            p0: default_p0(),
            gamma: default_gamma(),
            kappa: default_kappa(),
        }
    }
}

/// Simulation box and the squeezing fields at its ends.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnvironmentConfig {
    /// Box width.
    #[serde(default = "default_box_x")]
    pub box_x: f64,

    /// Box height.
    #[serde(default = "default_box_y")]
    pub box_y: f64,

    /// Whether to install the squeezing fields.
    #[serde(default = "default_true")]
    pub forcing: bool,

    /// Force magnitude inside each slab.
    #[serde(default = "default_force_strength")]
    pub force_strength: f64,

    /// Slab width as a fraction of the lattice width.
    #[serde(default = "default_relative_width")]
    pub relative_width: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            box_x: default_box_x(),
            box_y: default_box_y(),
            forcing: default_true(),
            force_strength: default_force_strength(),
            relative_width: default_relative_width(),
        }
    }
}

/// Integrator choice and parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IntegratorConfig {
    /// Integration scheme.
    #[serde(default = "default_integrator_kind")]
    pub kind: IntegratorKind,

    /// Time step.
    #[serde(default = "default_dt")]
    pub dt: f64,

    /// Friction coefficient `ξ`.
    #[serde(default = "default_friction")]
    pub friction: f64,

    /// Noise temperature for the Brownian integrator.
    #[serde(default)]
    pub temperature: f64,

    /// Noise seed for the Brownian integrator.
    #[serde(default)]
    pub seed: u64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            kind: default_integrator_kind(),
            dt: default_dt(),
            friction: default_friction(),
            temperature: 0.0,
            seed: 0,
        }
    }
}

/// Engine feature toggles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimulationToggles {
    /// Ask the engine for T1 transitions. The bundled engine rejects this.
    #[serde(default)]
    pub topological_changes: bool,
}

/// Checkpoint schedule and file locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Number of checkpoints to write.
    #[serde(default = "default_checkpoints")]
    pub checkpoints: u64,

    /// Engine steps between consecutive checkpoints.
    #[serde(default = "default_step_size")]
    pub step_size: u64,

    /// Directory the checkpoint files go into.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// File name prefix, followed by the zero-padded index.
    #[serde(default = "default_checkpoint_prefix")]
    pub checkpoint_prefix: String,

    /// Start from this state document instead of building a lattice.
    #[serde(default)]
    pub initial_state: Option<PathBuf>,

    /// JSON file of scheduled change requests.
    #[serde(default)]
    pub change_requests: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            checkpoints: default_checkpoints(),
            step_size: default_step_size(),
            checkpoint_dir: default_checkpoint_dir(),
            checkpoint_prefix: default_checkpoint_prefix(),
            initial_state: None,
            change_requests: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_cells() -> u32 {
    2
}

fn default_cell_type() -> String {
    String::from("default")
}

const fn default_a0() -> f64 {
    1.0
}

const fn default_p0() -> f64 {
    0.3
}

const fn default_gamma() -> f64 {
    0.16
}

const fn default_kappa() -> f64 {
    1.0
}

const fn default_box_x() -> f64 {
    15.0
}

const fn default_box_y() -> f64 {
    5.0
}

const fn default_true() -> bool {
    true
}

const fn default_force_strength() -> f64 {
    0.005
}

const fn default_relative_width() -> f64 {
    0.25
}

const fn default_integrator_kind() -> IntegratorKind {
    IntegratorKind::Brownian
}

const fn default_dt() -> f64 {
    0.05
}

const fn default_friction() -> f64 {
    0.1
}

const fn default_checkpoints() -> u64 {
    50
}

const fn default_step_size() -> u64 {
    40
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_checkpoint_prefix() -> String {
    String::from("vmst_")
}

fn default_log_level() -> String {
    String::from("info")
}
