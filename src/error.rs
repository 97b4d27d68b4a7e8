use thiserror::Error;

/// Errors raised by the whirlybird plant, controllers and configuration loader.
#[derive(Error, Debug)]
pub enum WhirlybirdError {
    /// The generalized inertia matrix could not be inverted at this attitude.
    #[error("inertia matrix is singular at roll {roll:.4} rad, pitch {pitch:.4} rad")]
    SingularInertia { roll: f64, pitch: f64 },

    /// The adaptive reference integrator gave up before the final time.
    #[error("integration failed: {0}")]
    Integration(String),

    /// A scalar configuration value is out of range.
    #[error("invalid configuration `{field}`: {reason}")]
    InvalidConfig { field: String, reason: String },

    /// A gain matrix or vector does not have the shape its subsystem needs.
    #[error("`{name}` has shape {actual}, expected {expected}")]
    DimensionMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Too many consecutive ticks went by without a measurement.
    #[error("lost control authority after {missed} consecutive missed measurements")]
    ControlAuthorityLost { missed: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl WhirlybirdError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        WhirlybirdError::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WhirlybirdError>;
