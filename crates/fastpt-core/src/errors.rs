use thiserror::Error;

/// Error type for invalid layouts, priors and run settings.
#[derive(Error, Debug)]
pub enum FastPtError {
    #[error("{0}")]
    Error(String),
    #[error("Invalid run configuration: {0}")]
    Configuration(String),
    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("Parameter '{0}' is declared more than once")]
    DuplicateParameter(String),
    #[error("Parameters '{first}' and '{second}' must belong to the same partition to be paired")]
    MixedPair { first: String, second: String },
    #[error("Parameter '{0}' cannot be periodic outside the extrinsic partition")]
    IntrinsicPeriodic(String),
    #[error("Expected {expected} values, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Invalid prior for '{name}': {reason}")]
    InvalidPrior { name: String, reason: String },
    #[error("No prior was given for parameter '{0}'")]
    MissingPrior(String),
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience type for `Result<T, FastPtError>`.
pub type FastPtResult<T> = Result<T, FastPtError>;
