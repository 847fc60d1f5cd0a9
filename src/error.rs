use thiserror::Error;

/// Application-level error: a message plus the process exit code to use.
///
/// Exit codes: `2` input/usage problems, `3` no usable data, `4` runtime failures.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failures while building or querying model grids.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("model grid contains no usable rows")]
    EmptyGrid,
    #[error("no model grids were supplied")]
    NoGrids,
    #[error("metallicity tag must be finite, got {0}")]
    NonFiniteMetallicity(f64),
    #[error("row {row} has {got} magnitudes, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        got: usize,
    },
    #[error("two model grids share [Fe/H] = {0}")]
    DuplicateMetallicity(f64),
    #[error("log10 age {age} outside model range [{min}, {max}]")]
    AgeOutOfRange { age: f64, min: f64, max: f64 },
}

impl From<GridError> for AppError {
    fn from(err: GridError) -> Self {
        AppError::new(2, format!("Model grid error: {err}"))
    }
}

/// Failures of the ensemble sampler or the run driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplerError {
    #[error("{n_walkers} walkers is too few for {ndim} parameters (need at least {min})")]
    TooFewWalkers {
        n_walkers: usize,
        ndim: usize,
        min: usize,
    },
    #[error("walker count must be even for the stretch move, got {0}")]
    OddWalkers(usize),
    #[error("step budget must be positive")]
    NoSteps,
    #[error("burn-in ({burn_in}) must be smaller than the number of steps ({steps})")]
    BurnIn { burn_in: usize, steps: usize },
    #[error("expected {expected} values, got {got}")]
    Dimension { expected: usize, got: usize },
    #[error("invalid stretch scale {0} (must be > 1)")]
    StretchScale(f64),
    #[error("invalid jitter for dimension {index}: {value}")]
    Jitter { index: usize, value: f64 },
}

impl From<SamplerError> for AppError {
    fn from(err: SamplerError) -> Self {
        AppError::new(2, format!("Sampler configuration error: {err}"))
    }
}
