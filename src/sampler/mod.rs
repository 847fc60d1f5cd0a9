//! MCMC machinery: the stretch-move ensemble sampler and the run driver.

pub mod driver;
pub mod ensemble;

pub use driver::{
    CompletedRun, DriverState, InitializedRun, ParamBounds, RunPlan, RunSettings, default_walkers,
};
pub use ensemble::{Chain, EnsembleSampler, LnProb, StretchMove, StretchSampler};
