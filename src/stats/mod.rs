//! Probability model: priors, field-contaminated likelihood and the posterior.

pub mod likelihood;
pub mod posterior;
pub mod priors;

pub use likelihood::{
    DEFAULT_MASS_NODES, DEFAULT_P_FIELD, FieldDistribution, FieldTerm, Likelihood, PopulationLikelihood, SingleStarLikelihood,
    band_ln_likelihood, joint_ln_likelihood, star_ln_likelihood,
};
pub use posterior::Posterior;
pub use priors::PriorSet;
