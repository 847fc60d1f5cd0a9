//! Log-posterior = log-prior + log-likelihood.

use crate::domain::{FitMode, Params};
use crate::stats::likelihood::Likelihood;
use crate::stats::priors::PriorSet;

/// Unnormalized log-posterior over one fit mode.
///
/// Holds no mutable state, so one instance is shared by every sampler thread.
#[derive(Debug, Clone)]
pub struct Posterior<L> {
    mode: FitMode,
    priors: PriorSet,
    likelihood: L,
}

impl<L: Likelihood> Posterior<L> {
    pub fn new(mode: FitMode, priors: PriorSet, likelihood: L) -> Self {
        Self {
            mode,
            priors,
            likelihood,
        }
    }

    pub fn mode(&self) -> FitMode {
        self.mode
    }

    pub fn priors(&self) -> &PriorSet {
        &self.priors
    }

    pub fn likelihood(&self) -> &L {
        &self.likelihood
    }

    /// `-inf` whenever the prior or the likelihood is not finite.
    ///
    /// The likelihood is skipped entirely when the prior already rules `params` out.
    pub fn ln_posterior(&self, params: &Params) -> f64 {
        let ln_prior = self.priors.ln_prior(params);
        if !ln_prior.is_finite() {
            return f64::NEG_INFINITY;
        }
        let ln_like = self.likelihood.ln_likelihood(params);
        if !ln_like.is_finite() {
            return f64::NEG_INFINITY;
        }
        ln_prior + ln_like
    }

    /// [`Posterior::ln_posterior`] on a flat sampler vector.
    pub fn ln_posterior_slice(&self, theta: &[f64]) -> f64 {
        match self.mode.decode(theta) {
            Ok(params) => self.ln_posterior(&params),
            Err(err) => {
                log::debug!("rejecting parameter vector: {err}");
                f64::NEG_INFINITY
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PopulationParams;

    struct Panicking;

    impl Likelihood for Panicking {
        fn ln_likelihood(&self, _: &Params) -> f64 {
            panic!("likelihood must not run when the prior is -inf");
        }
    }

    struct Constant(f64);

    impl Likelihood for Constant {
        fn ln_likelihood(&self, _: &Params) -> f64 {
            self.0
        }
    }

    fn priors() -> PriorSet {
        PriorSet {
            feh_range: (-1.0, 1.0),
            age_range: (8.0, 9.0),
        }
    }

    #[test]
    fn prior_outside_support_short_circuits() {
        let post = Posterior::new(FitMode::Population, priors(), Panicking);
        let p = Params::Population(PopulationParams { feh: 1.5, age: 8.5 });
        assert_eq!(post.ln_posterior(&p), f64::NEG_INFINITY);
        assert_eq!(post.ln_posterior_slice(&[0.0, 9.5]), f64::NEG_INFINITY);
    }

    #[test]
    fn adds_prior_and_likelihood() {
        let post = Posterior::new(FitMode::Population, priors(), Constant(-3.0));
        let v = post.ln_posterior_slice(&[0.0, 8.5]);
        assert!((v - (-(2.0f64).ln() - 3.0)).abs() < 1e-12);
    }

    #[test]
    fn non_finite_likelihood_and_bad_vectors_are_negative_infinity() {
        let nan = Posterior::new(FitMode::Population, priors(), Constant(f64::NAN));
        assert_eq!(nan.ln_posterior_slice(&[0.0, 8.5]), f64::NEG_INFINITY);
        let ok = Posterior::new(FitMode::Population, priors(), Constant(0.0));
        assert_eq!(ok.ln_posterior_slice(&[0.0, 8.5, 1.0]), f64::NEG_INFINITY);
    }
}
