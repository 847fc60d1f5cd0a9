//! Affine-invariant ensemble sampler (Goodman & Weare 2010 stretch move).
//!
//! The walker set is split into two halves. Each half proposes moves against the
//! positions of the other half, so all proposals of one half are independent and
//! their log-probabilities are evaluated in parallel with rayon. Random numbers
//! are drawn on the calling thread only, so a seeded RNG reproduces the chain.

use nalgebra::DMatrix;
use rand::Rng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::error::SamplerError;

/// Stretch-move proposal with scale `a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchMove {
    a: f64,
}

impl Default for StretchMove {
    fn default() -> Self {
        Self { a: 2.0 }
    }
}

impl StretchMove {
    pub fn new(a: f64) -> Result<Self, SamplerError> {
        if !(a.is_finite() && a > 1.0) {
            return Err(SamplerError::StretchScale(a));
        }
        Ok(Self { a })
    }

    pub fn scale(&self) -> f64 {
        self.a
    }

    /// Draw `z` from `g(z) ∝ 1/sqrt(z)` on `[1/a, a]`.
    pub fn sample_z<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.r#gen();
        ((self.a - 1.0) * u + 1.0).powi(2) / self.a
    }

    /// `min(1, z^(d-1) exp(new - old))`; a non-finite proposal is never accepted.
    pub fn acceptance_probability(&self, z: f64, ndim: usize, ln_prob_old: f64, ln_prob_new: f64) -> f64 {
        if !ln_prob_new.is_finite() {
            return 0.0;
        }
        let ln_ratio = (ndim as f64 - 1.0) * z.ln() + (ln_prob_new - ln_prob_old);
        ln_ratio.exp().min(1.0)
    }

    /// `y = c + z (x - c)` for a complementary walker `c` picked uniformly.
    pub fn propose<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        current: &[f64],
        complementary: &DMatrix<f64>,
    ) -> (Vec<f64>, f64) {
        let z = self.sample_z(rng);
        let pick = rng.gen_range(0..complementary.nrows());
        let proposal = current
            .iter()
            .enumerate()
            .map(|(j, &x)| {
                let c = complementary[(pick, j)];
                c + z * (x - c)
            })
            .collect();
        (proposal, z)
    }
}

/// Every sampled position of every walker.
///
/// Indexed `[walker, step, parameter]`; each step stores one
/// `n_walkers × ndim` matrix.
#[derive(Debug, Clone)]
pub struct Chain {
    param_names: Vec<String>,
    positions: Vec<DMatrix<f64>>,
    ln_probs: Vec<Vec<f64>>,
    accepted: Vec<usize>,
    proposed: Vec<usize>,
}

impl Chain {
    fn new(param_names: Vec<String>, n_walkers: usize, steps: usize) -> Self {
        Self {
            param_names,
            positions: Vec::with_capacity(steps),
            ln_probs: Vec::with_capacity(steps),
            accepted: vec![0; n_walkers],
            proposed: vec![0; n_walkers],
        }
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn n_walkers(&self) -> usize {
        self.accepted.len()
    }

    pub fn n_steps(&self) -> usize {
        self.positions.len()
    }

    pub fn ndim(&self) -> usize {
        self.param_names.len()
    }

    pub fn get(&self, walker: usize, step: usize, param: usize) -> f64 {
        self.positions[step][(walker, param)]
    }

    /// Full position of one walker at one step.
    pub fn position(&self, walker: usize, step: usize) -> Vec<f64> {
        self.positions[step].row(walker).iter().copied().collect()
    }

    pub fn ln_prob(&self, walker: usize, step: usize) -> f64 {
        self.ln_probs[step][walker]
    }

    /// One parameter of one walker across all steps.
    pub fn walker_trace(&self, walker: usize, param: usize) -> Vec<f64> {
        self.positions.iter().map(|m| m[(walker, param)]).collect()
    }

    /// One parameter over every walker, skipping the first `burn_in` steps.
    pub fn flat_param(&self, param: usize, burn_in: usize) -> Vec<f64> {
        self.positions
            .iter()
            .skip(burn_in)
            .flat_map(|m| m.column(param).iter().copied().collect::<Vec<_>>())
            .collect()
    }

    pub fn accepted(&self) -> &[usize] {
        &self.accepted
    }

    /// Accepted / proposed, per walker.
    pub fn acceptance_fractions(&self) -> Vec<f64> {
        self.accepted
            .iter()
            .zip(&self.proposed)
            .map(|(&a, &p)| if p > 0 { a as f64 / p as f64 } else { 0.0 })
            .collect()
    }

    pub fn mean_acceptance(&self) -> f64 {
        let proposed: usize = self.proposed.iter().sum();
        if proposed == 0 {
            return 0.0;
        }
        self.accepted.iter().sum::<usize>() as f64 / proposed as f64
    }

    /// Position with the highest log-probability seen, with that value.
    pub fn best(&self) -> Option<(Vec<f64>, f64)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for (step, probs) in self.ln_probs.iter().enumerate() {
            for (walker, &lp) in probs.iter().enumerate() {
                if lp.is_finite() && best.is_none_or(|(_, _, b)| lp > b) {
                    best = Some((walker, step, lp));
                }
            }
        }
        best.map(|(walker, step, lp)| (self.position(walker, step), lp))
    }

    fn push(&mut self, positions: DMatrix<f64>, ln_probs: Vec<f64>) {
        self.positions.push(positions);
        self.ln_probs.push(ln_probs);
    }

    /// Chain from recorded steps, every proposal counted as accepted.
    #[cfg(test)]
    pub(crate) fn from_steps(param_names: Vec<String>, steps: Vec<(DMatrix<f64>, Vec<f64>)>) -> Self {
        let n_walkers = steps.first().map_or(0, |(m, _)| m.nrows());
        let mut chain = Self::new(param_names, n_walkers, steps.len());
        for (positions, ln_probs) in steps {
            chain.push(positions, ln_probs);
        }
        chain.accepted = vec![chain.n_steps(); n_walkers];
        chain.proposed = vec![chain.n_steps(); n_walkers];
        chain
    }
}

/// Target log-density handed to a sampler.
pub type LnProb<'a> = dyn Fn(&[f64]) -> f64 + Sync + 'a;

/// The random-walk engine behind the run driver.
pub trait EnsembleSampler {
    /// Advance `initial` (`n_walkers × ndim`) for exactly `steps` steps.
    fn sample(
        &self,
        initial: DMatrix<f64>,
        param_names: Vec<String>,
        steps: usize,
        ln_prob: &LnProb<'_>,
        rng: &mut StdRng,
    ) -> Result<Chain, SamplerError>;
}

/// Stretch-move ensemble sampler.
#[derive(Debug, Clone, Copy, Default)]
pub struct StretchSampler {
    stretch: StretchMove,
}

impl StretchSampler {
    pub fn new(stretch: StretchMove) -> Self {
        Self { stretch }
    }

    fn evaluate(rows: &[Vec<f64>], ln_prob: &LnProb<'_>) -> Vec<f64> {
        rows.par_iter().map(|theta| ln_prob(theta)).collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn update_half(
        &self,
        positions: &mut DMatrix<f64>,
        ln_probs: &mut [f64],
        chain: &mut Chain,
        active: std::ops::Range<usize>,
        complementary: std::ops::Range<usize>,
        ln_prob: &LnProb<'_>,
        rng: &mut StdRng,
    ) {
        let ndim = positions.ncols();
        let others = positions.rows_range(complementary).clone_owned();

        let (proposals, stretches): (Vec<Vec<f64>>, Vec<f64>) = active
            .clone()
            .map(|i| {
                let current: Vec<f64> = positions.row(i).iter().copied().collect();
                self.stretch.propose(rng, &current, &others)
            })
            .unzip();

        let new_probs = Self::evaluate(&proposals, ln_prob);

        for (((walker, proposal), z), lp_new) in active.zip(proposals).zip(stretches).zip(new_probs) {
            let p = self
                .stretch
                .acceptance_probability(z, ndim, ln_probs[walker], lp_new);
            chain.proposed[walker] += 1;
            if rng.r#gen::<f64>() < p {
                for (j, v) in proposal.into_iter().enumerate() {
                    positions[(walker, j)] = v;
                }
                ln_probs[walker] = lp_new;
                chain.accepted[walker] += 1;
            }
        }
    }
}

impl EnsembleSampler for StretchSampler {
    fn sample(
        &self,
        initial: DMatrix<f64>,
        param_names: Vec<String>,
        steps: usize,
        ln_prob: &LnProb<'_>,
        rng: &mut StdRng,
    ) -> Result<Chain, SamplerError> {
        let (n_walkers, ndim) = initial.shape();
        if param_names.len() != ndim {
            return Err(SamplerError::Dimension {
                expected: ndim,
                got: param_names.len(),
            });
        }
        if n_walkers < 2 * ndim {
            return Err(SamplerError::TooFewWalkers {
                n_walkers,
                ndim,
                min: 2 * ndim,
            });
        }
        if n_walkers % 2 != 0 {
            return Err(SamplerError::OddWalkers(n_walkers));
        }
        if steps == 0 {
            return Err(SamplerError::NoSteps);
        }

        let mut positions = initial;
        let rows: Vec<Vec<f64>> = positions
            .row_iter()
            .map(|r| r.iter().copied().collect())
            .collect();
        let mut ln_probs = Self::evaluate(&rows, ln_prob);
        let finite = ln_probs.iter().filter(|lp| lp.is_finite()).count();
        if finite == 0 {
            log::warn!("no walker starts at a finite log-probability; the run may not move");
        }

        let mut chain = Chain::new(param_names, n_walkers, steps);
        let half = n_walkers / 2;
        let report_every = (steps / 10).max(1);

        for step in 0..steps {
            self.update_half(&mut positions, &mut ln_probs, &mut chain, 0..half, half..n_walkers, ln_prob, rng);
            self.update_half(&mut positions, &mut ln_probs, &mut chain, half..n_walkers, 0..half, ln_prob, rng);
            chain.push(positions.clone(), ln_probs.clone());

            if (step + 1) % report_every == 0 {
                log::debug!(
                    "step {}/{steps}: acceptance {:.3}",
                    step + 1,
                    chain.mean_acceptance()
                );
            }
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("x{i}")).collect()
    }

    fn ball(n_walkers: usize, center: &[f64], rng: &mut StdRng) -> DMatrix<f64> {
        DMatrix::from_fn(n_walkers, center.len(), |_, j| center[j] + 0.1 * (rng.r#gen::<f64>() - 0.5))
    }

    #[test]
    fn stretch_scale_must_exceed_one() {
        assert_eq!(StretchMove::default().scale(), 2.0);
        assert!(StretchMove::new(2.5).is_ok());
        assert_eq!(StretchMove::new(1.0), Err(SamplerError::StretchScale(1.0)));
    }

    #[test]
    fn stretch_factor_within_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let s = StretchMove::default();
        for _ in 0..1000 {
            let z = s.sample_z(&mut rng);
            assert!((0.5..=2.0).contains(&z));
        }
    }

    #[test]
    fn acceptance_probability_cases() {
        let s = StretchMove::default();
        assert_eq!(s.acceptance_probability(1.0, 2, -1.0, 0.0), 1.0);
        assert!((s.acceptance_probability(1.0, 2, 0.0, -1.0) - (-1.0f64).exp()).abs() < 1e-12);
        assert!((s.acceptance_probability(2.0, 3, 0.0, -2.0) - 4.0 * (-2.0f64).exp()).abs() < 1e-12);
        assert_eq!(s.acceptance_probability(1.0, 2, 0.0, f64::NEG_INFINITY), 0.0);
        assert_eq!(s.acceptance_probability(1.0, 2, 0.0, f64::NAN), 0.0);
        assert_eq!(s.acceptance_probability(1.0, 2, f64::NEG_INFINITY, -5.0), 1.0);
    }

    #[test]
    fn proposal_lies_on_line_through_complementary_walker() {
        let mut rng = StdRng::seed_from_u64(3);
        let others = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        let (y, z) = StretchMove::default().propose(&mut rng, &[3.0, 2.0], &others);
        assert!((y[0] - (1.0 + z * 2.0)).abs() < 1e-12);
        assert!((y[1] - (1.0 + z * 1.0)).abs() < 1e-12);
    }

    #[test]
    fn validates_ensemble_shape() {
        let sampler = StretchSampler::default();
        let lp = |_: &[f64]| 0.0;
        let mut rng = StdRng::seed_from_u64(0);
        let too_few = DMatrix::zeros(2, 2);
        assert!(matches!(
            sampler.sample(too_few, names(2), 5, &lp, &mut rng),
            Err(SamplerError::TooFewWalkers { .. })
        ));
        let odd = DMatrix::zeros(5, 2);
        assert_eq!(
            sampler.sample(odd, names(2), 5, &lp, &mut rng).unwrap_err(),
            SamplerError::OddWalkers(5)
        );
        assert_eq!(
            sampler.sample(DMatrix::zeros(4, 2), names(2), 0, &lp, &mut rng).unwrap_err(),
            SamplerError::NoSteps
        );
    }

    #[test]
    fn samples_a_gaussian_and_records_every_step() {
        let mut rng = StdRng::seed_from_u64(42);
        let init = ball(16, &[0.5, -0.5], &mut rng);
        let lp = |x: &[f64]| -0.5 * ((x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2) / 0.25);
        let chain = StretchSampler::default()
            .sample(init, names(2), 1500, &lp, &mut rng)
            .unwrap();

        assert_eq!(chain.n_steps(), 1500);
        assert_eq!(chain.n_walkers(), 16);
        assert_eq!(chain.walker_trace(3, 0).len(), 1500);
        assert!(chain.mean_acceptance() > 0.2 && chain.mean_acceptance() < 0.95);

        let xs = chain.flat_param(0, 500);
        let ys = chain.flat_param(1, 500);
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        assert!((mean(&xs) - 1.0).abs() < 0.15, "mean x {}", mean(&xs));
        assert!((mean(&ys) + 2.0).abs() < 0.1, "mean y {}", mean(&ys));
        let (best, lp_best) = chain.best().unwrap();
        assert!(lp_best <= 0.0 && lp_best > -0.5);
        assert_eq!(best.len(), 2);
    }

    #[test]
    fn impossible_region_is_never_entered() {
        let mut rng = StdRng::seed_from_u64(7);
        let init = ball(8, &[0.5, 0.5], &mut rng);
        let lp = |x: &[f64]| {
            if x.iter().all(|v| (0.0..=1.0).contains(v)) {
                0.0
            } else {
                f64::NEG_INFINITY
            }
        };
        let chain = StretchSampler::default()
            .sample(init, names(2), 200, &lp, &mut rng)
            .unwrap();
        for step in 0..chain.n_steps() {
            for walker in 0..chain.n_walkers() {
                assert!(chain.ln_prob(walker, step).is_finite());
                assert!((0.0..=1.0).contains(&chain.get(walker, step, 0)));
            }
        }
    }

    #[test]
    fn same_seed_same_chain() {
        let lp = |x: &[f64]| -0.5 * x.iter().map(|v| v * v).sum::<f64>();
        let run = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            let init = ball(6, &[0.0, 0.0], &mut rng);
            StretchSampler::default()
                .sample(init, names(2), 50, &lp, &mut rng)
                .unwrap()
        };
        let (a, b) = (run(9), run(9));
        assert_eq!(a.walker_trace(2, 1), b.walker_trace(2, 1));
        assert_eq!(a.accepted(), b.accepted());
    }
}
