//! Run driver: configuring → initializing walkers → running → complete.
//!
//! Each state is its own type and consumes the previous one, so a chain can only
//! be produced from walkers that were validated and initialized.
//!
//! - [`RunPlan`]: fixed dimensionality, walker count, step budget, start vector
//! - [`InitializedRun`]: jittered, clipped walker positions plus the seeded RNG
//! - [`CompletedRun`]: the chain

use std::fmt;

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::{FitMode, StartOverrides};
use crate::error::SamplerError;
use crate::isochrone::GridSet;
use crate::sampler::ensemble::{Chain, EnsembleSampler};
use crate::stats::{Likelihood, Posterior};

/// Default starting masses for single-star fits (solar masses).
pub const DEFAULT_START_PRIMARY: f64 = 1.0;
pub const DEFAULT_START_SECONDARY: f64 = 0.5;
pub const DEFAULT_START_P_FIELD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Configuring,
    InitializingWalkers,
    Running,
    Complete,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriverState::Configuring => "configuring",
            DriverState::InitializingWalkers => "initializing_walkers",
            DriverState::Running => "running",
            DriverState::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Box the walkers are clipped into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamBounds {
    pub feh: (f64, f64),
    pub age: (f64, f64),
    pub mass: (f64, f64),
}

impl ParamBounds {
    pub fn from_grids(grids: &GridSet) -> Self {
        Self {
            feh: grids.feh_range(),
            age: grids.age_range(),
            mass: grids.mass_range(),
        }
    }

    /// Width used to scale the start jitter of each dimension.
    fn widths(&self, mode: &FitMode) -> Vec<f64> {
        let mut w = vec![self.feh.1 - self.feh.0, self.age.1 - self.age.0];
        if let FitMode::SingleStar(layout) = mode {
            w.push(self.mass.1 - self.mass.0);
            if layout.fit_secondary {
                w.push(self.mass.1 - self.mass.0);
            }
            if layout.fit_field {
                w.push(1.0);
            }
        }
        w
    }

    /// Clip one walker in place, in [`FitMode`] vector order.
    pub fn clip(&self, mode: &FitMode, theta: &mut [f64]) {
        theta[0] = theta[0].clamp(self.feh.0, self.feh.1);
        theta[1] = theta[1].clamp(self.age.0, self.age.1);
        if let FitMode::SingleStar(layout) = mode {
            theta[2] = theta[2].clamp(self.mass.0, self.mass.1);
            let mut next = 3;
            if layout.fit_secondary {
                // The companion is never heavier than the primary.
                theta[next] = theta[next].max(self.mass.0).min(theta[2]);
                next += 1;
            }
            if layout.fit_field {
                theta[next] = theta[next].clamp(0.0, 1.0);
            }
        }
    }

    /// Middle of the grid, or the overrides, in [`FitMode`] vector order.
    pub fn start_vector(&self, mode: &FitMode, overrides: &StartOverrides) -> Vec<f64> {
        let mid = |(lo, hi): (f64, f64)| 0.5 * (lo + hi);
        let mut v = vec![
            overrides.feh.unwrap_or(mid(self.feh)),
            overrides.age.unwrap_or(mid(self.age)),
        ];
        if let FitMode::SingleStar(layout) = mode {
            v.push(overrides.primary_mass.unwrap_or(DEFAULT_START_PRIMARY));
            if layout.fit_secondary {
                v.push(overrides.secondary_mass.unwrap_or(DEFAULT_START_SECONDARY));
            }
            if layout.fit_field {
                v.push(overrides.p_field.unwrap_or(DEFAULT_START_P_FIELD));
            }
        }
        self.clip(mode, &mut v);
        v
    }
}

/// Knobs of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub walkers: usize,
    pub steps: usize,
    /// Leading steps dropped from summaries; must stay below `steps`.
    pub burn_in: usize,
    pub seed: u64,
    /// Start jitter as a fraction of each parameter's bound width.
    pub jitter: f64,
    pub start: Vec<f64>,
}

/// Default walker count: 6 for a population fit, 16 (or more) for one star.
pub fn default_walkers(mode: &FitMode) -> usize {
    match mode {
        FitMode::Population => 6,
        FitMode::SingleStar(_) => 16.max(2 * mode.ndim()),
    }
}

/// Configuring state: validated settings.
#[derive(Debug, Clone)]
pub struct RunPlan {
    mode: FitMode,
    bounds: ParamBounds,
    settings: RunSettings,
}

impl RunPlan {
    pub fn new(mode: FitMode, bounds: ParamBounds, settings: RunSettings) -> Result<Self, SamplerError> {
        let ndim = mode.ndim();
        log::debug!("driver {}: {ndim} parameters, {} walkers", DriverState::Configuring, settings.walkers);

        if settings.walkers < 2 * ndim {
            return Err(SamplerError::TooFewWalkers {
                n_walkers: settings.walkers,
                ndim,
                min: 2 * ndim,
            });
        }
        if settings.walkers % 2 != 0 {
            return Err(SamplerError::OddWalkers(settings.walkers));
        }
        if settings.steps == 0 {
            return Err(SamplerError::NoSteps);
        }
        if settings.burn_in >= settings.steps {
            return Err(SamplerError::BurnIn {
                burn_in: settings.burn_in,
                steps: settings.steps,
            });
        }
        if settings.start.len() != ndim {
            return Err(SamplerError::Dimension {
                expected: ndim,
                got: settings.start.len(),
            });
        }
        if let Some((index, &value)) = settings.start.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(SamplerError::Jitter { index, value });
        }
        if !(settings.jitter.is_finite() && settings.jitter >= 0.0) {
            return Err(SamplerError::Jitter {
                index: 0,
                value: settings.jitter,
            });
        }
        Ok(Self { mode, bounds, settings })
    }

    pub fn mode(&self) -> FitMode {
        self.mode
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn state(&self) -> DriverState {
        DriverState::Configuring
    }

    /// Scatter walkers around the start vector and clip them into bounds.
    pub fn initialize(self) -> Result<InitializedRun, SamplerError> {
        log::debug!("driver {}", DriverState::InitializingWalkers);
        let mut rng = StdRng::seed_from_u64(self.settings.seed);
        let ndim = self.mode.ndim();
        let widths = self.bounds.widths(&self.mode);

        let noise = widths
            .iter()
            .enumerate()
            .map(|(index, w)| {
                let sd = self.settings.jitter * w.abs();
                Normal::new(0.0, sd).map_err(|_| SamplerError::Jitter { index, value: sd })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut positions = DMatrix::zeros(self.settings.walkers, ndim);
        let mut theta = vec![0.0; ndim];
        for walker in 0..self.settings.walkers {
            for (j, slot) in theta.iter_mut().enumerate() {
                *slot = self.settings.start[j] + noise[j].sample(&mut rng);
            }
            self.bounds.clip(&self.mode, &mut theta);
            for (j, &v) in theta.iter().enumerate() {
                positions[(walker, j)] = v;
            }
        }

        Ok(InitializedRun {
            plan: self,
            positions,
            rng,
        })
    }
}

/// Initializing-walkers state: positions ready to run.
#[derive(Debug, Clone)]
pub struct InitializedRun {
    plan: RunPlan,
    positions: DMatrix<f64>,
    rng: StdRng,
}

impl InitializedRun {
    pub fn positions(&self) -> &DMatrix<f64> {
        &self.positions
    }

    pub fn state(&self) -> DriverState {
        DriverState::InitializingWalkers
    }

    /// Run the full step budget.
    pub fn run<S, L>(mut self, sampler: &S, posterior: &Posterior<L>) -> Result<CompletedRun, SamplerError>
    where
        S: EnsembleSampler,
        L: Likelihood,
    {
        let steps = self.plan.settings.steps;
        log::info!(
            "driver {}: {} walkers x {steps} steps ({} fit)",
            DriverState::Running,
            self.plan.settings.walkers,
            self.plan.mode.display_name()
        );
        let names = self.plan.mode.param_names().into_iter().map(String::from).collect();
        let target = |theta: &[f64]| posterior.ln_posterior_slice(theta);
        let chain = sampler.sample(self.positions, names, steps, &target, &mut self.rng)?;
        log::info!(
            "driver {}: mean acceptance {:.3}",
            DriverState::Complete,
            chain.mean_acceptance()
        );
        Ok(CompletedRun {
            mode: self.plan.mode,
            settings: self.plan.settings,
            chain,
        })
    }
}

/// Complete state: the sampled chain.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    mode: FitMode,
    settings: RunSettings,
    chain: Chain,
}

impl CompletedRun {
    pub fn mode(&self) -> FitMode {
        self.mode
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn state(&self) -> DriverState {
        DriverState::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Params, SingleStarLayout};
    use crate::sampler::StretchSampler;
    use crate::stats::PriorSet;

    const BOUNDS: ParamBounds = ParamBounds {
        feh: (-1.0, 0.5),
        age: (8.0, 10.0),
        mass: (0.1, 3.0),
    };

    const BINARY: FitMode = FitMode::SingleStar(SingleStarLayout {
        star: 0,
        fit_secondary: true,
        fit_field: true,
    });

    fn settings(walkers: usize, start: Vec<f64>) -> RunSettings {
        RunSettings {
            walkers,
            steps: 20,
            burn_in: 5,
            seed: 11,
            jitter: 0.01,
            start,
        }
    }

    #[test]
    fn plan_validation() {
        let pop = FitMode::Population;
        assert!(RunPlan::new(pop, BOUNDS, settings(6, vec![0.0, 9.0])).is_ok());
        assert!(matches!(
            RunPlan::new(pop, BOUNDS, settings(2, vec![0.0, 9.0])),
            Err(SamplerError::TooFewWalkers { min: 4, .. })
        ));
        assert_eq!(
            RunPlan::new(pop, BOUNDS, settings(7, vec![0.0, 9.0])).unwrap_err(),
            SamplerError::OddWalkers(7)
        );
        assert!(matches!(
            RunPlan::new(pop, BOUNDS, settings(6, vec![0.0])),
            Err(SamplerError::Dimension { expected: 2, got: 1 })
        ));
        let mut s = settings(6, vec![0.0, 9.0]);
        s.steps = 0;
        assert_eq!(RunPlan::new(pop, BOUNDS, s).unwrap_err(), SamplerError::NoSteps);

        let mut s = settings(6, vec![0.0, 9.0]);
        s.burn_in = 20;
        assert_eq!(
            RunPlan::new(pop, BOUNDS, s).unwrap_err(),
            SamplerError::BurnIn { burn_in: 20, steps: 20 }
        );
    }

    #[test]
    fn default_walker_counts() {
        assert_eq!(default_walkers(&FitMode::Population), 6);
        assert_eq!(default_walkers(&BINARY), 16);
    }

    #[test]
    fn start_vector_is_clipped_midpoint() {
        let v = BOUNDS.start_vector(&BINARY, &StartOverrides::default());
        assert_eq!(v, vec![-0.25, 9.0, 1.0, 0.5, 0.5]);

        let overrides = StartOverrides {
            primary_mass: Some(0.3),
            secondary_mass: Some(0.9),
            p_field: Some(2.0),
            ..Default::default()
        };
        let v = BOUNDS.start_vector(&BINARY, &overrides);
        assert_eq!(&v[2..], &[0.3, 0.3, 1.0]);
    }

    #[test]
    fn walkers_are_clipped_into_bounds() {
        // Start on the corner of the box with a huge jitter.
        let start = vec![0.5, 10.0, 3.0, 3.0, 1.0];
        let mut s = settings(16, start);
        s.jitter = 2.0;
        let init = RunPlan::new(BINARY, BOUNDS, s).unwrap().initialize().unwrap();
        let pos = init.positions();
        assert_eq!(pos.shape(), (16, 5));
        for w in 0..16 {
            assert!((-1.0..=0.5).contains(&pos[(w, 0)]));
            assert!((8.0..=10.0).contains(&pos[(w, 1)]));
            assert!((0.1..=3.0).contains(&pos[(w, 2)]));
            assert!(pos[(w, 3)] >= 0.1 && pos[(w, 3)] <= pos[(w, 2)]);
            assert!((0.0..=1.0).contains(&pos[(w, 4)]));
        }
    }

    #[test]
    fn initialization_is_seeded() {
        let a = RunPlan::new(FitMode::Population, BOUNDS, settings(6, vec![0.0, 9.0]))
            .unwrap()
            .initialize()
            .unwrap();
        let b = RunPlan::new(FitMode::Population, BOUNDS, settings(6, vec![0.0, 9.0]))
            .unwrap()
            .initialize()
            .unwrap();
        assert_eq!(a.positions(), b.positions());
        assert_eq!(a.state(), DriverState::InitializingWalkers);
    }

    struct Flat;

    impl Likelihood for Flat {
        fn ln_likelihood(&self, params: &Params) -> f64 {
            -0.5 * (params.feh() - 0.1).powi(2)
        }
    }

    #[test]
    fn run_produces_full_chain() {
        let priors = PriorSet {
            feh_range: BOUNDS.feh,
            age_range: BOUNDS.age,
        };
        let posterior = Posterior::new(FitMode::Population, priors, Flat);
        let done = RunPlan::new(FitMode::Population, BOUNDS, settings(8, vec![0.0, 9.0]))
            .unwrap()
            .initialize()
            .unwrap()
            .run(&StretchSampler::default(), &posterior)
            .unwrap();
        assert_eq!(done.state(), DriverState::Complete);
        let chain = done.chain();
        assert_eq!((chain.n_walkers(), chain.n_steps(), chain.ndim()), (8, 20, 2));
        assert_eq!(chain.param_names(), &["feh".to_string(), "log_age".to_string()]);
        for step in 0..chain.n_steps() {
            for walker in 0..chain.n_walkers() {
                let feh = chain.get(walker, step, 0);
                assert!((-1.0..=0.5).contains(&feh));
                assert!(chain.ln_prob(walker, step).is_finite());
            }
        }
    }
}
