//! Shared "fit pipeline" logic used by both CLI and TUI front-ends.
//!
//! model grids + observations -> filter -> posterior -> sampler run -> summaries
//!
//! The CLI and the TUI can then focus on presentation (printing vs widgets).

use std::path::Path;

use chrono::Utc;

use crate::domain::{FitConfig, FitMode, ObservationSet, Params, ParamSummary, RunFile};
use crate::error::AppError;
use crate::io::{MagnitudeCorrection, load_model_dir, load_observations};
use crate::isochrone::GridSet;
use crate::sampler::{CompletedRun, ParamBounds, RunPlan, RunSettings, StretchSampler};
use crate::stats::{Likelihood, PopulationLikelihood, Posterior, PriorSet, SingleStarLikelihood};

/// Row accounting for the observation file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub filtered: usize,
    /// Post-filter row of the single-star target, when filtering moved it.
    pub target_star: Option<usize>,
}

/// All computed outputs of a single `cmdfit fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub grids: GridSet,
    pub observations: ObservationSet,
    pub stats: LoadStats,
    pub run: CompletedRun,
    pub summaries: Vec<ParamSummary>,
    /// Highest-posterior sample and its log-posterior.
    pub best: Option<(Params, f64)>,
}

impl RunOutput {
    /// Posterior median as parameters.
    pub fn median(&self) -> Option<Params> {
        let theta: Vec<f64> = self.summaries.iter().map(|s| s.median).collect();
        self.run.mode().decode(&theta).ok()
    }
}

/// Load every model grid, with the configured magnitude corrections applied.
pub fn load_grids(config: &FitConfig) -> Result<GridSet, AppError> {
    let bands: Vec<String> = config.bands.iter().map(|b| b.model.clone()).collect();
    load_grid_set(
        &config.model_dir,
        &config.model_ext,
        config.corrections.as_deref(),
        config.distance_modulus,
        &bands,
    )
}

/// Load the `bands` columns of every `*.{ext}` grid in `dir`.
pub fn load_grid_set(
    dir: &Path,
    ext: &str,
    corrections: Option<&Path>,
    distance_modulus: f64,
    bands: &[String],
) -> Result<GridSet, AppError> {
    let correction = match corrections {
        Some(path) => MagnitudeCorrection::read(path, distance_modulus)?,
        None => MagnitudeCorrection::distance_only(distance_modulus),
    };
    load_model_dir(dir, ext, bands, Some(&correction))
}

/// Load observations and apply the configured cuts.
pub fn load_filtered_observations(config: &FitConfig) -> Result<(ObservationSet, LoadStats), AppError> {
    let load = load_observations(&config.data_path, &config.bands)?;
    let rows_read = load.rows_read;
    let rows_skipped = load.row_errors.len();
    let mut observations = load.observations;

    let keep = observations.filter_mask(&config.filter);
    let target_star = match config.mode {
        FitMode::SingleStar(layout) => Some(filtered_row(&observations, &keep, layout.star)?),
        FitMode::Population => None,
    };
    let filtered = observations.retain_mask(&keep);
    if observations.star_count() == 0 {
        return Err(AppError::new(
            3,
            format!("No stars left after filtering {} ({filtered} removed).", config.data_path.display()),
        ));
    }
    log::info!(
        "using {} of {rows_read} stars ({rows_skipped} unreadable, {filtered} filtered)",
        observations.star_count()
    );

    Ok((
        observations,
        LoadStats {
            rows_read,
            rows_skipped,
            filtered,
            target_star,
        },
    ))
}

/// Index that data row `star` will have once the rows marked `false` in `keep` are gone.
fn filtered_row(observations: &ObservationSet, keep: &[bool], star: usize) -> Result<usize, AppError> {
    match keep.get(star) {
        None => Err(AppError::new(
            2,
            format!("Star {star} requested but only {} stars loaded.", observations.star_count()),
        )),
        Some(false) => Err(AppError::new(
            3,
            format!("Star {} (row {star}) was removed by the magnitude/uncertainty cuts.", observations.star_label(star)),
        )),
        Some(true) => Ok(keep[..star].iter().filter(|k| **k).count()),
    }
}

/// `config.mode` with the single-star target moved to its post-filter row.
pub fn fitted_mode(config: &FitConfig, stats: &LoadStats) -> FitMode {
    match (config.mode, stats.target_star) {
        (FitMode::SingleStar(mut layout), Some(row)) => {
            layout.star = row;
            FitMode::SingleStar(layout)
        }
        (mode, _) => mode,
    }
}

/// Execute the full fitting pipeline and return the computed outputs.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, AppError> {
    let grids = load_grids(config)?;
    let (observations, stats) = load_filtered_observations(config)?;
    run_fit_with_inputs(config, grids, observations, stats)
}

/// Execute the sampling stages on already loaded inputs.
///
/// This is useful for the TUI where we want to rerun without re-reading files.
pub fn run_fit_with_inputs(
    config: &FitConfig,
    grids: GridSet,
    observations: ObservationSet,
    stats: LoadStats,
) -> Result<RunOutput, AppError> {
    let mode = fitted_mode(config, &stats);
    let run = sample_posterior(config, mode, &grids, &observations)?;
    let summaries = crate::report::summarize(run.chain(), &mode, config.burn_in)?;
    let best = run
        .chain()
        .best()
        .and_then(|(theta, lp)| mode.decode(&theta).ok().map(|p| (p, lp)));

    Ok(RunOutput {
        grids,
        observations,
        stats,
        run,
        summaries,
        best,
    })
}

fn sample_posterior(
    config: &FitConfig,
    mode: FitMode,
    grids: &GridSet,
    observations: &ObservationSet,
) -> Result<CompletedRun, AppError> {
    let bounds = ParamBounds::from_grids(grids);
    let settings = RunSettings {
        walkers: config.walkers,
        steps: config.steps,
        burn_in: config.burn_in,
        seed: config.seed,
        jitter: config.jitter,
        start: bounds.start_vector(&mode, &config.start),
    };
    let plan = RunPlan::new(mode, bounds, settings)?;
    let priors = PriorSet::from_grids(grids);

    match mode {
        FitMode::Population => {
            let likelihood =
                PopulationLikelihood::new(grids, observations, config.p_field, config.mass_nodes)?;
            if likelihood.marginalizes_mass() {
                log::info!("no known masses; marginalizing over {} mass nodes", config.mass_nodes);
            }
            run_plan(plan, Posterior::new(mode, priors, likelihood))
        }
        FitMode::SingleStar(layout) => {
            let likelihood = SingleStarLikelihood::new(grids, observations, layout.star, config.p_field)?;
            log::info!("fitting star {}", observations.star_label(layout.star));
            run_plan(plan, Posterior::new(mode, priors, likelihood))
        }
    }
}

fn run_plan<L: Likelihood>(plan: RunPlan, posterior: Posterior<L>) -> Result<CompletedRun, AppError> {
    let run = plan.initialize()?.run(&StretchSampler::default(), &posterior)?;
    Ok(run)
}

/// Serializable record of a finished run.
pub fn run_file(output: &RunOutput, config: &FitConfig) -> RunFile {
    RunFile {
        tool: format!("cmdfit {}", env!("CARGO_PKG_VERSION")),
        created_at: Utc::now(),
        mode: config.mode,
        bands: config.bands.clone(),
        feh_grid: output.grids.feh_list().to_vec(),
        stars: output.observations.star_count(),
        walkers: output.run.settings().walkers,
        steps: output.run.settings().steps,
        burn_in: config.burn_in,
        seed: config.seed,
        p_field: config.p_field,
        acceptance_fraction: output.run.chain().mean_acceptance(),
        summaries: output.summaries.clone(),
    }
}

/// Write whichever exports `config` asks for.
pub fn write_exports(output: &RunOutput, config: &FitConfig) -> Result<(), AppError> {
    if let Some(path) = &config.export_chain {
        crate::io::write_chain_csv(path, output.run.chain())?;
        log::info!("wrote chain to {}", path.display());
    }
    if let Some(path) = &config.export_run {
        crate::io::write_run_json(path, &run_file(output, config))?;
        log::info!("wrote run file to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ObservationFilter, SingleStarLayout, StartOverrides};
    use crate::io::model::fixtures::mist_text;
    use std::fs;
    use std::path::PathBuf;

    /// Model directory with grids at [Fe/H] = -0.5, 0.0, 0.5 and a data file drawn
    /// from the middle grid at age 8.5.
    fn workspace(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cmdfit-pipeline-{}-{name}", std::process::id()));
        let models = dir.join("models");
        fs::create_dir_all(&models).unwrap();
        for (i, feh) in [-0.5, 0.0, 0.5].into_iter().enumerate() {
            fs::write(models.join(format!("grid{i}.cmd")), mist_text(feh, feh)).unwrap();
        }
        // At [Fe/H]=0, age 8.5: B = 5.5 + ..., V = 4.5 + ... (midway between ages).
        let mut data = String::from("id,B,B_err,V,V_err\n");
        for (i, (b, v)) in [(6.5, 5.5), (5.5, 4.5), (4.5, 3.5), (6.0, 5.0), (5.0, 4.0)].iter().enumerate() {
            data.push_str(&format!("s{i},{b},0.05,{v},0.05\n"));
        }
        fs::write(dir.join("cluster.csv"), data).unwrap();
        dir
    }

    fn config(dir: &std::path::Path, mode: FitMode) -> FitConfig {
        FitConfig {
            model_dir: dir.join("models"),
            model_ext: "cmd".into(),
            data_path: dir.join("cluster.csv"),
            bands: vec!["Bessell_B=B:B_err".parse().unwrap(), "Bessell_V=V:V_err".parse().unwrap()],
            corrections: None,
            distance_modulus: 0.0,
            mode,
            p_field: 0.1,
            filter: ObservationFilter::default(),
            mass_nodes: 12,
            walkers: 8,
            steps: 30,
            burn_in: 10,
            seed: 3,
            jitter: 0.05,
            start: StartOverrides::default(),
            plot: false,
            plot_width: 60,
            plot_height: 20,
            export_chain: Some(dir.join("chain.csv")),
            export_run: Some(dir.join("run.json")),
        }
    }

    #[test]
    fn population_fit_runs_end_to_end() {
        let dir = workspace("population");
        let config = config(&dir, FitMode::Population);
        let output = run_fit(&config).unwrap();

        assert_eq!(output.observations.star_count(), 5);
        assert_eq!(output.stats.rows_read, 5);
        assert_eq!(output.summaries.len(), 2);
        assert_eq!(output.run.chain().n_steps(), 30);
        for s in &output.summaries {
            assert!(s.q16 <= s.median && s.median <= s.q84);
        }
        let feh = &output.summaries[0];
        assert!((-0.5..=0.5).contains(&feh.median));
        assert!(output.best.is_some());
        assert!(matches!(output.median(), Some(Params::Population(_))));

        write_exports(&output, &config).unwrap();
        let chain_csv = fs::read_to_string(dir.join("chain.csv")).unwrap();
        assert!(chain_csv.starts_with("walker,step,feh,log_age,ln_prob"));
        assert_eq!(chain_csv.lines().count(), 1 + 8 * 30);
        let run = crate::io::read_run_json(&dir.join("run.json")).unwrap();
        assert_eq!(run.stars, 5);
        assert_eq!(run.feh_grid, vec![-0.5, 0.0, 0.5]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn single_star_fit_samples_mass() {
        let dir = workspace("single");
        let mode = FitMode::SingleStar(SingleStarLayout {
            star: 1,
            fit_secondary: true,
            fit_field: true,
        });
        let mut config = config(&dir, mode);
        config.walkers = 16;
        let output = run_fit(&config).unwrap();
        assert_eq!(output.summaries.len(), 5);
        let m1 = &output.summaries[2];
        let m2 = &output.summaries[3];
        assert!(m1.median >= 0.5 && m1.median <= 1.5);
        assert!(m2.median <= 1.5);
        let pf = &output.summaries[4];
        assert!((0.0..=1.0).contains(&pf.median));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn filters_that_remove_everything_are_reported() {
        let dir = workspace("filtered");
        let mut config = config(&dir, FitMode::Population);
        config.filter.mag_max = Some(0.0);
        let err = run_fit(&config).unwrap_err();
        assert_eq!(err.exit_code(), 3);

        config.filter.mag_max = None;
        config.walkers = 3;
        assert_eq!(run_fit(&config).unwrap_err().exit_code(), 2);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn single_star_row_survives_filtering() {
        let dir = workspace("target-row");
        fs::write(
            dir.join("cluster.csv"),
            "id,B,B_err,V,V_err\ns0,6.5,0.5,5.5,0.5\ns1,5.5,0.05,4.5,0.05\ns2,4.5,0.05,3.5,0.05\n",
        )
        .unwrap();
        let layout = SingleStarLayout {
            star: 1,
            fit_secondary: false,
            fit_field: false,
        };
        let mut config = config(&dir, FitMode::SingleStar(layout));
        config.filter.max_uncertainty = Some(0.1);

        let (observations, stats) = load_filtered_observations(&config).unwrap();
        assert_eq!(stats.filtered, 1);
        assert_eq!(stats.target_star, Some(0));
        let FitMode::SingleStar(fitted) = fitted_mode(&config, &stats) else {
            panic!("expected a single-star mode");
        };
        assert_eq!(observations.star_label(fitted.star), "s1");

        let output = run_fit(&config).unwrap();
        assert_eq!(
            output.run.mode(),
            FitMode::SingleStar(SingleStarLayout { star: 0, ..layout })
        );

        config.mode = FitMode::SingleStar(SingleStarLayout { star: 0, ..layout });
        assert_eq!(run_fit(&config).unwrap_err().exit_code(), 3);
        config.mode = FitMode::SingleStar(SingleStarLayout { star: 7, ..layout });
        assert_eq!(run_fit(&config).unwrap_err().exit_code(), 2);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn burn_in_past_the_step_budget_fails_before_sampling() {
        let dir = workspace("burn-in");
        let mut config = config(&dir, FitMode::Population);
        config.steps = 30;
        config.burn_in = 50;
        let err = run_fit(&config).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("burn-in (50)"));
        assert!(!dir.join("chain.csv").exists());
        fs::remove_dir_all(&dir).unwrap();
    }
}
