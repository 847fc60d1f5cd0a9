//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments (with `.env` defaults)
//! - loads model grids and observations
//! - runs the sampler
//! - prints reports/plots
//! - writes optional exports

use std::path::PathBuf;

use clap::Parser;

use crate::cli::{Command, FitArgs, LookupArgs, SimulateArgs};
use crate::domain::{
    FitConfig, FitMode, ModeKind, ObservationFilter, SingleStarLayout, StartOverrides,
};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `cmdfit` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is fine; variables may come from the shell.
    if let Ok(path) = dotenvy::dotenv() {
        log::debug!("loaded environment from {}", path.display());
    }
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Lookup(args) => handle_lookup(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Tui(args) => handle_tui(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let data_path = resolve_data_path(&args)?;
    let config = fit_config_from_args(&args, data_path);
    let output = pipeline::run_fit(&config)?;

    println!("{}", crate::report::format_run_summary(&output, &config));

    if config.plot {
        match crate::plot::CmdAxes::for_band_count(output.observations.band_count()) {
            Some(axes) => {
                let stars = crate::plot::observed_points(&output.observations, axes);
                let track = output
                    .median()
                    .map(|p| {
                        crate::plot::isochrone_track(
                            &output.grids,
                            p.feh(),
                            p.age(),
                            axes,
                            crate::plot::TRACK_SAMPLES,
                        )
                    })
                    .unwrap_or_default();
                let (x_label, y_label) = axes.labels(output.observations.bands());
                println!("{y_label} vs {x_label}");
                println!(
                    "{}",
                    crate::plot::render_cmd(&stars, &track, config.plot_width, config.plot_height)
                );
            }
            None => log::info!("a colour-magnitude plot needs at least two bands; skipping"),
        }

        let chain = output.run.chain();
        let trace_height = (config.plot_height / 2).max(5);
        for param in 0..chain.ndim() {
            println!(
                "{}",
                crate::plot::render_trace(chain, param, config.plot_width, trace_height)
            );
        }
    }

    pipeline::write_exports(&output, &config)
}

fn handle_tui(args: FitArgs) -> Result<(), AppError> {
    let data_path = resolve_data_path(&args)?;
    let config = fit_config_from_args(&args, data_path);
    crate::tui::run(config)
}

fn handle_lookup(args: LookupArgs) -> Result<(), AppError> {
    let grids = pipeline::load_grid_set(
        &args.model.model_dir,
        &args.model.model_ext,
        args.model.corrections.as_deref(),
        args.model.distance_modulus,
        &args.bands,
    )?;
    print!(
        "{}",
        crate::report::format_lookup(&grids, args.age, args.mass, args.feh, args.secondary)
    );
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let grids = pipeline::load_grid_set(
        &args.model.model_dir,
        &args.model.model_ext,
        args.model.corrections.as_deref(),
        args.model.distance_modulus,
        &args.bands,
    )?;
    let config = crate::data::SimulationConfig {
        feh: args.feh,
        log_age: args.age,
        stars: args.stars,
        sigma: args.sigma,
        seed: args.seed,
    };
    let observations = crate::data::simulate_cluster(&grids, &config)?;
    crate::io::write_observations_csv(&args.output, &observations)?;
    println!(
        "Wrote {} stars ([Fe/H]={}, log age={}) to {}",
        observations.star_count(),
        args.feh,
        args.age,
        args.output.display()
    );
    Ok(())
}

fn resolve_data_path(args: &FitArgs) -> Result<PathBuf, AppError> {
    match &args.data {
        Some(path) => crate::cli::picker::validate_data_path(path),
        None => crate::cli::picker::prompt_for_data_path(&args.bands),
    }
}

pub fn fit_config_from_args(args: &FitArgs, data_path: PathBuf) -> FitConfig {
    let mode = match args.mode {
        ModeKind::Population => FitMode::Population,
        ModeKind::Single => FitMode::SingleStar(SingleStarLayout {
            star: args.star,
            fit_secondary: args.binary,
            fit_field: args.fit_field,
        }),
    };

    FitConfig {
        model_dir: args.model.model_dir.clone(),
        model_ext: args.model.model_ext.clone(),
        data_path,
        bands: args.bands.clone(),
        corrections: args.model.corrections.clone(),
        distance_modulus: args.model.distance_modulus,

        mode,
        p_field: args.p_field,
        filter: ObservationFilter {
            mag_min: args.mag_min,
            mag_max: args.mag_max,
            min_uncertainty: args.min_err,
            max_uncertainty: args.max_err,
        },
        mass_nodes: args.mass_nodes,

        walkers: args
            .walkers
            .unwrap_or_else(|| crate::sampler::default_walkers(&mode)),
        steps: args.steps,
        burn_in: args.burn_in,
        seed: args.seed,
        jitter: args.jitter,
        start: StartOverrides {
            feh: args.start_feh,
            age: args.start_age,
            primary_mass: args.start_mass,
            secondary_mass: args.start_secondary,
            p_field: args.start_p_field,
        },

        plot: args.plot && !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,

        export_chain: args.export_chain.clone(),
        export_run: args.export_run.clone(),
    }
}
