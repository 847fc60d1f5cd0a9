//! Run exports.
//!
//! - the flat chain as CSV (`walker,step,<params...>,ln_prob`), easy to load in
//!   spreadsheets or plotting scripts
//! - the run file as JSON (configuration echo + summaries)
//! - synthetic observations as CSV, readable by the observation loader

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::domain::{ObservationSet, RunFile};
use crate::error::AppError;
use crate::sampler::Chain;

fn create(path: &Path, what: &str) -> Result<File, AppError> {
    File::create(path).map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))
}

/// Write every sample of the chain.
pub fn write_chain_csv(path: &Path, chain: &Chain) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(create(path, "chain CSV")?);
    let write_err = |e: csv::Error| AppError::new(2, format!("Failed to write chain CSV: {e}"));

    let mut header = vec!["walker".to_string(), "step".to_string()];
    header.extend(chain.param_names().iter().cloned());
    header.push("ln_prob".to_string());
    writer.write_record(&header).map_err(write_err)?;

    for walker in 0..chain.n_walkers() {
        for step in 0..chain.n_steps() {
            let mut record = vec![walker.to_string(), step.to_string()];
            record.extend(
                (0..chain.ndim()).map(|p| format!("{:.8}", chain.get(walker, step, p))),
            );
            record.push(format!("{:.6}", chain.ln_prob(walker, step)));
            writer.write_record(&record).map_err(write_err)?;
        }
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush chain CSV: {e}")))?;
    Ok(())
}

/// Write the run file (pretty JSON).
pub fn write_run_json(path: &Path, run: &RunFile) -> Result<(), AppError> {
    let writer = BufWriter::new(create(path, "run JSON")?);
    serde_json::to_writer_pretty(writer, run)
        .map_err(|e| AppError::new(2, format!("Failed to write run JSON: {e}")))
}

pub fn read_run_json(path: &Path) -> Result<RunFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open run JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Failed to parse run JSON: {e}")))
}

/// Write observations with `<band>` / `<band>_err` columns (plus ids and true masses).
pub fn write_observations_csv(path: &Path, observations: &ObservationSet) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(create(path, "observation CSV")?);
    let write_err = |e: csv::Error| AppError::new(2, format!("Failed to write observation CSV: {e}"));

    let mut header = vec!["id".to_string()];
    for band in observations.bands() {
        header.push(band.clone());
        header.push(format!("{band}_err"));
    }
    if observations.known_masses().is_some() {
        header.push(crate::io::observations::MASS_COLUMN.to_string());
    }
    writer.write_record(&header).map_err(write_err)?;

    for star in 0..observations.star_count() {
        let mut record = vec![observations.star_label(star)];
        for band in 0..observations.band_count() {
            record.push(format!("{:.5}", observations.magnitude(band, star)));
            record.push(format!("{:.5}", observations.uncertainty(band, star)));
        }
        if let Some(masses) = observations.known_masses() {
            record.push(format!("{:.6}", masses[star]));
        }
        writer.write_record(&record).map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush observation CSV: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BandSpec, FitMode, ParamSummary};
    use chrono::Utc;

    fn tmp(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("cmdfit-{}-{name}", std::process::id()))
    }

    #[test]
    fn observations_round_trip_through_the_loader() {
        let obs = ObservationSet::new(
            vec!["B".into(), "V".into()],
            vec![vec![10.0, 11.0], vec![9.0, 10.5]],
            vec![vec![0.1, 0.1], vec![0.1, 0.2]],
        )
        .unwrap()
        .with_known_masses(vec![1.1, 0.8])
        .unwrap();
        let path = tmp("obs.csv");
        write_observations_csv(&path, &obs).unwrap();

        let bands: Vec<BandSpec> = vec!["B=B:B_err".parse().unwrap(), "V=V:V_err".parse().unwrap()];
        let back = crate::io::load_observations(&path, &bands).unwrap().observations;
        assert_eq!(back.band_magnitudes(1), &[9.0, 10.5]);
        assert_eq!(back.band_uncertainties(1), &[0.1, 0.2]);
        assert_eq!(back.known_masses().unwrap(), &[1.1, 0.8]);
        assert_eq!(back.star_label(1), "#1");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn run_file_json_round_trip() {
        let run = RunFile {
            tool: "cmdfit".into(),
            created_at: Utc::now(),
            mode: FitMode::Population,
            bands: vec!["V=V".parse().unwrap()],
            feh_grid: vec![-0.5, 0.0],
            stars: 12,
            walkers: 6,
            steps: 10,
            burn_in: 2,
            seed: 1,
            p_field: 0.25,
            acceptance_fraction: 0.4,
            summaries: vec![ParamSummary {
                name: "feh".into(),
                q16: -0.1,
                median: 0.0,
                q84: 0.1,
            }],
        };
        let path = tmp("run.json");
        write_run_json(&path, &run).unwrap();
        let back = read_run_json(&path).unwrap();
        assert_eq!(back.mode, FitMode::Population);
        assert_eq!(back.summaries, run.summaries);
        std::fs::remove_file(&path).unwrap();
    }
}
