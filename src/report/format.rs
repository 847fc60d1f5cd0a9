//! Formatted terminal output.
//!
//! Formatting lives in one place so the fitting code stays free of presentation
//! and output changes are localized.

use crate::app::pipeline::RunOutput;
use crate::domain::{FitConfig, FitMode, ParamSummary, Params};
use crate::isochrone::GridSet;

/// Format the full run summary (inputs + sampler diagnostics + posterior table).
pub fn format_run_summary(output: &RunOutput, config: &FitConfig) -> String {
    let mut out = String::new();
    let chain = output.run.chain();

    out.push_str("=== cmdfit - isochrone fit ===\n");
    out.push_str(&format!(
        "Mode: {} ({} parameters)\n",
        config.mode.display_name(),
        config.mode.ndim()
    ));
    if let FitMode::SingleStar(layout) = output.run.mode() {
        out.push_str(&format!(
            "Star: {} | secondary={} | field={}\n",
            output.observations.star_label(layout.star),
            if layout.fit_secondary { "sampled" } else { "none" },
            if layout.fit_field {
                "sampled".to_string()
            } else {
                format!("{:.2}", config.p_field)
            },
        ));
    } else {
        out.push_str(&format!("P_field: {:.2}\n", config.p_field));
    }

    let (feh_lo, feh_hi) = output.grids.feh_range();
    let (age_lo, age_hi) = output.grids.age_range();
    out.push_str(&format!(
        "Grids: n={} | [Fe/H]=[{feh_lo:.2}, {feh_hi:.2}] | log age=[{age_lo:.2}, {age_hi:.2}]\n",
        output.grids.grids().len(),
    ));
    out.push_str(&format!("Bands: {}\n", output.observations.bands().join(", ")));
    out.push_str(&format!(
        "Stars: n={} | read={} | unreadable={} | filtered={}\n",
        output.observations.star_count(),
        output.stats.rows_read,
        output.stats.rows_skipped,
        output.stats.filtered,
    ));
    out.push_str(&format!(
        "Sampler: walkers={} | steps={} | burn-in={} | seed={}\n",
        chain.n_walkers(),
        chain.n_steps(),
        config.burn_in,
        config.seed,
    ));
    out.push_str(&format!("Mean acceptance: {:.3}\n", chain.mean_acceptance()));
    let low = chain.acceptance_fractions().iter().filter(|&&a| a < 0.1).count();
    if low > 0 {
        out.push_str(&format!("  ({low} walkers accepted < 10% of proposals)\n"));
    }

    out.push_str("\nPosterior (16th / 50th / 84th percentiles):\n");
    out.push_str(&format_summary_table(&output.summaries));

    if let Some((params, lp)) = &output.best {
        out.push_str(&format!("\nBest sample (ln p = {lp:.3}): {}\n", fmt_params(params)));
    }
    out.push('\n');

    out
}

/// Format a posterior summary table.
pub fn format_summary_table(summaries: &[ParamSummary]) -> String {
    let mut out = String::new();
    out.push_str(format!("{:<16} {:>10} {:>10} {:>10} {:>10}", "param", "q16", "median", "q84", "+/-").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<16} {:-<10} {:-<10} {:-<10} {:-<10}", "", "", "", "", "").trim_end());
    out.push('\n');
    for s in summaries {
        out.push_str(
            format!(
                "{:<16} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                s.name,
                s.q16,
                s.median,
                s.q84,
                s.sigma()
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Format a magnitude lookup: one line per band.
pub fn format_lookup(grids: &GridSet, age: f64, mass: f64, feh: f64, secondary_mass: Option<f64>) -> String {
    let mut out = String::new();
    out.push_str(&format!("log age={age:.3} | mass={mass:.4} | [Fe/H]={feh:.3}"));
    if let Some(m2) = secondary_mass {
        out.push_str(&format!(" | secondary={m2:.4}"));
    }
    out.push('\n');
    for (band, name) in grids.bands().iter().enumerate() {
        let value = match grids.magnitude_at(age, mass, feh, band, secondary_mass) {
            Some(m) => format!("{m:.4}"),
            None => "out of range".to_string(),
        };
        out.push_str(&format!("{name:<24} {value}\n"));
    }
    out
}

fn fmt_params(params: &Params) -> String {
    match params {
        Params::Population(p) => format!("[Fe/H]={:.4}, log age={:.4}", p.feh, p.age),
        Params::SingleStar(p) => {
            let mut s = format!("[Fe/H]={:.4}, log age={:.4}, m1={:.4}", p.feh, p.age, p.primary_mass);
            if let Some(m2) = p.secondary_mass {
                s.push_str(&format!(", m2={m2:.4}"));
            }
            if let Some(pf) = p.p_field {
                s.push_str(&format!(", P_field={pf:.3}"));
            }
            s
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PopulationParams, SingleStarParams};
    use crate::isochrone::grid::fixtures::two_age_grid;

    #[test]
    fn summary_table_layout() {
        let table = format_summary_table(&[ParamSummary {
            name: "feh".into(),
            q16: -0.1,
            median: 0.05,
            q84: 0.2,
        }]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("param"));
        assert!(lines[1].starts_with("----------------"));
        assert_eq!(lines[2], "feh                 -0.1000     0.0500     0.2000     0.1500");
    }

    #[test]
    fn lookup_reports_out_of_range_bands() {
        let grids = GridSet::new(vec![two_age_grid(0.0, 0.0), two_age_grid(1.0, 1.0)]).unwrap();
        let txt = format_lookup(&grids, 8.0, 1.0, 0.5, None);
        assert!(txt.contains("B                        4.5000"));
        let txt = format_lookup(&grids, 8.0, 3.0, 0.5, None);
        assert!(txt.contains("B                        out of range"));
        let txt = format_lookup(&grids, 8.0, 1.0, 0.0, Some(1.0));
        assert!(txt.contains("secondary=1.0000"));
        assert!(txt.contains("3.2474"));
    }

    #[test]
    fn params_are_labelled() {
        let p = Params::Population(PopulationParams { feh: 0.1, age: 9.0 });
        assert_eq!(fmt_params(&p), "[Fe/H]=0.1000, log age=9.0000");
        let p = Params::SingleStar(SingleStarParams {
            feh: 0.0,
            age: 8.5,
            primary_mass: 1.0,
            secondary_mass: Some(0.4),
            p_field: None,
        });
        assert!(fmt_params(&p).ends_with("m1=1.0000, m2=0.4000"));
    }
}
