//! Reporting utilities: posterior summaries and formatted terminal output.

use crate::domain::{FitMode, ParamSummary};
use crate::error::AppError;
use crate::math::quantile_sorted;
use crate::sampler::Chain;

pub mod format;

pub use format::{format_lookup, format_run_summary, format_summary_table};

/// 16th / 50th / 84th percentiles of every parameter after `burn_in` steps.
pub fn summarize(chain: &Chain, mode: &FitMode, burn_in: usize) -> Result<Vec<ParamSummary>, AppError> {
    if chain.ndim() != mode.ndim() {
        return Err(AppError::new(
            4,
            format!(
                "Chain has {} parameters but the {} fit samples {}.",
                chain.ndim(),
                mode.display_name(),
                mode.ndim()
            ),
        ));
    }
    if burn_in >= chain.n_steps() {
        return Err(AppError::new(
            2,
            format!("Burn-in ({burn_in}) must be smaller than the number of steps ({}).", chain.n_steps()),
        ));
    }

    chain
        .param_names()
        .iter()
        .enumerate()
        .map(|(param, name)| {
            let mut values: Vec<f64> = chain
                .flat_param(param, burn_in)
                .into_iter()
                .filter(|v| v.is_finite())
                .collect();
            values.sort_by(f64::total_cmp);
            let q = |p: f64| {
                quantile_sorted(&values, p)
                    .ok_or_else(|| AppError::new(4, format!("No finite samples for '{name}'.")))
            };
            Ok(ParamSummary {
                name: name.clone(),
                q16: q(0.16)?,
                median: q(0.5)?,
                q84: q(0.84)?,
            })
        })
        .collect()
}
