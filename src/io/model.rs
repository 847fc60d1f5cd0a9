//! MIST-style `.cmd` model grid loader.
//!
//! A `.cmd` file is a whitespace table with `#` comment blocks. We need three
//! things out of it:
//!
//! - the metallicity: the comment line after the `Yinit Zinit [Fe/H] ...` header
//!   carries the values, `[Fe/H]` is read from the matching position
//! - the column header: the last comment line before the first data line
//! - the data rows: age, initial mass and the requested band columns
//!
//! Lines that fail to parse are skipped and reported, never fatal.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::io::RowError;
use crate::io::corrections::MagnitudeCorrection;
use crate::isochrone::{GridSet, ModelGrid, ModelRow};

pub const AGE_COLUMN: &str = "log10_isochrone_age_yr";
pub const MASS_COLUMN: &str = "initial_mass";
const AGE_FALLBACK: usize = 1;
const MASS_FALLBACK: usize = 2;

/// MIST columns that are not photometric bands.
const NON_BAND_COLUMNS: &[&str] = &[
    "EEP",
    AGE_COLUMN,
    MASS_COLUMN,
    "star_mass",
    "log_Teff",
    "log_g",
    "log_L",
    "[Fe/H]_init",
    "[Fe/H]",
    "phase",
];

/// One parsed model file.
#[derive(Debug, Clone)]
pub struct ModelLoad {
    pub path: Option<PathBuf>,
    pub grid: ModelGrid,
    pub rows_read: usize,
    pub row_errors: Vec<RowError>,
}

#[derive(Debug, Default)]
struct Header {
    feh: Option<f64>,
    columns: Vec<String>,
}

fn comment_tokens(line: &str) -> Vec<&str> {
    line.trim_start()
        .trim_start_matches('#')
        .split_whitespace()
        .collect()
}

/// Scan the leading comment blocks of a model file.
fn scan_header(text: &str) -> Header {
    let mut header = Header::default();
    let mut feh_position: Option<usize> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with('#') {
            break;
        }
        let tokens = comment_tokens(trimmed);
        if let Some(pos) = feh_position.take() {
            header.feh = tokens.get(pos).and_then(|t| t.parse().ok());
        }
        if tokens.contains(&"Yinit") {
            feh_position = tokens.iter().position(|t| *t == "[Fe/H]");
        }
        // Separator lines (`# -----`) are never the column header.
        if !tokens.is_empty() && !tokens[0].starts_with("---") {
            header.columns = tokens.iter().map(|t| t.to_string()).collect();
        }
    }
    header
}

/// Photometric band columns of a model file.
pub fn band_columns(columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| !NON_BAND_COLUMNS.contains(&c.as_str()))
        .cloned()
        .collect()
}

fn read_text(path: &Path) -> Result<String, AppError> {
    fs::read_to_string(path)
        .map_err(|e| AppError::new(2, format!("Failed to read model file '{}': {e}", path.display())))
}

fn parse_row(tokens: &[&str], age_idx: usize, mass_idx: usize, band_idx: &[usize]) -> Result<ModelRow, String> {
    let value = |i: usize| -> Result<f64, String> {
        let tok = tokens.get(i).ok_or_else(|| format!("missing column {i}"))?;
        tok.parse::<f64>()
            .map_err(|_| format!("column {i}: cannot parse '{tok}'"))
    };
    let magnitudes = band_idx.iter().map(|&i| value(i)).collect::<Result<Vec<_>, _>>()?;
    Ok(ModelRow {
        log_age: value(age_idx)?,
        initial_mass: value(mass_idx)?,
        magnitudes,
    })
}

/// Parse the text of one model file.
///
/// `bands` selects columns by header name; an empty list means every band column.
pub fn parse_model_grid(
    text: &str,
    bands: &[String],
    correction: Option<&MagnitudeCorrection>,
    source: &str,
) -> Result<ModelLoad, AppError> {
    let header = scan_header(text);
    let feh = header.feh.ok_or_else(|| {
        AppError::new(2, format!("Model file {source}: no [Fe/H] value after the Yinit/Zinit header."))
    })?;

    let find = |name: &str| header.columns.iter().position(|c| c == name);
    let age_idx = find(AGE_COLUMN).unwrap_or(AGE_FALLBACK);
    let mass_idx = find(MASS_COLUMN).unwrap_or(MASS_FALLBACK);

    let bands: Vec<String> = if bands.is_empty() {
        band_columns(&header.columns)
    } else {
        bands.to_vec()
    };
    if bands.is_empty() {
        return Err(AppError::new(2, format!("Model file {source}: no band columns found.")));
    }
    let band_idx = bands
        .iter()
        .map(|b| {
            find(b.as_str()).ok_or_else(|| {
                AppError::new(
                    2,
                    format!(
                        "Model file {source}: band '{b}' not in header. Available: {}",
                        band_columns(&header.columns).join(", ")
                    ),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        rows_read += 1;
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let parsed = parse_row(&tokens, age_idx, mass_idx, &band_idx);

        match parsed {
            Ok(row) => rows.push(row),
            Err(message) => row_errors.push(RowError {
                line: idx + 1,
                message,
            }),
        }
    }

    if !row_errors.is_empty() {
        log::warn!(
            "model file {source}: skipped {} of {rows_read} rows (first: line {}: {})",
            row_errors.len(),
            row_errors[0].line,
            row_errors[0].message
        );
    }

    if let Some(corr) = correction {
        corr.apply_rows(&bands, &mut rows);
    }

    let grid = ModelGrid::new(feh, bands, rows)
        .map_err(|e| AppError::new(3, format!("Model file {source}: {e}")))?;
    log::debug!(
        "model file {source}: [Fe/H]={feh}, {} ages, {} rows",
        grid.ages().len(),
        grid.row_count()
    );

    Ok(ModelLoad {
        path: None,
        grid,
        rows_read,
        row_errors,
    })
}

pub fn read_model_file(
    path: &Path,
    bands: &[String],
    correction: Option<&MagnitudeCorrection>,
) -> Result<ModelLoad, AppError> {
    let text = read_text(path)?;
    let mut load = parse_model_grid(&text, bands, correction, &path.display().to_string())?;
    load.path = Some(path.to_path_buf());
    Ok(load)
}

/// Model files with extension `ext` in `dir`, sorted by path.
pub fn model_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, AppError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| AppError::new(2, format!("Failed to read model directory '{}': {e}", dir.display())))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|x| x == ext))
        .collect();
    files.sort();
    Ok(files)
}

/// Load every model file in `dir` into a [`GridSet`].
pub fn load_model_dir(
    dir: &Path,
    ext: &str,
    bands: &[String],
    correction: Option<&MagnitudeCorrection>,
) -> Result<GridSet, AppError> {
    let files = model_files(dir, ext)?;
    if files.is_empty() {
        return Err(AppError::new(
            3,
            format!("No *.{ext} model files in '{}'.", dir.display()),
        ));
    }

    let mut grids = Vec::with_capacity(files.len());
    for path in &files {
        grids.push(read_model_file(path, bands, correction)?.grid);
    }
    let set = GridSet::new(grids)?;
    let (age_lo, age_hi) = set.age_range();
    log::info!(
        "loaded {} model grids from {}: [Fe/H] {:?}, log age {age_lo}..{age_hi}",
        files.len(),
        dir.display(),
        set.feh_list()
    );
    Ok(set)
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// A small MIST-like file: two ages, three masses, bands B and V.
    pub fn mist_text(feh: f64, offset: f64) -> String {
        let mut s = String::new();
        s.push_str("# MIST version number  = 1.2\n");
        s.push_str("# --------------------------------------------------------------------------------------\n");
        s.push_str("#  Yinit        Zinit   [Fe/H]   [a/Fe]  v/vcrit\n");
        s.push_str(&format!("#  0.2703  1.42857E-02   {feh:5.2}     0.00     0.40\n"));
        s.push_str("# --------------------------------------------------------------------------------------\n");
        s.push_str("# number of isochrones =    2\n");
        s.push_str("#    1   2   3   4   5   6\n");
        s.push_str("#   EEP   log10_isochrone_age_yr   initial_mass   star_mass   Bessell_B   Bessell_V\n");
        for (age, shift) in [(8.0, 0.0), (9.0, 1.0)] {
            for (mass, b, v) in [(0.5, 6.0, 5.0), (1.0, 5.0, 4.0), (1.5, 4.0, 3.0)] {
                s.push_str(&format!(
                    "  202  {age:.6E}  {mass:.6E}  {mass:.4}  {:.4}  {:.4}\n",
                    b + shift + offset,
                    v + shift + offset
                ));
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::mist_text;
    use super::*;

    fn bands() -> Vec<String> {
        vec!["Bessell_B".into(), "Bessell_V".into()]
    }

    #[test]
    fn parses_metadata_header_and_rows() {
        let load = parse_model_grid(&mist_text(-0.25, 0.0), &bands(), None, "test").unwrap();
        assert_eq!(load.grid.feh(), -0.25);
        assert_eq!(load.rows_read, 6);
        assert!(load.row_errors.is_empty());
        assert_eq!(load.grid.ages(), &[8.0, 9.0]);
        assert_eq!(load.grid.get_magnitude(1.0, 9.0, 1), 5.0);
        assert_eq!(load.grid.bands(), bands().as_slice());
    }

    #[test]
    fn empty_band_list_selects_photometric_columns() {
        let load = parse_model_grid(&mist_text(0.0, 0.0), &[], None, "test").unwrap();
        assert_eq!(load.grid.bands(), bands().as_slice());
    }

    #[test]
    fn bad_rows_are_skipped_and_reported() {
        let mut text = mist_text(0.0, 0.0);
        text.push_str("  202  9.5E+00  oops  1.0  1.0  1.0\n");
        text.push_str("  202  9.5E+00\n");
        let load = parse_model_grid(&text, &bands(), None, "test").unwrap();
        assert_eq!(load.rows_read, 8);
        assert_eq!(load.row_errors.len(), 2);
        assert_eq!(load.grid.row_count(), 6);
    }

    #[test]
    fn unknown_band_and_missing_metallicity_fail() {
        let err = parse_model_grid(&mist_text(0.0, 0.0), &["Gaia_G".into()], None, "test").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("Bessell_B"));

        let text = "# EEP log10_isochrone_age_yr initial_mass V\n 1 8.0 1.0 4.0\n";
        assert!(parse_model_grid(text, &[], None, "test").is_err());
    }

    #[test]
    fn header_fallback_columns() {
        let text = "#  Yinit Zinit [Fe/H]\n#  0.27 0.014 0.10\n# a b c V\n 1 8.0 1.0 4.0\n 1 8.0 2.0 3.0\n";
        let load = parse_model_grid(text, &["V".into()], None, "test").unwrap();
        assert_eq!(load.grid.feh(), 0.1);
        assert_eq!(load.grid.mass_range(), (1.0, 2.0));
    }

    #[test]
    fn loads_a_directory_in_sorted_order() {
        let dir = std::env::temp_dir().join(format!("cmdfit-models-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("b.cmd"), mist_text(0.5, 0.5)).unwrap();
        fs::write(dir.join("a.cmd"), mist_text(-0.5, -0.5)).unwrap();
        fs::write(dir.join("notes.txt"), "ignore me").unwrap();

        let files = model_files(&dir, "cmd").unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.cmd"));

        let set = load_model_dir(&dir, "cmd", &bands(), None).unwrap();
        assert_eq!(set.feh_list(), &[-0.5, 0.5]);
        assert!((set.get_magnitude_at(8.0, 1.0, 0.0, 1, None) - 4.0).abs() < 1e-12);
        assert!(load_model_dir(&dir, "iso", &bands(), None).is_err());

        fs::remove_dir_all(&dir).unwrap();
    }
}
