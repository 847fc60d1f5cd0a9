//! Observation table loader.
//!
//! Two layouts are accepted:
//!
//! - CSV with a header row (`.csv` files), read with the `csv` crate
//! - whitespace tables whose header is the last leading `#` comment line
//!   (or the first line when there are no comments)
//!
//! Bands are picked by column name through [`BandSpec`]. Missing uncertainty
//! columns fall back to [`NOMINAL_UNCERTAINTY`]. Rows that fail to parse are
//! skipped and reported.

use std::fs::{self, File};
use std::path::Path;

use crate::domain::{BandSpec, ObservationSet};
use crate::error::AppError;
use crate::io::RowError;

/// Photometric uncertainty assumed when the data carries none (mag).
pub const NOMINAL_UNCERTAINTY: f64 = 0.1;
/// Column holding true masses in model-test data.
pub const MASS_COLUMN: &str = "initial_mass";
const ID_COLUMNS: &[&str] = &["id", "source_id", "name", "star"];

/// Load output: observations + row accounting.
#[derive(Debug, Clone)]
pub struct ObservationLoad {
    pub observations: ObservationSet,
    pub columns: Vec<String>,
    pub rows_read: usize,
    pub row_errors: Vec<RowError>,
}

impl ObservationLoad {
    pub fn rows_used(&self) -> usize {
        self.observations.star_count()
    }
}

/// Raw table: header plus `(line, fields)` records.
struct RawTable {
    columns: Vec<String>,
    records: Vec<(usize, Result<Vec<String>, String>)>,
}

fn is_csv(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

fn read_csv(path: &Path) -> Result<RawTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open data file '{}': {e}", path.display())))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);
    let columns = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .iter()
        .map(String::from)
        .collect();

    let records = reader
        .records()
        .enumerate()
        .map(|(idx, r)| {
            // +2: header is line 1.
            let line = idx + 2;
            (
                line,
                r.map(|rec| rec.iter().map(String::from).collect())
                    .map_err(|e| format!("CSV parse error: {e}")),
            )
        })
        .collect();
    Ok(RawTable { columns, records })
}

fn parse_whitespace(text: &str) -> RawTable {
    let mut columns: Vec<String> = Vec::new();
    let mut records = Vec::new();
    let mut in_preamble = true;

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('#') {
            if in_preamble {
                let tokens: Vec<String> = comment.split_whitespace().map(String::from).collect();
                if !tokens.is_empty() {
                    columns = tokens;
                }
            }
            continue;
        }
        if in_preamble {
            in_preamble = false;
            if columns.is_empty() {
                columns = trimmed.split_whitespace().map(String::from).collect();
                continue;
            }
        }
        records.push((idx + 1, Ok(trimmed.split_whitespace().map(String::from).collect())));
    }
    RawTable { columns, records }
}

fn read_table(path: &Path) -> Result<RawTable, AppError> {
    if is_csv(path) {
        return read_csv(path);
    }
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::new(2, format!("Failed to read data file '{}': {e}", path.display())))?;
    Ok(parse_whitespace(&text))
}

/// Column names of a data file (for pickers and error messages).
pub fn data_columns(path: &Path) -> Result<Vec<String>, AppError> {
    Ok(read_table(path)?.columns)
}

/// Load the columns named in `bands` from `path`.
pub fn load_observations(path: &Path, bands: &[BandSpec]) -> Result<ObservationLoad, AppError> {
    let table = read_table(path)?;
    build_observations(table, bands, &path.display().to_string())
}

/// Same as [`load_observations`] for an in-memory whitespace table.
pub fn parse_observations(text: &str, bands: &[BandSpec]) -> Result<ObservationLoad, AppError> {
    build_observations(parse_whitespace(text), bands, "<text>")
}

struct BandColumns {
    magnitude: usize,
    error: Option<usize>,
}

/// Magnitudes, uncertainties and optional true mass of one row.
type ParsedRow = (Vec<f64>, Vec<f64>, Option<f64>);

fn parse_record(
    fields: &[String],
    columns: &[String],
    band_cols: &[BandColumns],
    mass_col: Option<usize>,
) -> Result<ParsedRow, String> {
    let number = |i: usize| -> Result<f64, String> {
        let raw = fields
            .get(i)
            .ok_or_else(|| format!("missing column '{}'", columns[i]))?;
        raw.parse::<f64>()
            .map_err(|_| format!("column '{}': cannot parse '{raw}'", columns[i]))
    };

    let mut mags = Vec::with_capacity(band_cols.len());
    let mut errs = Vec::with_capacity(band_cols.len());
    for cols in band_cols {
        mags.push(number(cols.magnitude)?);
        errs.push(match cols.error {
            Some(i) => number(i)?,
            None => NOMINAL_UNCERTAINTY,
        });
    }
    let mass = mass_col.map(number).transpose()?;
    Ok((mags, errs, mass))
}

fn build_observations(table: RawTable, bands: &[BandSpec], source: &str) -> Result<ObservationLoad, AppError> {
    if bands.is_empty() {
        return Err(AppError::new(2, "At least one --band is required."));
    }
    let find = |name: &str| table.columns.iter().position(|c| c == name);
    let missing = |name: &str| {
        AppError::new(
            2,
            format!(
                "Column '{name}' not found in {source}. Available: {}",
                table.columns.join(", ")
            ),
        )
    };

    let band_cols = bands
        .iter()
        .map(|b| {
            let magnitude = find(b.data.as_str()).ok_or_else(|| missing(b.data.as_str()))?;
            let error = match &b.error {
                Some(err) => Some(find(err.as_str()).ok_or_else(|| missing(err.as_str()))?),
                None => None,
            };
            Ok(BandColumns { magnitude, error })
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    if band_cols.iter().any(|b| b.error.is_none()) {
        log::info!("{source}: no uncertainty column for some bands, using {NOMINAL_UNCERTAINTY} mag");
    }
    let mass_col = find(MASS_COLUMN);
    let id_col = ID_COLUMNS.iter().find_map(|c| find(*c));

    let n_bands = bands.len();
    let mut magnitudes = vec![Vec::new(); n_bands];
    let mut uncertainties = vec![Vec::new(); n_bands];
    let mut masses = Vec::new();
    let mut ids = Vec::new();
    let mut row_errors = Vec::new();
    let rows_read = table.records.len();

    for (line, record) in table.records {
        let fields = match record {
            Ok(f) => f,
            Err(message) => {
                row_errors.push(RowError { line, message });
                continue;
            }
        };
        let parsed = parse_record(&fields, &table.columns, &band_cols, mass_col);

        match parsed {
            Ok((mags, errs, mass)) => {
                for (band, (m, e)) in mags.into_iter().zip(errs).enumerate() {
                    magnitudes[band].push(m);
                    uncertainties[band].push(e);
                }
                if let Some(m) = mass {
                    masses.push(m);
                }
                if let Some(i) = id_col {
                    ids.push(fields.get(i).cloned().unwrap_or_default());
                }
            }
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if !row_errors.is_empty() {
        log::warn!(
            "{source}: skipped {} of {rows_read} rows (first: line {}: {})",
            row_errors.len(),
            row_errors[0].line,
            row_errors[0].message
        );
    }

    let names = bands.iter().map(|b| b.model.clone()).collect();
    let mut observations = ObservationSet::new(names, magnitudes, uncertainties)?;
    if observations.star_count() == 0 {
        return Err(AppError::new(3, format!("No usable rows in {source}.")));
    }
    if mass_col.is_some() {
        observations = observations.with_known_masses(masses)?;
    }
    if id_col.is_some() {
        observations = observations.with_ids(ids)?;
    }

    Ok(ObservationLoad {
        observations,
        columns: table.columns,
        rows_read,
        row_errors,
    })
}
