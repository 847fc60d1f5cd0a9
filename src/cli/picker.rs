//! Interactive observation file picker.
//!
//! Used when `cmdfit fit` runs without `--data`. Candidate tables (`*.csv`,
//! `*.txt`, `*.dat`) under the working directory are checked against the
//! magnitude columns named by `--band`; tables that carry every column are
//! listed first, the rest show what they lack.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::domain::BandSpec;
use crate::error::AppError;
use crate::io::data_columns;

/// Default directory recursion depth for finding data files.
const DEFAULT_SEARCH_DEPTH: usize = 4;

const DATA_EXTENSIONS: &[&str] = &["csv", "txt", "dat"];

/// A discovered table and the band columns it lacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    /// `None` when the header could not be read.
    pub missing: Option<Vec<String>>,
}

impl Candidate {
    fn usable(&self) -> bool {
        self.missing.as_ref().is_some_and(Vec::is_empty)
    }

    fn describe(&self) -> String {
        match &self.missing {
            Some(missing) if missing.is_empty() => pretty_path(&self.path),
            Some(missing) => format!("{}  (no column {})", pretty_path(&self.path), missing.join(", ")),
            None => format!("{}  (unreadable header)", pretty_path(&self.path)),
        }
    }
}

/// Magnitude columns of `bands` that `columns` does not contain.
///
/// Uncertainty columns are optional, so only magnitude columns count.
pub fn missing_band_columns(columns: &[String], bands: &[BandSpec]) -> Vec<String> {
    bands
        .iter()
        .filter(|b| !columns.iter().any(|c| c == &b.data))
        .map(|b| b.data.clone())
        .collect()
}

/// Check each path against `bands`; usable tables first, then by path.
pub fn rank_candidates(paths: Vec<PathBuf>, bands: &[BandSpec]) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = paths
        .into_iter()
        .map(|path| {
            let missing = data_columns(&path)
                .ok()
                .map(|columns| missing_band_columns(&columns, bands));
            Candidate { path, missing }
        })
        .collect();
    candidates.sort_by_key(|c| (!c.usable(), pretty_path(&c.path)));
    candidates
}

/// Prompt for an observation table carrying the magnitude columns of `bands`.
///
/// Accepts a number from the list or an explicit path; `q` cancels. A table
/// without the requested columns is refused with its actual column list.
pub fn prompt_for_data_path(bands: &[BandSpec]) -> Result<PathBuf, AppError> {
    let candidates = rank_candidates(discover_data_files(), bands);
    if candidates.is_empty() {
        return Err(AppError::new(
            2,
            "No observation tables found. Provide one with `cmdfit fit -d <file>`.",
        ));
    }

    let wanted: Vec<&str> = bands.iter().map(|b| b.data.as_str()).collect();
    let usable = candidates.iter().filter(|c| c.usable()).count();
    println!(
        "Found {} table(s), {usable} with columns [{}]:",
        candidates.len(),
        wanted.join(", ")
    );
    for (idx, candidate) in candidates.iter().enumerate() {
        println!("{:>3}) {}", idx + 1, candidate.describe());
    }

    loop {
        print!("Observation table (1-{}, a path, or q): ", candidates.len());
        io::stdout()
            .flush()
            .map_err(|e| AppError::new(2, format!("Failed to write prompt: {e}")))?;

        let mut input = String::new();
        let bytes = io::stdin()
            .read_line(&mut input)
            .map_err(|e| AppError::new(2, format!("Failed to read input: {e}")))?;

        if bytes == 0 {
            return Err(AppError::new(
                2,
                "No input received. Provide a data path with `cmdfit fit -d <file>`.",
            ));
        }

        let input = input.trim();
        if input.eq_ignore_ascii_case("q") {
            return Err(AppError::new(2, "Canceled."));
        }

        let path = match input.parse::<usize>() {
            Ok(choice) if (1..=candidates.len()).contains(&choice) => candidates[choice - 1].path.clone(),
            Ok(choice) => {
                println!("Invalid choice: {choice}. Enter a number between 1 and {}.", candidates.len());
                continue;
            }
            Err(_) => PathBuf::from(input),
        };

        match check_table(&path, bands) {
            Ok(path) => return Ok(path),
            Err(err) => println!("{err}"),
        }
    }
}

/// [`validate_data_path`] plus a header check against `bands`.
pub fn check_table(path: &Path, bands: &[BandSpec]) -> Result<PathBuf, AppError> {
    let path = validate_data_path(path)?;
    let columns = data_columns(&path)?;
    let missing = missing_band_columns(&columns, bands);
    if !missing.is_empty() {
        return Err(AppError::new(
            2,
            format!(
                "{} has no column {}; its columns are: {}",
                pretty_path(&path),
                missing.join(", "),
                columns.join(", ")
            ),
        ));
    }
    Ok(path)
}

/// Validate the provided path points to an existing file.
pub fn validate_data_path(path: &Path) -> Result<PathBuf, AppError> {
    if !path.exists() {
        return Err(AppError::new(2, format!("Data file not found: {}", path.display())));
    }
    if path.is_dir() {
        return Err(AppError::new(
            2,
            format!("Expected a file, got a directory: {}", path.display()),
        ));
    }
    Ok(path.to_path_buf())
}

/// Discover data files under the current directory (deterministic order).
pub fn discover_data_files() -> Vec<PathBuf> {
    find_data_files(Path::new("."), DEFAULT_SEARCH_DEPTH)
}

fn is_data_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DATA_EXTENSIONS.iter().any(|d| ext.eq_ignore_ascii_case(d)))
}

fn find_data_files(root: &Path, max_depth: usize) -> Vec<PathBuf> {
    let mut out = Vec::new();
    find_data_files_inner(root, 0, max_depth, &mut out);
    out.sort_by_key(|p| pretty_path(p));
    out
}

fn find_data_files_inner(root: &Path, depth: usize, max_depth: usize, out: &mut Vec<PathBuf>) {
    if depth > max_depth {
        return;
    }

    let Ok(entries) = fs::read_dir(root) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            if !should_skip_dir(&path) {
                find_data_files_inner(&path, depth + 1, max_depth, out);
            }
        } else if file_type.is_file() && is_data_file(&path) {
            out.push(path);
        }
    }
}

fn should_skip_dir(path: &Path) -> bool {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
    matches!(name, ".git" | "target" | "node_modules")
}

fn pretty_path(path: &Path) -> String {
    let stripped = path.strip_prefix("./").unwrap_or(path);
    stripped.display().to_string()
}
