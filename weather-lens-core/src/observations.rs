//! Loading of delimited weather observation exports (rp5.ru style).

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::debug;
use walkdir::WalkDir;

use crate::{
    config::ObservationsConfig,
    model::{Headers, ObservationTable, WeatherRecord},
};

/// `*.csv` files directly inside `dir`, sorted by path.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow!("Observation directory not found: {}", dir.display()));
    }

    let mut files = Vec::new();
    let walker =
        WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true).sort_by_file_name();
    for entry in walker {
        let entry = entry
            .with_context(|| format!("Failed to list observation directory: {}", dir.display()))?;

        let is_csv = entry.path().extension().is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if entry.file_type().is_file() && is_csv {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Parse one export: skip the preamble, take the next line as the header,
/// read the rest as records. Ragged rows and trailing delimiters are accepted.
pub fn read_table(path: &Path, config: &ObservationsConfig) -> Result<ObservationTable> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open observation file: {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut skipped = Vec::new();
    for _ in 0..config.header_skip {
        skipped.clear();
        let n = reader
            .read_until(b'\n', &mut skipped)
            .with_context(|| format!("Failed to read observation file: {}", path.display()))?;
        if n == 0 {
            return Err(anyhow!(
                "Observation file {} ends before its header row (expected {} preamble lines)",
                path.display(),
                config.header_skip
            ));
        }
    }

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(config.delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Headers = rdr
        .headers()
        .with_context(|| format!("Failed to read header row of {}", path.display()))?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect::<Vec<_>>()
        .into();

    if !headers.iter().any(|h| h == &config.time_column) {
        return Err(anyhow!(
            "Observation file {} has no '{}' column",
            path.display(),
            config.time_column
        ));
    }

    let source: Arc<Path> = path.into();
    let preamble = config.header_skip as u64;
    let mut records = Vec::new();

    for row in rdr.records() {
        let row = row.with_context(|| format!("Malformed CSV in {}", path.display()))?;
        let line = row.position().map(|p| p.line() + preamble).unwrap_or_default();
        let values = row.iter().map(str::to_string).collect();

        records.push(WeatherRecord::new(headers.clone(), values, source.clone(), line));
    }

    debug!(path = %path.display(), records = records.len(), "loaded observation table");

    Ok(ObservationTable { source: path.to_path_buf(), headers, records })
}

/// Every table in the configured directory.
pub fn load_all(config: &ObservationsConfig) -> Result<Vec<ObservationTable>> {
    list_csv_files(&config.dir)?
        .iter()
        .map(|path| read_table(path, config))
        .collect()
}

/// Parse a record's local-time cell. Missing column or bad format is `None`.
pub fn record_time(record: &WeatherRecord, config: &ObservationsConfig) -> Option<NaiveDateTime> {
    let raw = record.get(&config.time_column)?;
    NaiveDateTime::parse_from_str(raw, &config.time_format).ok()
}
