use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

use crate::search;

/// A value tagged with the local wall-clock instant it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamped<T> {
    pub at: NaiveDateTime,
    pub item: T,
}

impl<T> Timestamped<T> {
    pub fn new(at: NaiveDateTime, item: T) -> Self {
        Self { at, item }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimelineError {
    #[error(
        "timeline is not sorted: entry {index} ({at}) is before entry {prev_index} ({prev_at})"
    )]
    Unsorted {
        index: usize,
        at: NaiveDateTime,
        prev_index: usize,
        prev_at: NaiveDateTime,
    },
}

/// Items ordered by timestamp, non-decreasing.
///
/// The only way to get one is through a constructor that sorts or
/// validates, so the search never has to check ordering itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline<T> {
    entries: Vec<Timestamped<T>>,
}

impl<T> Timeline<T> {
    /// Stable sort: entries sharing a timestamp keep their input order.
    pub fn from_unsorted(mut entries: Vec<Timestamped<T>>) -> Self {
        entries.sort_by_key(|e| e.at);
        Self { entries }
    }

    /// Wrap entries that are expected to be sorted already.
    pub fn from_sorted(entries: Vec<Timestamped<T>>) -> Result<Self, TimelineError> {
        if let Some(i) = entries.windows(2).position(|w| w[1].at < w[0].at) {
            return Err(TimelineError::Unsorted {
                index: i + 1,
                at: entries[i + 1].at,
                prev_index: i,
                prev_at: entries[i].at,
            });
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Timestamped<T>] {
        &self.entries
    }

    /// Entry found by [`search::find_within_tolerance`], if any.
    pub fn find_within(
        &self,
        target: NaiveDateTime,
        tolerance_secs: i64,
    ) -> Option<&Timestamped<T>> {
        search::find_within_tolerance(&self.entries, target, tolerance_secs)
            .map(|i| &self.entries[i])
    }
}

/// Column names of an observation table, shared by all of its rows.
pub type Headers = Arc<[String]>;

/// One raw row of an observation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherRecord {
    headers: Headers,
    values: Vec<String>,
    source: Arc<Path>,
    line: u64,
}

impl WeatherRecord {
    pub fn new(headers: Headers, values: Vec<String>, source: Arc<Path>, line: u64) -> Self {
        Self { headers, values, source, line }
    }

    /// Cell value for `column`, trimmed. Missing cells and ragged rows give `None`.
    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = self.headers.iter().position(|h| h.trim() == column)?;
        self.values.get(idx).map(|v| v.trim())
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// 1-based line number in the source file.
    pub fn line(&self) -> u64 {
        self.line
    }
}

/// A parsed observation file.
#[derive(Debug, Clone)]
pub struct ObservationTable {
    pub source: PathBuf,
    pub headers: Headers,
    pub records: Vec<WeatherRecord>,
}

/// A weather record together with the photo matched to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub record: WeatherRecord,
    pub image: PathBuf,
}

/// Weather timestamp -> matched pairing. Only matched records are present.
pub type PairingMap = BTreeMap<NaiveDateTime, Pairing>;

pub type Embedding = Vec<f32>;
