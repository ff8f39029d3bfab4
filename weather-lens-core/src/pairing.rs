use std::path::PathBuf;
use tracing::debug;

use crate::{
    config::ObservationsConfig,
    model::{ObservationTable, Pairing, PairingMap, Timeline},
    observations::record_time,
};

/// What happened to the records fed to [`build_pairings`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairingStats {
    pub records: usize,
    pub unparsable: usize,
    pub unmatched: usize,
    /// Records that produced a map entry. Can exceed the map size when
    /// several records share a timestamp.
    pub paired: usize,
}

/// Match every record of every table to a photo within `tolerance_secs`.
///
/// Records with an unreadable time or no photo in range are dropped. A
/// record whose timestamp is already in the map replaces the earlier entry.
pub fn build_pairings(
    tables: &[ObservationTable],
    images: &Timeline<PathBuf>,
    config: &ObservationsConfig,
    tolerance_secs: i64,
) -> (PairingMap, PairingStats) {
    let mut map = PairingMap::new();
    let mut stats = PairingStats::default();

    for record in tables.iter().flat_map(|t| t.records.iter()) {
        stats.records += 1;

        let Some(at) = record_time(record, config) else {
            stats.unparsable += 1;
            debug!(
                source = %record.source().display(),
                line = record.line(),
                "skipping record with unparsable time"
            );
            continue;
        };

        let Some(hit) = images.find_within(at, tolerance_secs) else {
            stats.unmatched += 1;
            continue;
        };

        stats.paired += 1;
        map.insert(at, Pairing { record: record.clone(), image: hit.item.clone() });
    }

    (map, stats)
}
