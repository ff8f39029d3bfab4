//! The batch run: scan, load, pair, embed, query.

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use crate::{
    Config,
    describe::describe,
    embedding::Embedder,
    images::scan_images,
    model::{Embedding, PairingMap},
    observations,
    pairing::{PairingStats, build_pairings},
    similarity::rank,
};

/// Output of the pairing stage.
#[derive(Debug, Clone)]
pub struct PairingReport {
    pub tables: usize,
    pub images_found: usize,
    pub images_timestamped: usize,
    pub stats: PairingStats,
    pub pairings: PairingMap,
}

/// Scan photos and observations and pair them up. No model involved.
pub fn pair_only(config: &Config) -> Result<PairingReport> {
    let scan = scan_images(&config.images)?;
    info!(
        found = scan.files_found,
        timestamped = scan.timeline.len(),
        "scanned images in {}",
        config.images.dir.display()
    );

    let tables = observations::load_all(&config.observations)?;
    info!(
        tables = tables.len(),
        "loaded observations from {}",
        config.observations.dir.display()
    );

    let tolerance = config.matching.tolerance_secs;
    let (pairings, stats) =
        build_pairings(&tables, &scan.timeline, &config.observations, tolerance);
    info!(
        records = stats.records,
        paired = pairings.len(),
        unparsable = stats.unparsable,
        unmatched = stats.unmatched,
        "built weather-image pairings"
    );

    Ok(PairingReport {
        tables: tables.len(),
        images_found: scan.files_found,
        images_timestamped: scan.timeline.len(),
        stats,
        pairings,
    })
}

/// Which pairing to use as the query image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    /// Position in timestamp order.
    Index(usize),
    /// Uniformly random, optionally seeded.
    Random { seed: Option<u64> },
}

impl Default for Sample {
    fn default() -> Self {
        Sample::Random { seed: None }
    }
}

/// Best text match for the sampled image.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub image: PathBuf,
    pub observed_at: NaiveDateTime,
    pub own_description: String,
    pub best_description: String,
    pub best_observed_at: NaiveDateTime,
    pub probability: f32,
}

impl QueryOutcome {
    /// Whether the winning description is the one generated for the image's own record.
    pub fn matches_own_record(&self) -> bool {
        self.best_observed_at == self.observed_at
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub tables: usize,
    pub images_found: usize,
    pub images_timestamped: usize,
    pub records: usize,
    pub pairings: usize,
    pub images_embedded: usize,
    pub descriptions_embedded: usize,
    pub query: Option<QueryOutcome>,
}

/// Full run. `embedder` is created once by the caller and shared by every call.
pub async fn run(config: &Config, embedder: &dyn Embedder, sample: Sample) -> Result<RunSummary> {
    let report = pair_only(config)?;
    let entries: Vec<_> = report.pairings.iter().collect();

    info!(model = embedder.model_name(), images = entries.len(), "embedding paired images");
    let mut image_vectors: Vec<Embedding> = Vec::with_capacity(entries.len());
    for (_, pairing) in &entries {
        let v = embedder
            .embed_image(&pairing.image)
            .await
            .with_context(|| format!("Failed to embed image {}", pairing.image.display()))?;
        image_vectors.push(v);
    }

    let descriptions: Vec<String> =
        entries.iter().map(|(_, p)| describe(&p.record, &config.description)).collect();
    info!(descriptions = descriptions.len(), "embedding weather descriptions");
    let text_vectors =
        embedder.embed_texts(&descriptions).await.context("Failed to embed descriptions")?;
    if text_vectors.len() != descriptions.len() {
        return Err(anyhow!(
            "Embedder {} returned {} vectors for {} descriptions",
            embedder.model_name(),
            text_vectors.len(),
            descriptions.len()
        ));
    }

    let query = match pick_sample(entries.len(), sample)? {
        None => None,
        Some(i) => {
            let ranking = rank(&image_vectors[i], &text_vectors, config.embedder.logit_scale)?;
            let best = ranking.best.ok_or_else(|| anyhow!("No descriptions to rank"))?;

            let (observed_at, pairing) = entries[i];
            let outcome = QueryOutcome {
                image: pairing.image.clone(),
                observed_at: *observed_at,
                own_description: descriptions[i].clone(),
                best_description: descriptions[best].clone(),
                best_observed_at: *entries[best].0,
                probability: ranking.probabilities[best],
            };
            info!(
                image = %outcome.image.display(),
                probability = outcome.probability,
                own = outcome.matches_own_record(),
                "ranked descriptions for sample image"
            );
            Some(outcome)
        }
    };

    Ok(RunSummary {
        tables: report.tables,
        images_found: report.images_found,
        images_timestamped: report.images_timestamped,
        records: report.stats.records,
        pairings: entries.len(),
        images_embedded: image_vectors.len(),
        descriptions_embedded: text_vectors.len(),
        query,
    })
}

fn pick_sample(len: usize, sample: Sample) -> Result<Option<usize>> {
    if len == 0 {
        return Ok(None);
    }

    match sample {
        Sample::Index(i) if i < len => Ok(Some(i)),
        Sample::Index(i) => Err(anyhow!("Sample index {i} is out of range ({len} pairings)")),
        Sample::Random { seed: Some(seed) } => {
            Ok(Some(fastrand::Rng::with_seed(seed).usize(..len)))
        }
        Sample::Random { seed: None } => Ok(Some(fastrand::usize(..len))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ImagesConfig, ObservationsConfig},
        images::tests::jpeg_with_capture_time,
        observations::tests::rp5_file,
    };
    use async_trait::async_trait;
    use std::{fs, path::Path, sync::Mutex};
    use tempfile::TempDir;

    /// One-hot vectors keyed on the hour: `h12.jpg` and a description
    /// ending in "12:00." land on the same axis.
    #[derive(Debug, Default)]
    struct HourEmbedder {
        calls: Mutex<Vec<String>>,
    }

    fn one_hot(hour: usize) -> Embedding {
        let mut v = vec![0.0; 24];
        v[hour] = 1.0;
        v
    }

    #[async_trait]
    impl Embedder for HourEmbedder {
        fn model_name(&self) -> &str {
            "hour"
        }

        async fn embed_image(&self, path: &Path) -> anyhow::Result<Embedding> {
            self.calls.lock().unwrap().push(format!("image:{}", path.display()));
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            Ok(one_hot(stem.trim_start_matches('h').parse()?))
        }

        async fn embed_text(&self, text: &str) -> anyhow::Result<Embedding> {
            self.calls.lock().unwrap().push(format!("text:{text}"));
            let clock = text.rsplit(' ').next().unwrap_or_default();
            Ok(one_hot(clock.split(':').next().unwrap_or_default().parse()?))
        }
    }

    /// Photos at 06:00, 12:00 and 18:00 plus one without EXIF. Records at the
    /// same three hours, one a day later and one unparsable row.
    fn fixture() -> (TempDir, Config) {
        let root = tempfile::tempdir().unwrap();
        let images = root.path().join("images");
        let obs = root.path().join("observations");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&obs).unwrap();

        for h in [6, 12, 18] {
            let stamp = format!("2023:01:15 {h:02}:00:00");
            fs::write(images.join(format!("h{h}.jpg")), jpeg_with_capture_time(&stamp)).unwrap();
        }
        fs::write(images.join("h0.jpg"), b"no exif here").unwrap();

        fs::write(
            obs.join("moscow.csv"),
            rp5_file(&[
                "\"15.01.2023 18:00\";\"-2\";\"\";\"\";\"\";",
                "\"15.01.2023 12:00\";\"-1\";\"\";\"\";\"\";",
                "\"garbage\";\"0\";\"\";\"\";\"\";",
                "\"15.01.2023 06:00\";\"-5\";\"\";\"\";\"\";",
                "\"16.01.2023 06:00\";\"-7\";\"\";\"\";\"\";",
            ]),
        )
        .unwrap();

        let mut config = Config {
            images: ImagesConfig { dir: images, ..ImagesConfig::default() },
            observations: ObservationsConfig { dir: obs, ..ObservationsConfig::default() },
            ..Config::default()
        };
        config.matching.tolerance_secs = 0;
        config.description.prefix = String::new();
        config.description.columns = vec![crate::config::DescribedColumn {
            column: "Local time in Moscow".into(),
            label: "Hour".into(),
            suffix: String::new(),
        }];

        (root, config)
    }

    #[test]
    fn pair_only_counts_every_stage() {
        let (_root, config) = fixture();

        let report = pair_only(&config).unwrap();

        assert_eq!(report.tables, 1);
        assert_eq!(report.images_found, 4);
        assert_eq!(report.images_timestamped, 3);
        assert_eq!(report.stats.records, 5);
        assert_eq!(report.stats.unparsable, 1);
        assert_eq!(report.stats.unmatched, 1);
        assert_eq!(report.pairings.len(), 3);
    }

    #[test]
    fn pair_only_fails_on_missing_directory() {
        let (root, mut config) = fixture();
        config.observations.dir = root.path().join("nope");

        let err = pair_only(&config).unwrap_err();
        assert!(err.to_string().contains("Observation directory not found"));
    }

    #[tokio::test]
    async fn run_embeds_each_pairing_once_and_ranks_sample() {
        let (_root, config) = fixture();

        let embedder = HourEmbedder::default();
        let summary = run(&config, &embedder, Sample::Index(1)).await.unwrap();

        assert_eq!(summary.tables, 1);
        assert_eq!(summary.records, 5);
        assert_eq!(summary.pairings, 3);
        assert_eq!(summary.images_embedded, 3);
        assert_eq!(summary.descriptions_embedded, 3);

        let calls = embedder.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|c| c.starts_with("image:")).count(), 3);
        assert_eq!(calls.iter().filter(|c| c.starts_with("text:")).count(), 3);

        let query = summary.query.expect("sampled");
        assert!(query.image.ends_with("h12.jpg"));
        assert_eq!(query.own_description, "Hour: 15.01.2023 12:00.");
        assert_eq!(query.best_description, query.own_description);
        assert!(query.matches_own_record());
        assert!(query.probability > 0.99);
    }

    #[tokio::test]
    async fn run_without_pairings_has_no_query() {
        let (_root, mut config) = fixture();
        config.observations.time_column = "T".into();

        let summary = run(&config, &HourEmbedder::default(), Sample::default()).await.unwrap();

        assert_eq!(summary.pairings, 0);
        assert!(summary.query.is_none());
    }

    /// Drops the last description from every batch.
    #[derive(Debug, Default)]
    struct ShortBatchEmbedder(HourEmbedder);

    #[async_trait]
    impl Embedder for ShortBatchEmbedder {
        fn model_name(&self) -> &str {
            "short-batch"
        }

        async fn embed_image(&self, path: &Path) -> anyhow::Result<Embedding> {
            self.0.embed_image(path).await
        }

        async fn embed_text(&self, text: &str) -> anyhow::Result<Embedding> {
            self.0.embed_text(text).await
        }

        async fn embed_texts(&self, texts: &[String]) -> anyhow::Result<Vec<Embedding>> {
            let mut out = Vec::new();
            for text in texts.iter().skip(1) {
                out.push(self.0.embed_text(text).await?);
            }
            Ok(out)
        }
    }

    #[tokio::test]
    async fn run_rejects_short_description_batch() {
        let (_root, config) = fixture();

        let err = run(&config, &ShortBatchEmbedder::default(), Sample::Index(2)).await.unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("short-batch returned 2 vectors for 3 descriptions"), "{msg}");
    }

    #[test]
    fn sample_selection() {
        assert_eq!(pick_sample(0, Sample::Index(3)).unwrap(), None);
        assert_eq!(pick_sample(5, Sample::Index(3)).unwrap(), Some(3));
        assert!(pick_sample(2, Sample::Index(3)).is_err());

        let a = pick_sample(10, Sample::Random { seed: Some(7) }).unwrap();
        let b = pick_sample(10, Sample::Random { seed: Some(7) }).unwrap();
        assert_eq!(a, b);
        assert!(a.unwrap() < 10);
    }
}
