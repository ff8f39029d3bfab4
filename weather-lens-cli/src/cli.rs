use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use inquire::{CustomUserError, Text, validator::Validation};
use std::path::PathBuf;
use tracing::info;
use weather_lens_core::{Config, PairingReport, RunSummary, Sample, embedder_from_config, pipeline};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-lens", version, about = "Pair photos with weather observations")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Directory overrides shared by `pair` and `run`.
#[derive(Debug, Args)]
pub struct Inputs {
    /// Directory of photos.
    #[arg(long)]
    pub images: Option<PathBuf>,

    /// Directory of weather observation CSV exports.
    #[arg(long)]
    pub observations: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure the embedding server.
    Configure,

    /// Pair observations with photos and print counts.
    Pair {
        #[command(flatten)]
        inputs: Inputs,
    },

    /// Pair, embed and rank descriptions for a sample photo.
    Run {
        #[command(flatten)]
        inputs: Inputs,

        /// Pairing to query, by position in time order; random if absent.
        #[arg(long)]
        sample: Option<usize>,

        /// Seed for the random sample.
        #[arg(long, conflicts_with = "sample")]
        seed: Option<u64>,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        match self.command {
            Command::Configure => {
                configure(&mut config)?;
                let saved_to = match self.config {
                    Some(path) => {
                        config.save_to(&path)?;
                        path
                    }
                    None => {
                        config.save()?;
                        Config::config_file_path()?
                    }
                };
                println!("Saved configuration to {}", saved_to.display());
            }
            Command::Pair { inputs } => {
                inputs.apply(&mut config);
                let report = pipeline::pair_only(&config)?;
                print_pairing(&report);
            }
            Command::Run { inputs, sample, seed, json } => {
                inputs.apply(&mut config);
                let embedder = embedder_from_config(&config)?;
                info!(model = embedder.model_name(), "using embedding model");

                let sample = match sample {
                    Some(i) => Sample::Index(i),
                    None => Sample::Random { seed },
                };
                let summary = pipeline::run(&config, embedder.as_ref(), sample).await?;

                if json {
                    let out = serde_json::to_string_pretty(&summary)
                        .context("Failed to serialize summary")?;
                    println!("{out}");
                } else {
                    print_summary(&summary);
                }
            }
        }

        Ok(())
    }
}

impl Inputs {
    fn apply(self, config: &mut Config) {
        if let Some(dir) = self.images {
            config.images.dir = dir;
        }
        if let Some(dir) = self.observations {
            config.observations.dir = dir;
        }
    }
}

fn configure(config: &mut Config) -> anyhow::Result<()> {
    let current = config.embedder_endpoint().unwrap_or("http://localhost:51000").to_string();

    let endpoint = Text::new("CLIP server URL:")
        .with_default(&current)
        .with_validator(validate_url)
        .prompt()
        .context("Failed to read server URL")?;

    let model = Text::new("Model name:")
        .with_default(&config.embedder.model)
        .prompt()
        .context("Failed to read model name")?;

    config.set_embedder(endpoint, Some(model));
    Ok(())
}

fn validate_url(s: &str) -> Result<Validation, CustomUserError> {
    if s.starts_with("http://") || s.starts_with("https://") {
        Ok(Validation::Valid)
    } else {
        Ok(Validation::Invalid("URL must start with http:// or https://".into()))
    }
}

fn print_pairing(report: &PairingReport) {
    println!("Loaded {} observation table(s)", report.tables);
    println!(
        "Found {} image(s), {} with a capture time",
        report.images_found, report.images_timestamped
    );
    println!(
        "Created mapping for {} weather-image pairs \
         ({} records, {} unparsable, {} without a photo in range)",
        report.pairings.len(),
        report.stats.records,
        report.stats.unparsable,
        report.stats.unmatched
    );
}

fn print_summary(summary: &RunSummary) {
    println!("Loaded {} observation table(s)", summary.tables);
    println!(
        "Found {} image(s), {} with a capture time",
        summary.images_found, summary.images_timestamped
    );
    println!("Created mapping for {} weather-image pairs", summary.pairings);
    println!(
        "Embedded {} image(s) and {} description(s)",
        summary.images_embedded, summary.descriptions_embedded
    );

    match &summary.query {
        Some(q) => {
            println!();
            println!("Sample image: {} ({})", q.image.display(), q.observed_at);
            println!("Own record:   {}", q.own_description);
            println!("Best match:   {} ({:.1}%)", q.best_description, q.probability * 100.0);
            if !q.matches_own_record() {
                println!("              from {}", q.best_observed_at);
            }
        }
        None => println!("No pairings, nothing to query"),
    }
}
