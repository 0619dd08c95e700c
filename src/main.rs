use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use ddi_scraper::checkpoint::ProcessedSet;
use ddi_scraper::executor;
use ddi_scraper::lookup::InteractionsClient;
use ddi_scraper::pairs::pair_count;
use ddi_scraper::settings::Settings;
use ddi_scraper::{catalog, sink, Entity, Lookup, LookupOutcome, PairKey, Pairs};

#[derive(Parser)]
#[command(name = "ddi_scraper", about = "Pairwise drug interaction scraper with resumable checkpoints")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Paths {
    /// Drug catalog CSV (Unique ID, Drug Name, Drug ID)
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Output interactions CSV
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Checkpoint file (.csv log, or .sqlite/.db)
    #[arg(short, long)]
    checkpoint: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up every unprocessed pair and append interactions to the output
    Run {
        #[command(flatten)]
        paths: Paths,
        /// Worker threads (default: one per CPU)
        #[arg(short = 'j', long)]
        workers: Option<usize>,
        /// Leave pairs whose lookup failed out of the checkpoint
        #[arg(long)]
        retry_failed: bool,
        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// Show catalog, checkpoint and output counts
    Stats {
        #[command(flatten)]
        paths: Paths,
    },
    /// Look up a single pair by Drug ID and print the outcome
    Lookup {
        drug_a: String,
        drug_b: String,
    },
}

impl Paths {
    fn apply(self, settings: &mut Settings) {
        if let Some(p) = self.input {
            settings.input = p;
        }
        if let Some(p) = self.output {
            settings.output = p;
        }
        if let Some(p) = self.checkpoint {
            settings.checkpoint = p;
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn client(settings: &Settings) -> anyhow::Result<InteractionsClient> {
    InteractionsClient::new(&settings.base_url, settings.timeout(), &settings.user_agent)
        .context("Failed to build HTTP client")
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load().context("Failed to load settings")?;

    match cli.command {
        Commands::Run {
            paths,
            workers,
            retry_failed,
            no_progress,
        } => {
            paths.apply(&mut settings);
            if let Some(n) = workers {
                settings.workers = n;
            }
            settings.retry_failed |= retry_failed;
            settings.progress &= !no_progress;
            info!(settings = ?settings, "Starting interaction scrape");

            let lookup = client(&settings)?;
            let summary = executor::run_with(&settings, lookup)
                .with_context(|| format!("Run over {:?} failed", settings.input))?;
            summary.print();
            println!("Interaction data has been written to {:?}", settings.output);
        }
        Commands::Stats { paths } => {
            paths.apply(&mut settings);
            let drugs = catalog::load(&settings.input)?;
            let processed = ProcessedSet::open_path(&settings.checkpoint)?;
            let rows = sink::count_rows(&settings.output)?;

            let total = pair_count(drugs.len());
            // checkpoint may hold pairs for drugs no longer in the catalog
            let done = Pairs::new(&drugs)
                .filter(|(a, b)| processed.contains(&PairKey::of(a, b)))
                .count() as u64;

            println!("Drugs:      {}", drugs.len());
            println!("Pairs:      {}", total);
            println!("Processed:  {}", done);
            println!("Remaining:  {}", total - done);
            println!("Checkpoint: {} entries", processed.len());
            println!("Output:     {} rows", rows);
        }
        Commands::Lookup { drug_a, drug_b } => {
            let a = Entity::new(drug_a.as_str(), drug_a.as_str(), drug_a.as_str());
            let b = Entity::new(drug_b.as_str(), drug_b.as_str(), drug_b.as_str());
            let lookup = client(&settings)?;
            println!("GET {}", lookup.url_for(&a, &b));
            match lookup.lookup(&a, &b) {
                LookupOutcome::Interaction(i) => {
                    println!("Level:       {}", i.severity);
                    println!("Involved:    {}", i.involved);
                    println!("Interaction: {}", i.description);
                }
                LookupOutcome::TransientFailure(reason) => println!("Lookup failed: {}", reason),
                other => println!("Result: {}", other.kind()),
            }
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
