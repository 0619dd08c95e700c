use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::catalog::{self, Entity};
use crate::checkpoint::ProcessedSet;
use crate::error::Result;
use crate::lookup::{Lookup, LookupOutcome};
use crate::pairs::{PairKey, Pairs};
use crate::settings::Settings;
use crate::sink::{InteractionRecord, ResultSink};

/// Fixed at construction; the executor never reads settings afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub workers: usize,
    pub retry_failed: bool,
    pub show_progress: bool,
}

impl ExecutorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        ExecutorConfig {
            workers: settings.worker_count(),
            retry_failed: settings.retry_failed,
            show_progress: settings.progress,
        }
    }
}

/// What happened to one dispatched pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Skipped,
    Written,
    NoInteraction,
    Excluded,
    /// Transport error, recorded as processed.
    Failed,
    /// Transport error, left for the next run.
    Deferred,
}

#[derive(Default)]
struct Tally {
    skipped: AtomicU64,
    written: AtomicU64,
    no_interaction: AtomicU64,
    excluded: AtomicU64,
    failed: AtomicU64,
    deferred: AtomicU64,
    errors: AtomicU64,
}

impl Tally {
    fn count(&self, d: Disposition) {
        let slot = match d {
            Disposition::Skipped => &self.skipped,
            Disposition::Written => &self.written,
            Disposition::NoInteraction => &self.no_interaction,
            Disposition::Excluded => &self.excluded,
            Disposition::Failed => &self.failed,
            Disposition::Deferred => &self.deferred,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self, total: u64, elapsed: Duration) -> RunSummary {
        let get = |a: &AtomicU64| a.load(Ordering::Relaxed);
        RunSummary {
            total,
            skipped: get(&self.skipped),
            interactions: get(&self.written),
            no_interaction: get(&self.no_interaction),
            excluded: get(&self.excluded),
            failed: get(&self.failed),
            deferred: get(&self.deferred),
            errors: get(&self.errors),
            elapsed,
        }
    }
}

/// Counts for one run. `looked_up()` is every pair that reached the lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total: u64,
    pub skipped: u64,
    pub interactions: u64,
    pub no_interaction: u64,
    pub excluded: u64,
    pub failed: u64,
    pub deferred: u64,
    pub errors: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn looked_up(&self) -> u64 {
        self.interactions + self.no_interaction + self.excluded + self.failed + self.deferred
    }

    pub fn print(&self) {
        println!(
            "Pairs: {} total, {} skipped, {} looked up in {:.1}s",
            self.total,
            self.skipped,
            self.looked_up(),
            self.elapsed.as_secs_f64()
        );
        println!(
            "Saved {} interactions ({} none, {} excluded, {} failed, {} deferred, {} errors).",
            self.interactions,
            self.no_interaction,
            self.excluded,
            self.failed,
            self.deferred,
            self.errors,
        );
    }
}

/// Runs every pair of a catalog through the lookup on a fixed worker pool.
///
/// There is no claim on a pair before it is looked up; a pair is skipped
/// only if it is already in the processed set.
pub struct Executor<'a, L> {
    config: ExecutorConfig,
    lookup: L,
    processed: &'a ProcessedSet,
    sink: &'a ResultSink,
}

impl<'a, L: Lookup> Executor<'a, L> {
    pub fn new(
        config: ExecutorConfig,
        lookup: L,
        processed: &'a ProcessedSet,
        sink: &'a ResultSink,
    ) -> Self {
        Executor {
            config,
            lookup,
            processed,
            sink,
        }
    }

    /// Returns once every pair has been dispatched and every worker is done.
    pub fn run(&self, catalog: &[Entity]) -> Result<RunSummary> {
        let start = Instant::now();
        let total = Pairs::total(catalog);
        let workers = self.config.workers.max(1);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ddi-worker-{}", i))
            .build()?;

        info!(
            "Processing {} pairs from {} drugs on {} workers",
            total,
            catalog.len(),
            workers
        );

        let pb = self.progress_bar(total);
        let tally = Tally::default();

        pool.install(|| {
            Pairs::new(catalog).par_bridge().for_each(|(a, b)| {
                let attempt = panic::catch_unwind(AssertUnwindSafe(|| self.process_pair(a, b)));
                match attempt {
                    Ok(Ok(d)) => tally.count(d),
                    Ok(Err(e)) => {
                        error!("Pair {} / {} left unrecorded: {}", a.name, b.name, e);
                        tally.error();
                    }
                    Err(payload) => {
                        error!(
                            "Worker panicked on {} / {}: {}",
                            a.name,
                            b.name,
                            panic_message(payload.as_ref())
                        );
                        tally.error();
                    }
                }
                pb.inc(1);
            });
        });

        pb.finish_and_clear();
        let summary = tally.summary(total, start.elapsed());
        info!(
            skipped = summary.skipped,
            interactions = summary.interactions,
            errors = summary.errors,
            "Run finished"
        );
        Ok(summary)
    }

    /// One unit of work. The sink append happens before the checkpoint
    /// write, so a recorded pair always has its output on disk.
    fn process_pair(&self, a: &Entity, b: &Entity) -> Result<Disposition> {
        let key = PairKey::of(a, b);
        if self.processed.contains(&key) {
            info!("Skipping pair: {} and {} (already processed)", a.name, b.name);
            return Ok(Disposition::Skipped);
        }

        let disposition = match self.lookup.lookup(a, b) {
            LookupOutcome::Interaction(interaction) => {
                self.sink.append(&InteractionRecord::new(a, b, &interaction))?;
                Disposition::Written
            }
            LookupOutcome::NoInteraction => Disposition::NoInteraction,
            LookupOutcome::Excluded => Disposition::Excluded,
            LookupOutcome::TransientFailure(reason) if self.config.retry_failed => {
                warn!("Deferring {} / {} to the next run: {}", a.name, b.name, reason);
                return Ok(Disposition::Deferred);
            }
            LookupOutcome::TransientFailure(_) => Disposition::Failed,
        };

        self.processed.record(key)?;
        Ok(disposition)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Load the catalog, open the checkpoint and output table named in
/// `settings`, and run every remaining pair through `lookup`.
pub fn run_with<L: Lookup>(settings: &Settings, lookup: L) -> Result<RunSummary> {
    let catalog = catalog::load(&settings.input)?;
    let processed = ProcessedSet::open_path(&settings.checkpoint)?;
    let sink = ResultSink::open(&settings.output)?;

    let executor = Executor::new(ExecutorConfig::from_settings(settings), lookup, &processed, &sink);
    let summary = executor.run(&catalog)?;

    // collapse duplicate rows left by earlier interrupted runs
    processed.compact()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::lookup::{Interaction, Severity};

    struct Scripted {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl Scripted {
        fn new() -> Self {
            Scripted {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Lookup for Scripted {
        fn lookup(&self, a: &Entity, b: &Entity) -> LookupOutcome {
            self.calls
                .lock()
                .unwrap()
                .push((a.unique_id.clone(), b.unique_id.clone()));
            match (a.name.as_str(), b.name.as_str()) {
                ("A", "B") => LookupOutcome::Interaction(Interaction {
                    severity: Severity::Major,
                    involved: "A ↔ B".into(),
                    description: "bleeding".into(),
                }),
                ("B", "C") => LookupOutcome::Excluded,
                ("C", "D") => LookupOutcome::TransientFailure("timeout".into()),
                ("A", "D") => panic!("parser blew up"),
                _ => LookupOutcome::NoInteraction,
            }
        }
    }

    fn catalog() -> Vec<Entity> {
        vec![
            Entity::new("1", "A", "x"),
            Entity::new("2", "B", "y"),
            Entity::new("3", "C", "z"),
            Entity::new("4", "D", "w"),
        ]
    }

    fn config(workers: usize, retry_failed: bool) -> ExecutorConfig {
        ExecutorConfig {
            workers,
            retry_failed,
            show_progress: false,
        }
    }

    #[test]
    fn tallies_every_disposition() {
        let dir = tempfile::tempdir().unwrap();
        let processed = ProcessedSet::open_path(&dir.path().join("cp.csv")).unwrap();
        let sink = ResultSink::open(&dir.path().join("out.csv")).unwrap();
        let lookup = Scripted::new();

        let summary = Executor::new(config(3, false), &lookup, &processed, &sink)
            .run(&catalog())
            .unwrap();

        assert_eq!(summary.total, 6);
        assert_eq!(summary.interactions, 1);
        assert_eq!(summary.excluded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.no_interaction, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.looked_up(), 5);
        // the panicking pair is the only one not recorded
        assert_eq!(processed.len(), 5);
        assert!(!processed.contains(&PairKey::new("1", "4")));
    }

    #[test]
    fn retry_failed_leaves_failures_unrecorded() {
        let dir = tempfile::tempdir().unwrap();
        let processed = ProcessedSet::open_path(&dir.path().join("cp.csv")).unwrap();
        let sink = ResultSink::open(&dir.path().join("out.csv")).unwrap();
        let lookup = Scripted::new();

        let summary = Executor::new(config(2, true), &lookup, &processed, &sink)
            .run(&catalog())
            .unwrap();

        assert_eq!(summary.failed, 0);
        assert_eq!(summary.deferred, 1);
        assert!(!processed.contains(&PairKey::new("3", "4")));
        assert_eq!(processed.len(), 4);
    }

    #[test]
    fn processed_pairs_are_not_looked_up() {
        let dir = tempfile::tempdir().unwrap();
        let processed = ProcessedSet::open_path(&dir.path().join("cp.csv")).unwrap();
        processed.record(PairKey::new("2", "1")).unwrap();
        processed.record(PairKey::new("3", "2")).unwrap();
        let sink = ResultSink::open(&dir.path().join("out.csv")).unwrap();
        let lookup = Scripted::new();

        let summary = Executor::new(config(1, false), &lookup, &processed, &sink)
            .run(&catalog())
            .unwrap();

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.interactions, 0);
        let calls = lookup.calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        assert!(!calls.contains(&("1".to_string(), "2".to_string())));
    }

    #[test]
    fn empty_and_single_catalogs_finish() {
        let dir = tempfile::tempdir().unwrap();
        let processed = ProcessedSet::open_path(&dir.path().join("cp.csv")).unwrap();
        let sink = ResultSink::open(&dir.path().join("out.csv")).unwrap();
        let executor = Executor::new(config(4, false), Scripted::new(), &processed, &sink);

        assert_eq!(executor.run(&[]).unwrap().total, 0);
        assert_eq!(executor.run(&catalog()[..1]).unwrap().total, 0);
        assert!(processed.is_empty());
    }

    #[test]
    fn panic_message_extracts_text() {
        let payload = panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom 7");
        let payload = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");
    }
}
