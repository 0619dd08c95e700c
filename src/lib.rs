pub mod catalog;
pub mod checkpoint;
pub mod durable;
pub mod error;
pub mod executor;
pub mod lookup;
pub mod pairs;
pub mod settings;
pub mod sink;

pub use catalog::Entity;
pub use checkpoint::ProcessedSet;
pub use error::{Error, Result};
pub use executor::{Executor, ExecutorConfig, RunSummary};
pub use lookup::{Interaction, Lookup, LookupOutcome, Severity};
pub use pairs::{PairKey, Pairs};
pub use sink::{InteractionRecord, ResultSink};
