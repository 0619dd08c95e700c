pub mod http;
pub mod parse;

use std::fmt;

use crate::catalog::Entity;

pub use http::InteractionsClient;
pub use parse::parse_interactions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Minor,
    Moderate,
    Major,
    Unknown,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Minor => "Minor",
            Severity::Moderate => "Moderate",
            Severity::Major => "Major",
            Severity::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A drug-drug interaction reported for a queried pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub severity: Severity,
    /// Header text naming the drugs the entry is about.
    pub involved: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    NoInteraction,
    Interaction(Interaction),
    /// Found, but about food or the NSAID class rather than the two drugs.
    Excluded,
    /// Transport failure; nothing is known about the pair.
    TransientFailure(String),
}

impl LookupOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            LookupOutcome::NoInteraction => "no interaction",
            LookupOutcome::Interaction(_) => "interaction",
            LookupOutcome::Excluded => "excluded",
            LookupOutcome::TransientFailure(_) => "transient failure",
        }
    }
}

/// Source of pairwise interaction data.
///
/// Implementations are shared by every worker thread and must not fail
/// hard: transport problems come back as `TransientFailure`.
pub trait Lookup: Send + Sync {
    fn lookup(&self, a: &Entity, b: &Entity) -> LookupOutcome;
}

impl<L: Lookup + ?Sized> Lookup for &L {
    fn lookup(&self, a: &Entity, b: &Entity) -> LookupOutcome {
        (**self).lookup(a, b)
    }
}
