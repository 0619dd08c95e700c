use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use tracing::{debug, warn};

use super::{parse_interactions, Lookup, LookupOutcome};
use crate::catalog::Entity;
use crate::error::Result;

pub const DEFAULT_BASE_URL: &str = "https://www.drugs.com/interactions-check.php";

/// Blocking client for the public interaction checker.
pub struct InteractionsClient {
    client: Client,
    base_url: String,
}

impl InteractionsClient {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(InteractionsClient {
            client,
            base_url: base_url.trim_end_matches(['?', '/']).to_string(),
        })
    }

    pub fn url_for(&self, a: &Entity, b: &Entity) -> String {
        format!("{}?drug_list={},{}", self.base_url, a.lookup_key, b.lookup_key)
    }

    /// Raw result page for the pair.
    pub fn fetch(&self, a: &Entity, b: &Entity) -> reqwest::Result<String> {
        let url = self.url_for(a, b);
        let start = Instant::now();
        let body = self.client.get(&url).send()?.error_for_status()?.text()?;
        debug!(
            url = %url,
            bytes = body.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Fetched interaction page"
        );
        Ok(body)
    }
}

impl Lookup for InteractionsClient {
    fn lookup(&self, a: &Entity, b: &Entity) -> LookupOutcome {
        match self.fetch(a, b) {
            Ok(body) => parse_interactions(&body),
            Err(e) => {
                warn!("Lookup failed for {} / {}: {}", a.name, b.name, e);
                LookupOutcome::TransientFailure(e.to_string())
            }
        }
    }
}
