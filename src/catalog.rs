use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// One drug from the input table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Stable identity used for pair keys and the output table.
    pub unique_id: String,
    pub name: String,
    /// Identifier understood by the interaction checker.
    pub lookup_key: String,
}

impl Entity {
    pub fn new(
        unique_id: impl Into<String>,
        name: impl Into<String>,
        lookup_key: impl Into<String>,
    ) -> Self {
        Entity {
            unique_id: unique_id.into(),
            name: name.into(),
            lookup_key: lookup_key.into(),
        }
    }
}

#[derive(Deserialize)]
struct CatalogRow {
    #[serde(rename = "Unique ID")]
    unique_id: String,
    #[serde(rename = "Drug Name")]
    name: String,
    #[serde(rename = "Drug ID")]
    lookup_key: String,
}

/// Load the drug catalog from a headed CSV, preserving row order.
pub fn load(path: &Path) -> Result<Vec<Entity>> {
    if !path.exists() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Error::csv(path, e))?;

    let mut entities = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (line, row) in reader.deserialize::<CatalogRow>().enumerate() {
        let row = row.map_err(|e| Error::csv(path, e))?;
        // +2: header line, 1-based
        let line = line + 2;

        if row.unique_id.is_empty() || row.lookup_key.is_empty() {
            warn!(line, name = %row.name, "Skipping catalog row with empty Unique ID or Drug ID");
            continue;
        }
        if !seen.insert(row.unique_id.clone()) {
            warn!(line, unique_id = %row.unique_id, "Skipping duplicate Unique ID");
            continue;
        }

        entities.push(Entity {
            unique_id: row.unique_id,
            name: row.name,
            lookup_key: row.lookup_key,
        });
    }

    info!("Loaded {} drugs from {:?}", entities.len(), path);
    Ok(entities)
}
