//! Seed data for the in-memory stores.
//!
//! ```json
//! {"stores": {"crm": {"users": [{"id": 1, "name": " Ann "}]}}}
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use syncer_core::domain::Row;
use syncer_core::impls::MemoryConnector;

#[derive(Debug, Default, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub stores: BTreeMap<String, BTreeMap<String, Vec<Row>>>,
}

impl Fixtures {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixtures: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse fixtures: {}", path.display()))
    }

    /// Load `path` if given, otherwise no data.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    pub fn seed(self, connector: &MemoryConnector) {
        for (store, tables) in self.stores {
            let store_ref = connector.store(&store);
            for (table, rows) in tables {
                tracing::debug!(%store, %table, rows = rows.len(), "seeded table");
                store_ref.insert_table(table, rows);
            }
        }
    }
}
