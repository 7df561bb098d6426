use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use url::Url;

use crate::ports::{Connector, Datasource, DatasourceError};

/// Registry of connectors (locator scheme -> connector).
///
/// Built during startup and shared by reference with the orchestrator.
#[derive(Default)]
pub struct DatasourceRegistry {
    connectors: RwLock<HashMap<String, Arc<dyn Connector>>>,
}

impl DatasourceRegistry {
    pub fn new() -> Self {
        Self {
            connectors: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connector for `scheme`; last registration wins.
    pub fn register(&self, scheme: impl Into<String>, connector: Arc<dyn Connector>) {
        self.connectors
            .write()
            .insert(scheme.into().to_lowercase(), connector);
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.connectors.read().contains_key(&scheme.to_lowercase())
    }

    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.connectors.read().keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Resolve `locator` to a live datasource.
    pub async fn connect(&self, locator: &str) -> Result<Arc<dyn Datasource>, DatasourceError> {
        let url = parse_locator(locator)?;
        let connector = self
            .connectors
            .read()
            .get(url.scheme())
            .cloned()
            .ok_or_else(|| DatasourceError::UnregisteredScheme(url.scheme().to_string()))?;

        connector.connect(&url).await
    }
}

/// Parse a `scheme://authority/path?query` locator.
pub fn parse_locator(locator: &str) -> Result<Url, DatasourceError> {
    Url::parse(locator).map_err(|e| DatasourceError::InvalidLocator {
        locator: locator.to_string(),
        reason: e.to_string(),
    })
}
