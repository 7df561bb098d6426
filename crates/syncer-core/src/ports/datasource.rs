//! Datasource port - ページング可能な読み出し元
//!
//! Concrete backends (relational stores, files, APIs) live outside the core and
//! are reached through a [`Connector`] registered per locator scheme.

use async_trait::async_trait;
use url::Url;

use crate::domain::{Filter, Order, Row, Value};

/// Errors raised by datasources and connectors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatasourceError {
    #[error("unregistered datasource: {0}")]
    UnregisteredScheme(String),

    #[error("invalid locator `{locator}`: {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("record not found: {0}")]
    NotFound(String),
}

/// Options for [`Datasource::list`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    /// Page size. `0` means no limit.
    pub limit: u64,
    /// 1-indexed page number; values below 1 are treated as 1.
    pub page: u64,
    /// Skip the total count.
    pub without_meta: bool,
    /// Columns to keep. Empty keeps every column.
    pub selects: Vec<String>,
    pub filters: Vec<Filter>,
    pub orders: Vec<Order>,
}

impl ListOptions {
    pub fn page(page: u64, limit: u64) -> Self {
        Self {
            page,
            limit,
            ..Self::default()
        }
    }

    pub fn offset(&self) -> u64 {
        self.page.max(1).saturating_sub(1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListMeta {
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListResult {
    /// `None` when the listing was requested `without_meta`.
    pub meta: Option<ListMeta>,
    pub rows: Vec<Row>,
}

/// Paginated listing, counting and single-row CRUD over one table.
///
/// Implementations are shared by every page worker of a run and must
/// tolerate concurrent calls.
#[async_trait]
pub trait Datasource: Send + Sync {
    async fn list(&self, options: ListOptions) -> Result<ListResult, DatasourceError>;

    async fn list_meta(&self, filters: &[Filter]) -> Result<ListMeta, DatasourceError>;

    async fn find(&self, id: &Value) -> Result<Option<Row>, DatasourceError>;

    async fn create(&self, rows: Vec<Row>) -> Result<(), DatasourceError>;

    async fn update(&self, id: &Value, changes: Row) -> Result<(), DatasourceError>;

    /// Applies `changes` to every row matching `filters`; returns the count.
    async fn update_many(&self, changes: Row, filters: &[Filter]) -> Result<u64, DatasourceError>;

    async fn delete(&self, id: &Value) -> Result<(), DatasourceError>;

    /// Deletes every row matching `filters`; returns the count.
    async fn delete_many(&self, filters: &[Filter]) -> Result<u64, DatasourceError>;
}

/// Opens a [`Datasource`] from a parsed locator
/// (`scheme://authority/path?query`).
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, locator: &Url) -> Result<std::sync::Arc<dyn Datasource>, DatasourceError>;
}
