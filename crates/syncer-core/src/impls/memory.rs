//! MemoryDatasource - 開発用の読み出し元
//!
//! Locator: `memory://<store>/<table>?pk=<column>` (pk defaults to `id`).
//!
//! A [`MemoryConnector`] owns named stores; each store owns named tables of
//! rows. Filters, orders and paging are evaluated in process.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use url::Url;

use crate::domain::{Direction, Filter, FilterOp, FilterValue, Order, Row, Value};
use crate::ports::{Connector, Datasource, DatasourceError, ListMeta, ListOptions, ListResult};

/// Named tables of rows.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Arc<RwLock<Vec<Row>>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace `table` with `rows`.
    pub fn insert_table(&self, table: impl Into<String>, rows: Vec<Row>) {
        self.tables
            .write()
            .insert(table.into(), Arc::new(RwLock::new(rows)));
    }

    pub fn table(&self, table: &str) -> Option<Arc<RwLock<Vec<Row>>>> {
        self.tables.read().get(table).cloned()
    }

    /// Copy of the rows of `table`.
    pub fn rows(&self, table: &str) -> Option<Vec<Row>> {
        self.table(table).map(|t| t.read().clone())
    }
}

/// Connector for the `memory` scheme.
#[derive(Default)]
pub struct MemoryConnector {
    stores: RwLock<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store named `name`, created on first use.
    pub fn store(&self, name: &str) -> Arc<MemoryStore> {
        if let Some(store) = self.stores.read().get(name) {
            return Arc::clone(store);
        }
        Arc::clone(self.stores.write().entry(name.to_string()).or_default())
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, locator: &Url) -> Result<Arc<dyn Datasource>, DatasourceError> {
        let invalid = |reason: &str| DatasourceError::InvalidLocator {
            locator: locator.to_string(),
            reason: reason.to_string(),
        };

        let store_name = locator.host_str().ok_or_else(|| invalid("store is required"))?;
        let table = locator.path().trim_start_matches('/');
        if table.is_empty() {
            return Err(invalid("table is required"));
        }
        let pk = locator
            .query_pairs()
            .find(|(k, _)| k == "pk")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_else(|| "id".to_string());

        let store = self
            .stores
            .read()
            .get(store_name)
            .cloned()
            .ok_or_else(|| DatasourceError::Connection(format!("unknown store: {store_name}")))?;
        let rows = store.table(table).ok_or_else(|| {
            DatasourceError::Connection(format!("unknown table: {store_name}/{table}"))
        })?;

        Ok(Arc::new(MemoryDatasource { rows, pk }))
    }
}

/// One table of a [`MemoryStore`].
pub struct MemoryDatasource {
    rows: Arc<RwLock<Vec<Row>>>,
    pk: String,
}

impl MemoryDatasource {
    pub fn new(rows: Vec<Row>, pk: impl Into<String>) -> Self {
        Self {
            rows: Arc::new(RwLock::new(rows)),
            pk: pk.into(),
        }
    }

    fn is_pk(&self, row: &Row, id: &Value) -> bool {
        row.get(&self.pk).is_some_and(|v| v.loosely_eq(id))
    }
}

#[async_trait]
impl Datasource for MemoryDatasource {
    async fn list(&self, options: ListOptions) -> Result<ListResult, DatasourceError> {
        let rows = self.rows.read();
        let mut matched: Vec<&Row> = rows.iter().filter(|r| matches_all(r, &options.filters)).collect();

        let meta = (!options.without_meta).then(|| ListMeta {
            total: matched.len() as u64,
        });

        if !options.orders.is_empty() {
            matched.sort_by(|a, b| compare_rows(a, b, &options.orders));
        }

        let offset = usize::try_from(options.offset()).unwrap_or(usize::MAX);
        let limit = match options.limit {
            0 => usize::MAX,
            n => usize::try_from(n).unwrap_or(usize::MAX),
        };

        let page = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| select(r, &options.selects))
            .collect();

        Ok(ListResult { meta, rows: page })
    }

    async fn list_meta(&self, filters: &[Filter]) -> Result<ListMeta, DatasourceError> {
        let rows = self.rows.read();
        let total = rows.iter().filter(|r| matches_all(r, filters)).count() as u64;
        Ok(ListMeta { total })
    }

    async fn find(&self, id: &Value) -> Result<Option<Row>, DatasourceError> {
        Ok(self.rows.read().iter().find(|r| self.is_pk(r, id)).cloned())
    }

    async fn create(&self, rows: Vec<Row>) -> Result<(), DatasourceError> {
        self.rows.write().extend(rows);
        Ok(())
    }

    async fn update(&self, id: &Value, changes: Row) -> Result<(), DatasourceError> {
        let mut rows = self.rows.write();
        let row = rows
            .iter_mut()
            .find(|r| self.is_pk(r, id))
            .ok_or_else(|| DatasourceError::NotFound(id.to_string()))?;
        row.extend(changes);
        Ok(())
    }

    async fn update_many(&self, changes: Row, filters: &[Filter]) -> Result<u64, DatasourceError> {
        let mut rows = self.rows.write();
        let mut count = 0;
        for row in rows.iter_mut().filter(|r| matches_all(r, filters)) {
            row.extend(changes.clone());
            count += 1;
        }
        Ok(count)
    }

    async fn delete(&self, id: &Value) -> Result<(), DatasourceError> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|r| !self.is_pk(r, id));
        if rows.len() == before {
            return Err(DatasourceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete_many(&self, filters: &[Filter]) -> Result<u64, DatasourceError> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|r| !matches_all(r, filters));
        Ok((before - rows.len()) as u64)
    }
}

fn select(row: &Row, selects: &[String]) -> Row {
    if selects.is_empty() {
        return row.clone();
    }
    row.iter()
        .filter(|(k, _)| selects.iter().any(|s| s == *k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn compare_rows(a: &Row, b: &Row, orders: &[Order]) -> Ordering {
    for order in orders {
        let left = a.get(&order.field).unwrap_or(&Value::Null);
        let right = b.get(&order.field).unwrap_or(&Value::Null);
        let ord = left.compare(right).unwrap_or(Ordering::Equal);
        let ord = match order.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Whether `row` satisfies every filter.
pub fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches_filter(row, f))
}

/// Evaluate one filter against `row`. Missing fields compare as `Null`.
pub fn matches_filter(row: &Row, filter: &Filter) -> bool {
    let field = row.get(&filter.field).unwrap_or(&Value::Null);
    let ord = |v: &Value| field.compare(v);

    match (filter.operator, &filter.value) {
        (FilterOp::Between, _) => match filter.bounds() {
            Some((lo, hi)) => {
                matches!(ord(lo), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(ord(hi), Some(Ordering::Less | Ordering::Equal))
            }
            // bounds 不正の between は条件なしとして扱う
            None => true,
        },
        (FilterOp::In, FilterValue::List(items)) => items.iter().any(|v| field.loosely_eq(v)),
        (FilterOp::NotIn, FilterValue::List(items)) => !items.iter().any(|v| field.loosely_eq(v)),
        (_, FilterValue::List(_)) => false,
        (FilterOp::In, FilterValue::Scalar(v)) => field.loosely_eq(v),
        (FilterOp::NotIn, FilterValue::Scalar(v)) => !field.loosely_eq(v),
        (FilterOp::Eq, FilterValue::Scalar(v)) => field.loosely_eq(v),
        (FilterOp::Ne, FilterValue::Scalar(v)) => !field.loosely_eq(v),
        (FilterOp::Lt, FilterValue::Scalar(v)) => ord(v) == Some(Ordering::Less),
        (FilterOp::Le, FilterValue::Scalar(v)) => {
            matches!(ord(v), Some(Ordering::Less | Ordering::Equal))
        }
        (FilterOp::Gt, FilterValue::Scalar(v)) => ord(v) == Some(Ordering::Greater),
        (FilterOp::Ge, FilterValue::Scalar(v)) => {
            matches!(ord(v), Some(Ordering::Greater | Ordering::Equal))
        }
        (FilterOp::Like, FilterValue::Scalar(v)) => like(field, v),
        (FilterOp::NotLike, FilterValue::Scalar(v)) => !like(field, v),
    }
}

fn like(field: &Value, pattern: &Value) -> bool {
    match (field, pattern) {
        (Value::Null, _) | (_, Value::Null) => false,
        (field, Value::String(p)) => like_match(&field.to_string(), p),
        (field, other) => field.loosely_eq(other),
    }
}

/// SQL `LIKE` with `%` (any run) and `_` (one char).
fn like_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut ti, mut pi) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            ti += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '%')
}
