//! Contract of the hosted document store the portal delegates persistence to.
//!
//! Everything above this module talks to a `dyn DocumentStore`: documents are
//! schemaless JSON objects grouped in collections, queries combine equality and
//! range filters with an optional ordering, and subscriptions push a full
//! snapshot of the matching set on every change.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::StoreError;

pub type Fields = serde_json::Map<String, Value>;

// One event of a live subscription: the full matching set, or the error that ended it
pub type SnapshotEvent = Result<Vec<Document>, StoreError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Gte,
    Lt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Lt, value)
    }

    fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    // Documents lacking the field never match, as in the hosted store
    pub fn matches(&self, fields: &Fields) -> bool {
        let Some(actual) = fields.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => compare_values(actual, &self.value) == Some(Ordering::Equal),
            FilterOp::Gte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => compare_values(actual, &self.value) == Some(Ordering::Less),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    // Filter-only shape of this query, used when server ordering is unavailable
    pub fn filter_only(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            filters: self.filters.clone(),
            order_by: None,
            limit: None,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(&doc.fields))
    }

    /// Composite index this query needs, if any.
    ///
    /// Ordering on one field while filtering on another cannot be served from
    /// single-field indexes. The returned spec lists the filtered fields in
    /// query order followed by the ordered field.
    pub fn required_index(&self) -> Option<IndexSpec> {
        let order = self.order_by.as_ref()?;
        let mut fields: Vec<String> = Vec::new();
        for filter in &self.filters {
            if filter.field != order.field && !fields.contains(&filter.field) {
                fields.push(filter.field.clone());
            }
        }
        if fields.is_empty() {
            return None;
        }
        fields.push(order.field.clone());
        Some(IndexSpec {
            collection: self.collection.clone(),
            fields,
        })
    }

    /// Evaluate the query over documents given in arrival order.
    ///
    /// Ordering is stable, so equal keys keep their arrival order. Documents
    /// without the ordered field are dropped when an ordering is requested.
    pub fn apply<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> Vec<Document> {
        let mut out: Vec<Document> = docs
            .into_iter()
            .filter(|doc| self.matches(doc))
            .cloned()
            .collect();

        if let Some(order) = &self.order_by {
            out.retain(|doc| doc.fields.contains_key(&order.field));
            out.sort_by(|a, b| {
                let ord = compare_values(&a.fields[&order.field], &b.fields[&order.field])
                    .unwrap_or(Ordering::Equal);
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub collection: String,
    pub fields: Vec<String>,
}

impl std::fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.collection, self.fields.join(", "))
    }
}

// Values of different kinds are incomparable
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Live query handle. Events arrive in the store's change order.
///
/// Dropping the subscription releases the underlying channel.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<SnapshotEvent>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<SnapshotEvent>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            release: Some(Box::new(release)),
        }
    }

    // None once the store closed the channel
    pub async fn next(&mut self) -> Option<SnapshotEvent> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document under a generated id.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Create or replace the document with the given id.
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Shallow-merge `patch` into an existing document.
    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<(), StoreError>;

    /// Deleting a missing document succeeds.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Open a live query. The first event is the current snapshot.
    ///
    /// A missing index may be reported either here or as the first event.
    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError>;
}
