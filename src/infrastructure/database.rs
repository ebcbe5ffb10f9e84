// Document store interface - schemaless JSON documents grouped in collections.
// Services talk to this trait only; the managed database behind it is swappable.

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// A stored document together with its bookkeeping columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub collection: String,
    pub id: String,
    pub data: Value,
    /// Incremented on every write; used for optimistic preconditions.
    pub version: i64,
    pub created_time: i64,
    pub updated_time: i64,
}

impl Document {
    /// Decode the body into `T`. The document id is exposed to the body as `id`
    /// unless the body already carries one.
    pub fn decode<T: DeserializeOwned>(&self) -> AppResult<T> {
        let mut data = self.data.clone();
        if let Value::Object(map) = &mut data {
            map.entry("id").or_insert_with(|| Value::String(self.id.clone()));
        }
        serde_json::from_value(data).map_err(|e| {
            AppError::SerializationError(format!(
                "Failed to decode {}/{}: {}",
                self.collection, self.id, e
            ))
        })
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// The field is an array holding the value.
    ArrayContains,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Field {
        field: String,
        op: FilterOp,
        value: Value,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Field {
            field: field.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn op(field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        Filter::Field {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn array_contains(field: &str, value: impl Into<Value>) -> Self {
        Self::op(field, FilterOp::ArrayContains, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Query over one collection: conjunctive filters, optional ordering and limit.
/// Without an explicit ordering documents come back in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, SortDirection)>,
    pub limit: Option<i64>,
}

impl DocumentQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(field, value));
        self
    }

    pub fn where_op(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::op(field, op, value));
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn any_of(mut self, filters: Vec<Filter>) -> Self {
        self.filters.push(Filter::Or(filters));
        self
    }

    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    None,
    Exists,
    NotExists,
    /// The document must exist with exactly this version.
    Version(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteKind {
    /// Insert a new document; fails with `Conflict` if the id is taken.
    Create(Value),
    /// Overwrite or insert.
    Set(Value),
    /// Merge top-level fields into an existing document.
    Update(Map<String, Value>),
    /// Add values missing from an array field (set-union semantics).
    ArrayUnion { field: String, values: Vec<Value> },
    /// Remove every occurrence of the values from an array field.
    ArrayRemove { field: String, values: Vec<Value> },
    /// Delete; deleting a missing document is not an error.
    Delete,
}

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub collection: String,
    pub id: String,
    pub kind: WriteKind,
    pub precondition: Precondition,
}

impl Write {
    fn new(collection: &str, id: &str, kind: WriteKind, precondition: Precondition) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
            kind,
            precondition,
        }
    }

    pub fn create(collection: &str, id: &str, data: impl Serialize) -> AppResult<Self> {
        Ok(Self::new(
            collection,
            id,
            WriteKind::Create(serde_json::to_value(data)?),
            Precondition::NotExists,
        ))
    }

    pub fn set(collection: &str, id: &str, data: impl Serialize) -> AppResult<Self> {
        Ok(Self::new(
            collection,
            id,
            WriteKind::Set(serde_json::to_value(data)?),
            Precondition::None,
        ))
    }

    pub fn update(collection: &str, id: &str, fields: Map<String, Value>) -> Self {
        Self::new(collection, id, WriteKind::Update(fields), Precondition::Exists)
    }

    pub fn array_union(collection: &str, id: &str, field: &str, values: Vec<Value>) -> Self {
        Self::new(
            collection,
            id,
            WriteKind::ArrayUnion {
                field: field.to_string(),
                values,
            },
            Precondition::Exists,
        )
    }

    pub fn array_remove(collection: &str, id: &str, field: &str, values: Vec<Value>) -> Self {
        Self::new(
            collection,
            id,
            WriteKind::ArrayRemove {
                field: field.to_string(),
                values,
            },
            Precondition::Exists,
        )
    }

    pub fn delete(collection: &str, id: &str) -> Self {
        Self::new(collection, id, WriteKind::Delete, Precondition::None)
    }

    /// Require the document to still be at `version` when the batch commits.
    pub fn if_version(mut self, version: i64) -> Self {
        self.precondition = Precondition::Version(version);
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.precondition = Precondition::NotExists;
        self
    }
}

/// Build a JSON object from field/value pairs for `Write::update`.
pub fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Database interface trait for the document store.
#[async_trait]
pub trait DatabaseInterface: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>>;

    async fn query(&self, query: DocumentQuery) -> AppResult<Vec<Document>>;

    /// Apply all writes atomically: either every write lands or none does.
    async fn commit_batch(&self, writes: Vec<Write>) -> AppResult<()>;

    /// Delete by id, returning whether a document was removed.
    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool>;

    async fn health_check(&self) -> AppResult<()>;

    async fn create(&self, collection: &str, id: &str, data: Value) -> AppResult<()> {
        self.commit_batch(vec![Write::create(collection, id, data)?]).await
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> AppResult<()> {
        self.commit_batch(vec![Write::set(collection, id, data)?]).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> AppResult<()> {
        self.commit_batch(vec![Write::update(collection, id, fields)]).await
    }
}

/// Decode every document of a result set.
pub fn decode_all<T: DeserializeOwned>(docs: &[Document]) -> AppResult<Vec<T>> {
    docs.iter().map(Document::decode).collect()
}
