use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("write precondition failed on {collection}/{id}")]
    PreconditionFailed { collection: String, id: String },

    #[error("document {collection}/{id} field `{field}` is not an integer")]
    NotNumeric {
        collection: String,
        id: String,
        field: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, StoreError::PreconditionFailed { .. })
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn precondition(collection: &str, id: &str) -> Self {
        StoreError::PreconditionFailed {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Query predicate over a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    /// Case-insensitive substring match on a string field.
    Contains(String, String),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn contains(field: &str, needle: &str) -> Self {
        Filter::Contains(field.to_string(), needle.to_string())
    }

    pub fn matches(&self, data: &Value) -> bool {
        match self {
            Filter::Eq(field, expected) => data.get(field) == Some(expected),
            Filter::Contains(field, needle) => data
                .get(field)
                .and_then(Value::as_str)
                .map(|s| s.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exists,
    NotExists,
    FieldEquals(String, Value),
    FieldAtLeast(String, i64),
    FieldAtMost(String, i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    pub collection: String,
    pub id: String,
    pub condition: Condition,
}

impl Precondition {
    pub fn holds(&self, current: Option<&Value>) -> bool {
        match (&self.condition, current) {
            (Condition::Exists, doc) => doc.is_some(),
            (Condition::NotExists, doc) => doc.is_none(),
            (Condition::FieldEquals(field, expected), Some(doc)) => match doc.get(field) {
                Some(v) => v == expected,
                None => expected.is_null(),
            },
            (Condition::FieldAtLeast(field, min), Some(doc)) => doc
                .get(field)
                .and_then(Value::as_i64)
                .map(|v| v >= *min)
                .unwrap_or(false),
            (Condition::FieldAtMost(field, max), Some(doc)) => match doc.get(field) {
                None | Some(Value::Null) => *max >= 0,
                Some(v) => v.as_i64().map(|v| v <= *max).unwrap_or(false),
            },
            (_, None) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set {
        collection: String,
        id: String,
        data: Value,
    },
    Update {
        collection: String,
        id: String,
        patch: Value,
    },
    /// With `seed`, a missing document is created from it before the delta is applied.
    Increment {
        collection: String,
        id: String,
        field: String,
        delta: i64,
        seed: Option<Value>,
    },
}

impl WriteOp {
    pub fn target(&self) -> (&str, &str) {
        match self {
            WriteOp::Set { collection, id, .. }
            | WriteOp::Update { collection, id, .. }
            | WriteOp::Increment { collection, id, .. } => (collection.as_str(), id.as_str()),
        }
    }
}

/// Preconditions and writes committed together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub preconditions: Vec<Precondition>,
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, collection: &str, id: &str, condition: Condition) -> &mut Self {
        self.preconditions.push(Precondition {
            collection: collection.to_string(),
            id: id.to_string(),
            condition,
        });
        self
    }

    pub fn set(&mut self, collection: &str, id: &str, data: Value) -> &mut Self {
        self.ops.push(WriteOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        });
        self
    }

    pub fn update(&mut self, collection: &str, id: &str, patch: Value) -> &mut Self {
        self.ops.push(WriteOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            patch,
        });
        self
    }

    pub fn increment(
        &mut self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        seed: Option<Value>,
    ) -> &mut Self {
        self.ops.push(WriteOp::Increment {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            delta,
            seed,
        });
        self
    }

    /// Every existing row the batch reads or modifies, sorted by `(collection, id)` and listed once.
    /// Backends with row locks take them in this order so two batches cannot wait on each other.
    pub fn lock_keys(&self) -> Vec<(&str, &str)> {
        let mut keys: Vec<(&str, &str)> = self
            .preconditions
            .iter()
            .map(|p| (p.collection.as_str(), p.id.as_str()))
            .chain(
                self.ops
                    .iter()
                    .filter(|op| !matches!(op, WriteOp::Set { .. }))
                    .map(WriteOp::target),
            )
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }
}

/// Document-oriented persistence used by every repository.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    async fn query(&self, collection: &str, filters: &[Filter]) -> StoreResult<Vec<Document>>;

    async fn set(&self, collection: &str, id: &str, data: Value) -> StoreResult<()>;

    async fn update(&self, collection: &str, id: &str, patch: Value) -> StoreResult<()>;

    /// Atomically adds `delta` to an integer field and returns the new value.
    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64)
    -> StoreResult<i64>;

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}

/// Shallow merge of top-level fields.
pub(crate) fn merge_patch(target: &mut Value, patch: &Value) {
    if let (Some(dst), Some(src)) = (target.as_object_mut(), patch.as_object()) {
        for (k, v) in src {
            dst.insert(k.clone(), v.clone());
        }
    }
}

pub(crate) fn add_to_field(
    doc: &mut Value,
    collection: &str,
    id: &str,
    field: &str,
    delta: i64,
) -> StoreResult<i64> {
    let not_numeric = || StoreError::NotNumeric {
        collection: collection.to_string(),
        id: id.to_string(),
        field: field.to_string(),
    };
    let obj: &mut Map<String, Value> = doc.as_object_mut().ok_or_else(not_numeric)?;
    let current = match obj.get(field) {
        None | Some(Value::Null) => 0,
        Some(v) => v.as_i64().ok_or_else(not_numeric)?,
    };
    let next = current + delta;
    obj.insert(field.to_string(), Value::from(next));
    Ok(next)
}
