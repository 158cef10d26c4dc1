use crate::domain_model::*;
use crate::domain_port::StoreTransaction;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("concurrent modification of {0}")]
    Conflict(String),
    #[error("store error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(Value),
    /// Appends each value not already present in the array.
    ArrayUnion(Vec<Value>),
    /// Drops every array element whose object field `key` equals `value`.
    ArrayRemoveWhere { key: String, value: Value },
}

/// Ordered partial update of top-level fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch(pub Vec<(String, FieldUpdate)>);

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: Value) -> Self {
        self.0.push((field.to_owned(), FieldUpdate::Set(value)));
        self
    }

    pub fn array_union(mut self, field: &str, values: Vec<Value>) -> Self {
        self.0.push((field.to_owned(), FieldUpdate::ArrayUnion(values)));
        self
    }

    pub fn array_remove_where(mut self, field: &str, key: &str, value: Value) -> Self {
        self.0.push((
            field.to_owned(),
            FieldUpdate::ArrayRemoveWhere {
                key: key.to_owned(),
                value,
            },
        ));
        self
    }

    pub fn touches(&self, field: &str) -> bool {
        self.0.iter().any(|(f, _)| f == field)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set {
        doc: DocumentRef,
        data: Value,
        merge: bool,
    },
    Update {
        doc: DocumentRef,
        patch: Patch,
    },
    Delete {
        doc: DocumentRef,
    },
}

impl WriteOp {
    pub fn doc(&self) -> &DocumentRef {
        match self {
            WriteOp::Set { doc, .. } | WriteOp::Update { doc, .. } | WriteOp::Delete { doc } => doc,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Comparison {
    Eq,
    Ge,
    Le,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub field: String,
    pub op: Comparison,
    pub value: Value,
}

impl WhereClause {
    pub fn new(field: &str, op: Comparison, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_owned(),
            op,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ListenTarget {
    Document(DocumentRef),
    Collection(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteSnapshot {
    Document(Option<Document>),
    Collection(Vec<Document>),
}

/// Live channel of snapshots. Dropping the receiver detaches the listener.
pub type SnapshotStream = UnboundedReceiver<Result<RemoteSnapshot, StoreError>>;

#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get_document(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError>;

    async fn set_document(&self, doc: &DocumentRef, data: Value, merge: bool)
        -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] when the document does not exist.
    async fn update_document(&self, doc: &DocumentRef, patch: Patch) -> Result<(), StoreError>;

    async fn delete_document(&self, doc: &DocumentRef) -> Result<(), StoreError>;

    /// All-or-nothing across every operation.
    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    async fn begin_transaction<'t>(
        &'t self,
    ) -> Result<Box<dyn StoreTransaction + 't>, StoreError>;

    /// The stream yields the current state right away and again after every change.
    async fn subscribe(&self, target: ListenTarget) -> Result<SnapshotStream, StoreError>;

    async fn query(
        &self,
        collection: &str,
        clauses: &[WhereClause],
        limit: usize,
    ) -> Result<Vec<Document>, StoreError>;
}
