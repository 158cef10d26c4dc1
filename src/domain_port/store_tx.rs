use crate::domain_model::{Document, DocumentRef};
use crate::domain_port::{StoreError, WriteOp};

/// Read-then-write unit with server-side conflict detection.
///
/// Reads go through the transaction so that `commit` can reject the writes
/// when any document read has changed in the meantime.
#[async_trait::async_trait]
pub trait StoreTransaction: Send {
    async fn get(&mut self, doc: &DocumentRef) -> Result<Option<Document>, StoreError>;
    fn stage(&mut self, op: WriteOp);
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
