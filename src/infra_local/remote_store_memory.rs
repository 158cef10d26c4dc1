use crate::domain_model::*;
use crate::domain_port::*;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};

#[derive(Debug, Clone)]
struct StoredDocument {
    data: Value,
    version: u64,
}

type Collections = BTreeMap<String, BTreeMap<String, StoredDocument>>;

struct ListenerEntry {
    target: ListenTarget,
    tx: UnboundedSender<Result<RemoteSnapshot, StoreError>>,
}

#[derive(Default)]
struct FaultPlan {
    fail_writes: Option<StoreError>,
    fail_next_commit: Option<StoreError>,
    fail_subscribe: Option<StoreError>,
}

struct StoreState {
    collections: Collections,
    listeners: Vec<ListenerEntry>,
    next_version: u64,
}

/// Process-local document store with the same contract as the managed backend.
///
/// Writes can be made to fail on demand, every committed batch is recorded,
/// and listener channels are counted so tests can check for orphans.
pub struct MemoryRemoteStore {
    state: Mutex<StoreState>,
    faults: Mutex<FaultPlan>,
    write_log: Mutex<Vec<Vec<WriteOp>>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                collections: Collections::new(),
                listeners: Vec::new(),
                next_version: 1,
            }),
            faults: Mutex::new(FaultPlan::default()),
            write_log: Mutex::new(Vec::new()),
        }
    }

    // region test and demo controls

    /// Creates or replaces a member profile without notifying the write log.
    pub fn seed_profile(&self, member: &MemberId, profile: &ProfileDocument) -> Result<(), StoreError> {
        let data = serde_json::to_value(profile).map_err(|e| StoreError::Internal(e.to_string()))?;
        let op = WriteOp::Set {
            doc: DocumentRef::profile(member),
            data,
            merge: false,
        };
        self.commit_ops(&[op], &HashMap::new(), false)
    }

    pub fn seed_request(
        &self,
        receiver: &MemberId,
        request_id: &RequestId,
        body: &RequestDocument,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_value(body).map_err(|e| StoreError::Internal(e.to_string()))?;
        let op = WriteOp::Set {
            doc: DocumentRef::friend_request(receiver, request_id),
            data,
            merge: false,
        };
        self.commit_ops(&[op], &HashMap::new(), false)
    }

    /// Every write fails with `error` until [`clear_faults`](Self::clear_faults).
    pub fn fail_writes(&self, error: StoreError) {
        lock(&self.faults).fail_writes = Some(error);
    }

    pub fn fail_next_commit(&self, error: StoreError) {
        lock(&self.faults).fail_next_commit = Some(error);
    }

    pub fn fail_subscribe(&self, error: StoreError) {
        lock(&self.faults).fail_subscribe = Some(error);
    }

    pub fn clear_faults(&self) {
        *lock(&self.faults) = FaultPlan::default();
    }

    /// Pushes `error` to every listener on `target`.
    pub fn emit_listener_error(&self, target: &ListenTarget, error: StoreError) {
        let mut state = lock(&self.state);
        state.listeners.retain(|l| !l.tx.is_closed());
        for listener in state.listeners.iter().filter(|l| &l.target == target) {
            let _ = listener.tx.send(Err(error.clone()));
        }
    }

    pub fn document(&self, doc: &DocumentRef) -> Option<Value> {
        let state = lock(&self.state);
        state
            .collections
            .get(&doc.collection)
            .and_then(|c| c.get(&doc.id))
            .map(|d| d.data.clone())
    }

    pub fn profile(&self, member: &MemberId) -> Option<ProfileDocument> {
        let data = self.document(&DocumentRef::profile(member))?;
        serde_json::from_value(data).ok()
    }

    pub fn write_log(&self) -> Vec<Vec<WriteOp>> {
        lock(&self.write_log).clone()
    }

    pub fn listener_count(&self) -> usize {
        let mut state = lock(&self.state);
        state.listeners.retain(|l| !l.tx.is_closed());
        state.listeners.len()
    }

    // endregion

    fn check_write_fault(&self) -> Result<(), StoreError> {
        match &lock(&self.faults).fail_writes {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Applies `ops` atomically after checking that every document in `reads`
    /// is still at the version it was read at (0 = absent).
    fn commit_ops(
        &self,
        ops: &[WriteOp],
        reads: &HashMap<DocumentRef, u64>,
        log: bool,
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);

        for (doc, read_version) in reads {
            let current = version_of(&state.collections, doc);
            if current != *read_version {
                return Err(StoreError::Conflict(doc.to_string()));
            }
        }

        let mut staged = state.collections.clone();
        let mut version = state.next_version;
        let mut touched = BTreeSet::new();
        for op in ops {
            apply_op(&mut staged, op, version)?;
            version += 1;
            touched.insert(op.doc().clone());
        }
        state.collections = staged;
        state.next_version = version;

        if log {
            lock(&self.write_log).push(ops.to_vec());
        }
        notify(&mut state, &touched);
        Ok(())
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get_document(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        let state = lock(&self.state);
        Ok(read_document(&state.collections, doc).map(|(document, _)| document))
    }

    async fn set_document(
        &self,
        doc: &DocumentRef,
        data: Value,
        merge: bool,
    ) -> Result<(), StoreError> {
        self.batch_write(vec![WriteOp::Set {
            doc: doc.clone(),
            data,
            merge,
        }])
        .await
    }

    async fn update_document(&self, doc: &DocumentRef, patch: Patch) -> Result<(), StoreError> {
        self.batch_write(vec![WriteOp::Update {
            doc: doc.clone(),
            patch,
        }])
        .await
    }

    async fn delete_document(&self, doc: &DocumentRef) -> Result<(), StoreError> {
        self.batch_write(vec![WriteOp::Delete { doc: doc.clone() }])
            .await
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        self.check_write_fault()?;
        self.commit_ops(&ops, &HashMap::new(), true)
    }

    async fn begin_transaction<'t>(
        &'t self,
    ) -> Result<Box<dyn StoreTransaction + 't>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: self,
            reads: HashMap::new(),
            writes: Vec::new(),
        }))
    }

    async fn subscribe(&self, target: ListenTarget) -> Result<SnapshotStream, StoreError> {
        if let Some(e) = lock(&self.faults).fail_subscribe.clone() {
            return Err(e);
        }

        let (tx, rx) = unbounded_channel();
        let mut state = lock(&self.state);
        let _ = tx.send(Ok(snapshot_for(&state.collections, &target)));
        state.listeners.push(ListenerEntry { target, tx });
        Ok(rx)
    }

    async fn query(
        &self,
        collection: &str,
        clauses: &[WhereClause],
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let state = lock(&self.state);
        let Some(documents) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(documents
            .iter()
            .filter(|(_, d)| clauses.iter().all(|c| matches_clause(&d.data, c)))
            .take(limit)
            .map(|(id, d)| Document {
                id: id.clone(),
                data: d.data.clone(),
            })
            .collect())
    }
}

// region transaction

pub struct MemoryTransaction<'t> {
    store: &'t MemoryRemoteStore,
    reads: HashMap<DocumentRef, u64>,
    writes: Vec<WriteOp>,
}

#[async_trait::async_trait]
impl<'t> StoreTransaction for MemoryTransaction<'t> {
    async fn get(&mut self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        let state = lock(&self.store.state);
        let found = read_document(&state.collections, doc);
        let version = found.as_ref().map(|(_, v)| *v).unwrap_or(0);
        self.reads.entry(doc.clone()).or_insert(version);
        Ok(found.map(|(document, _)| document))
    }

    fn stage(&mut self, op: WriteOp) {
        self.writes.push(op);
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if let Some(e) = lock(&self.store.faults).fail_next_commit.take() {
            return Err(e);
        }
        self.store.check_write_fault()?;
        self.store.commit_ops(&self.writes, &self.reads, true)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

// endregion

// region helpers

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn version_of(collections: &Collections, doc: &DocumentRef) -> u64 {
    collections
        .get(&doc.collection)
        .and_then(|c| c.get(&doc.id))
        .map(|d| d.version)
        .unwrap_or(0)
}

fn read_document(collections: &Collections, doc: &DocumentRef) -> Option<(Document, u64)> {
    collections
        .get(&doc.collection)
        .and_then(|c| c.get(&doc.id))
        .map(|d| {
            (
                Document {
                    id: doc.id.clone(),
                    data: d.data.clone(),
                },
                d.version,
            )
        })
}

fn apply_op(collections: &mut Collections, op: &WriteOp, version: u64) -> Result<(), StoreError> {
    match op {
        WriteOp::Set { doc, data, merge } => {
            let documents = collections.entry(doc.collection.clone()).or_default();
            let data = match (documents.get(&doc.id), merge) {
                (Some(existing), true) => merge_objects(&existing.data, data),
                _ => data.clone(),
            };
            documents.insert(doc.id.clone(), StoredDocument { data, version });
        }
        WriteOp::Update { doc, patch } => {
            let existing = collections
                .get_mut(&doc.collection)
                .and_then(|c| c.get_mut(&doc.id))
                .ok_or_else(|| StoreError::NotFound(doc.to_string()))?;
            let Value::Object(fields) = &mut existing.data else {
                return Err(StoreError::Internal(format!("{doc} is not an object")));
            };
            for (field, update) in &patch.0 {
                apply_field_update(fields, field, update)
                    .map_err(|e| StoreError::Internal(format!("{doc}.{field}: {e}")))?;
            }
            existing.version = version;
        }
        WriteOp::Delete { doc } => {
            if let Some(documents) = collections.get_mut(&doc.collection) {
                documents.remove(&doc.id);
            }
        }
    }
    Ok(())
}

fn merge_objects(existing: &Value, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Value::Object(old), Value::Object(new)) => {
            let mut merged = old.clone();
            for (k, v) in new {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => incoming.clone(),
    }
}

fn apply_field_update(
    fields: &mut Map<String, Value>,
    field: &str,
    update: &FieldUpdate,
) -> Result<(), &'static str> {
    match update {
        FieldUpdate::Set(value) => {
            fields.insert(field.to_owned(), value.clone());
        }
        FieldUpdate::ArrayUnion(values) => {
            let entry = fields
                .entry(field.to_owned())
                .or_insert_with(|| Value::Array(Vec::new()));
            let Value::Array(items) = entry else {
                return Err("not an array");
            };
            for value in values {
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
        }
        FieldUpdate::ArrayRemoveWhere { key, value } => match fields.get_mut(field) {
            Some(Value::Array(items)) => items.retain(|item| item.get(key) != Some(value)),
            Some(_) => return Err("not an array"),
            None => {}
        },
    }
    Ok(())
}

fn matches_clause(data: &Value, clause: &WhereClause) -> bool {
    let Some(actual) = data.get(&clause.field) else {
        return false;
    };
    match (clause.op, compare_values(actual, &clause.value)) {
        (Comparison::Eq, _) => actual == &clause.value,
        (Comparison::Ge, Some(order)) => order != Ordering::Less,
        (Comparison::Le, Some(order)) => order != Ordering::Greater,
        (_, None) => false,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn snapshot_for(collections: &Collections, target: &ListenTarget) -> RemoteSnapshot {
    match target {
        ListenTarget::Document(doc) => {
            RemoteSnapshot::Document(read_document(collections, doc).map(|(d, _)| d))
        }
        ListenTarget::Collection(collection) => RemoteSnapshot::Collection(
            collections
                .get(collection)
                .map(|documents| {
                    documents
                        .iter()
                        .map(|(id, d)| Document {
                            id: id.clone(),
                            data: d.data.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        ),
    }
}

fn notify(state: &mut StoreState, touched: &BTreeSet<DocumentRef>) {
    state.listeners.retain(|l| !l.tx.is_closed());
    for listener in &state.listeners {
        let affected = match &listener.target {
            ListenTarget::Document(doc) => touched.contains(doc),
            ListenTarget::Collection(collection) => {
                touched.iter().any(|doc| &doc.collection == collection)
            }
        };
        if affected {
            let _ = listener
                .tx
                .send(Ok(snapshot_for(&state.collections, &listener.target)));
        }
    }
}

// endregion

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(name: &str) -> ProfileDocument {
        ProfileDocument {
            display_name: name.to_owned(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let store = MemoryRemoteStore::new();
        store.seed_profile(&"u1".into(), &profile("alice")).unwrap();

        let result = store
            .batch_write(vec![
                WriteOp::Update {
                    doc: DocumentRef::profile(&"u1".into()),
                    patch: Patch::new().set(DISPLAY_NAME_FIELD, json!("alicia")),
                },
                WriteOp::Update {
                    doc: DocumentRef::profile(&"missing".into()),
                    patch: Patch::new().set(DISPLAY_NAME_FIELD, json!("ghost")),
                },
            ])
            .await;

        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(store.profile(&"u1".into()).unwrap().display_name, "alice");
        assert!(store.write_log().is_empty());
    }

    #[tokio::test]
    async fn array_updates_union_and_remove_by_key() {
        let store = MemoryRemoteStore::new();
        store.seed_profile(&"u1".into(), &profile("alice")).unwrap();
        let doc = DocumentRef::profile(&"u1".into());
        let bob = json!({ "memberId": "u2", "displayName": "bob" });

        store
            .update_document(&doc, Patch::new().array_union(FRIENDS_FIELD, vec![bob.clone()]))
            .await
            .unwrap();
        store
            .update_document(&doc, Patch::new().array_union(FRIENDS_FIELD, vec![bob]))
            .await
            .unwrap();
        assert_eq!(store.profile(&"u1".into()).unwrap().friends.len(), 1);

        store
            .update_document(
                &doc,
                Patch::new().array_remove_where(FRIENDS_FIELD, MEMBER_ID_KEY, json!("u2")),
            )
            .await
            .unwrap();
        assert!(store.profile(&"u1".into()).unwrap().friends.is_empty());
    }

    #[tokio::test]
    async fn merge_set_keeps_other_fields() {
        let store = MemoryRemoteStore::new();
        let doc = DocumentRef::profile(&"u1".into());
        store
            .set_document(&doc, json!({ "displayName": "alice", "friends": [] }), false)
            .await
            .unwrap();
        store
            .set_document(&doc, json!({ "displayName": "alicia" }), true)
            .await
            .unwrap();
        assert_eq!(
            store.document(&doc).unwrap(),
            json!({ "displayName": "alicia", "friends": [] })
        );
    }

    #[tokio::test]
    async fn transaction_conflicts_when_a_read_changes() {
        let store = MemoryRemoteStore::new();
        store.seed_profile(&"u1".into(), &profile("alice")).unwrap();
        let doc = DocumentRef::profile(&"u1".into());

        let mut tx = store.begin_transaction().await.unwrap();
        tx.get(&doc).await.unwrap();
        store
            .update_document(&doc, Patch::new().set(DISPLAY_NAME_FIELD, json!("alicia")))
            .await
            .unwrap();
        tx.stage(WriteOp::Update {
            doc: doc.clone(),
            patch: Patch::new().set(DISPLAY_NAME_FIELD, json!("al")),
        });

        assert!(matches!(tx.commit().await, Err(StoreError::Conflict(_))));
        assert_eq!(store.profile(&"u1".into()).unwrap().display_name, "alicia");
    }

    #[tokio::test]
    async fn listeners_get_current_state_then_changes() {
        let store = MemoryRemoteStore::new();
        let receiver: MemberId = "u1".into();
        let target = ListenTarget::Collection(requests_collection(&receiver));
        let mut stream = store.subscribe(target).await.unwrap();

        assert_eq!(
            stream.recv().await.unwrap().unwrap(),
            RemoteSnapshot::Collection(Vec::new())
        );

        let body = RequestDocument {
            sender_id: "u2".into(),
            sender_display_name: "bob".into(),
        };
        store.seed_request(&receiver, &"r1".into(), &body).unwrap();

        match stream.recv().await.unwrap().unwrap() {
            RemoteSnapshot::Collection(docs) => assert_eq!(docs[0].id, "r1"),
            other => panic!("unexpected snapshot {other:?}"),
        }

        assert_eq!(store.listener_count(), 1);
        drop(stream);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn query_filters_by_range_and_limit() {
        let store = MemoryRemoteStore::new();
        for (id, name) in [("u1", "alice"), ("u2", "bob"), ("u3", "bobby"), ("u4", "carol")] {
            store.seed_profile(&id.into(), &profile(name)).unwrap();
        }
        let clauses = [
            WhereClause::new(DISPLAY_NAME_FIELD, Comparison::Ge, "bob"),
            WhereClause::new(DISPLAY_NAME_FIELD, Comparison::Le, "bob\u{f8ff}"),
        ];

        let found = store.query(USERS_COLLECTION, &clauses, 10).await.unwrap();
        let ids: Vec<_> = found.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["u2", "u3"]);

        let limited = store.query(USERS_COLLECTION, &clauses, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }
}
