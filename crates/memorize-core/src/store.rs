// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The document store the scheduler reads from and writes to.
//!
//! Documents live at slash-separated paths. A collection is the parent path of
//! its documents, so `users/u1/decks/d1/cards/c1` belongs to the collection
//! `users/u1/decks/d1/cards` and has the id `c1`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::Weak;

use serde_json::Map;
use serde_json::Value;

use crate::error::Fallible;
use crate::error::fail;
use crate::types::timestamp::Timestamp;

pub type Fields = Map<String, Value>;

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub path: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(path: impl Into<String>, fields: Fields) -> Self {
        Self {
            path: path.into(),
            fields,
        }
    }

    /// The last path segment.
    pub fn id(&self) -> &str {
        document_id(&self.path)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.fields.get(name).and_then(Value::as_bool)
    }

    pub fn f64_field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }

    /// Reads a non-negative integer field. Fails if the field is present but
    /// is not a non-negative integer that fits in a `u32`.
    pub fn u32_field(&self, name: &str) -> Fallible<Option<u32>> {
        match self.fields.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
                Some(n) => Ok(Some(n)),
                None => fail(format!(
                    "field '{name}' of {} is not a count: {value}",
                    self.path
                )),
            },
        }
    }

    pub fn timestamp_field(&self, name: &str) -> Fallible<Option<Timestamp>> {
        match self.fields.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(Timestamp::try_from(s.clone())?)),
            Some(value) => fail(format!(
                "field '{name}' of {} is not a timestamp: {value}",
                self.path
            )),
        }
    }
}

pub fn document_id(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// The collection a document path belongs to.
pub fn collection_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// The field equals the value.
    Eq(String, Value),
    /// The field is present and less than or equal to the value.
    Le(String, Value),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn le(field: &str, value: impl Into<Value>) -> Self {
        Filter::Le(field.to_string(), value.into())
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Filter::Eq(field, expected) => fields.get(field) == Some(expected),
            Filter::Le(field, bound) => fields
                .get(field)
                .and_then(|actual| compare_values(actual, bound))
                .is_some_and(|ordering| ordering != Ordering::Greater),
        }
    }
}

/// Ascending order on a field. Documents missing the field sort last, and ties
/// are broken by document id.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub field: String,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
        }
    }

    fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let by_field = match (a.fields.get(&self.field), b.fields.get(&self.field)) {
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_field.then_with(|| a.id().cmp(b.id()))
    }
}

/// Compares two values of the same kind. Values of different kinds are
/// unordered.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Filters, sorts and truncates the documents of a collection. Without an
/// ordering, documents keep the order they are given in.
pub fn run_query(
    documents: Vec<Document>,
    filters: &[Filter],
    order: Option<&OrderBy>,
    limit: Option<usize>,
) -> Vec<Document> {
    let mut matching: Vec<Document> = documents
        .into_iter()
        .filter(|doc| filters.iter().all(|filter| filter.matches(&doc.fields)))
        .collect();
    if let Some(order) = order {
        matching.sort_by(|a, b| order.compare(a, b));
    }
    if let Some(limit) = limit {
        matching.truncate(limit);
    }
    matching
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub kind: ChangeKind,
    pub path: String,
}

pub type Listener = Box<dyn Fn(&Change) + Send + Sync>;

struct ListenerTable {
    next_id: u64,
    entries: Vec<(u64, String, Listener)>,
}

/// A registry of change listeners. A listener registered on a document path
/// hears changes to that document; one registered on a collection path hears
/// changes to every document directly inside it.
///
/// Listeners run while the registry is locked, so they must not register or
/// unsubscribe listeners themselves.
#[derive(Clone)]
pub struct Listeners {
    table: Arc<Mutex<ListenerTable>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(ListenerTable {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub fn register(&self, path: &str, listener: Listener) -> ListenerHandle {
        let mut table = self.table.lock().unwrap();
        let id = table.next_id;
        table.next_id += 1;
        table.entries.push((id, path.to_string(), listener));
        ListenerHandle {
            table: Arc::downgrade(&self.table),
            id,
        }
    }

    pub fn notify(&self, change: &Change) {
        let table = self.table.lock().unwrap();
        let collection = collection_of(&change.path);
        for (_, path, listener) in table.entries.iter() {
            if path == &change.path || path == collection {
                listener(change);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Listeners {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a change listener registered. Dropping the handle unsubscribes.
pub struct ListenerHandle {
    table: Weak<Mutex<ListenerTable>>,
    id: u64,
}

impl ListenerHandle {
    pub fn unsubscribe(self) {}
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            let mut table = table.lock().unwrap();
            table.entries.retain(|(id, _, _)| *id != self.id);
        }
    }
}

/// The remote document database. Every call may suspend for an arbitrary
/// time and may fail.
pub trait RemoteStore: Send + Sync + 'static {
    /// Fetch a document, or `None` if nothing is stored at the path.
    fn get_document(&self, path: &str) -> impl Future<Output = Fallible<Option<Document>>> + Send;

    /// Fetch the documents directly inside a collection.
    fn query(
        &self,
        collection: &str,
        filters: &[Filter],
        order: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> impl Future<Output = Fallible<Vec<Document>>> + Send;

    /// Create or replace a document.
    fn set_document(&self, path: &str, fields: Fields) -> impl Future<Output = Fallible<()>> + Send;

    /// Create or replace several documents at once. Either every document is
    /// written or none is.
    fn set_documents(
        &self,
        documents: Vec<(String, Fields)>,
    ) -> impl Future<Output = Fallible<()>> + Send;

    /// Merge fields into an existing document. Fails if there is none.
    fn update_document(
        &self,
        path: &str,
        fields: Fields,
    ) -> impl Future<Output = Fallible<()>> + Send;

    /// Delete a document. Deleting a missing document is not an error.
    fn delete_document(&self, path: &str) -> impl Future<Output = Fallible<()>> + Send;

    /// Listen for changes to a document or to the documents of a collection.
    fn add_change_listener(&self, path: &str, listener: Listener) -> ListenerHandle;
}

/// A store that keeps every document in memory.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, Fields>>,
    listeners: Listeners,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self) -> MutexGuard<'_, BTreeMap<String, Fields>> {
        self.documents.lock().unwrap()
    }
}

impl RemoteStore for MemoryStore {
    async fn get_document(&self, path: &str) -> Fallible<Option<Document>> {
        let documents = self.acquire();
        Ok(documents
            .get(path)
            .map(|fields| Document::new(path, fields.clone())))
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
        order: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> Fallible<Vec<Document>> {
        let candidates: Vec<Document> = {
            let documents = self.acquire();
            documents
                .iter()
                .filter(|(path, _)| collection_of(path) == collection)
                .map(|(path, fields)| Document::new(path.clone(), fields.clone()))
                .collect()
        };
        Ok(run_query(candidates, filters, order, limit))
    }

    async fn set_document(&self, path: &str, fields: Fields) -> Fallible<()> {
        let previous = self.acquire().insert(path.to_string(), fields);
        let kind = match previous {
            Some(_) => ChangeKind::Modified,
            None => ChangeKind::Added,
        };
        self.listeners.notify(&Change {
            kind,
            path: path.to_string(),
        });
        Ok(())
    }

    async fn set_documents(&self, documents: Vec<(String, Fields)>) -> Fallible<()> {
        let changes: Vec<Change> = {
            let mut stored = self.acquire();
            documents
                .into_iter()
                .map(|(path, fields)| {
                    let kind = match stored.insert(path.clone(), fields) {
                        Some(_) => ChangeKind::Modified,
                        None => ChangeKind::Added,
                    };
                    Change { kind, path }
                })
                .collect()
        };
        for change in changes.iter() {
            self.listeners.notify(change);
        }
        Ok(())
    }

    async fn update_document(&self, path: &str, fields: Fields) -> Fallible<()> {
        {
            let mut documents = self.acquire();
            let Some(existing) = documents.get_mut(path) else {
                return fail(format!("no document to update at {path}"));
            };
            existing.extend(fields);
        }
        self.listeners.notify(&Change {
            kind: ChangeKind::Modified,
            path: path.to_string(),
        });
        Ok(())
    }

    async fn delete_document(&self, path: &str) -> Fallible<()> {
        let removed = self.acquire().remove(path);
        if removed.is_some() {
            self.listeners.notify(&Change {
                kind: ChangeKind::Removed,
                path: path.to_string(),
            });
        }
        Ok(())
    }

    fn add_change_listener(&self, path: &str, listener: Listener) -> ListenerHandle {
        self.listeners.register(path, listener)
    }
}
