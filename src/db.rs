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

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use memorize_core::error::Fallible;
use memorize_core::error::fail;
use memorize_core::store::Change;
use memorize_core::store::ChangeKind;
use memorize_core::store::Document;
use memorize_core::store::Fields;
use memorize_core::store::Filter;
use memorize_core::store::Listener;
use memorize_core::store::ListenerHandle;
use memorize_core::store::Listeners;
use memorize_core::store::OrderBy;
use memorize_core::store::RemoteStore;
use memorize_core::store::collection_of;
use memorize_core::store::run_query;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;

/// A document store in a single SQLite table. Each document is a row holding
/// its path, the collection it belongs to, and its fields as JSON.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    listeners: Listeners,
}

impl SqliteStore {
    pub fn new(database_path: &str) -> Fallible<Self> {
        let mut conn = Connection::open(database_path)?;
        {
            let tx = conn.transaction()?;
            if !probe_schema_exists(&tx)? {
                tx.execute_batch(include_str!("schema.sql"))?;
                tx.commit()?;
            }
        }
        let conn = Arc::new(Mutex::new(conn));
        Ok(Self {
            conn,
            listeners: Listeners::new(),
        })
    }

    /// The number of documents in the store.
    pub fn document_count(&self) -> Fallible<usize> {
        let conn = self.acquire();
        let count: i64 = conn.query_row("select count(*) from documents;", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn acquire(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn read_fields(&self, path: &str) -> Fallible<Option<Fields>> {
        let conn = self.acquire();
        let sql = "select fields from documents where path = ?;";
        let fields: Option<String> = conn.query_row(sql, [path], |row| row.get(0)).optional()?;
        match fields {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn notify(&self, kind: ChangeKind, path: &str) {
        self.listeners.notify(&Change {
            kind,
            path: path.to_string(),
        });
    }
}

impl RemoteStore for SqliteStore {
    async fn get_document(&self, path: &str) -> Fallible<Option<Document>> {
        Ok(self
            .read_fields(path)?
            .map(|fields| Document::new(path, fields)))
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
        order: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> Fallible<Vec<Document>> {
        let mut documents = Vec::new();
        {
            let conn = self.acquire();
            let sql = "select path, fields from documents where collection = ? order by path;";
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query([collection])?;
            while let Some(row) = rows.next()? {
                let path: String = row.get(0)?;
                let json: String = row.get(1)?;
                let fields: Fields = serde_json::from_str(&json)?;
                documents.push(Document::new(path, fields));
            }
        }
        Ok(run_query(documents, filters, order, limit))
    }

    async fn set_document(&self, path: &str, fields: Fields) -> Fallible<()> {
        let existed = {
            let mut conn = self.acquire();
            let tx = conn.transaction()?;
            let existed = document_exists(&tx, path)?;
            upsert_document(&tx, path, &fields)?;
            tx.commit()?;
            existed
        };
        let kind = if existed {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        self.notify(kind, path);
        Ok(())
    }

    async fn set_documents(&self, documents: Vec<(String, Fields)>) -> Fallible<()> {
        let mut changes = Vec::with_capacity(documents.len());
        {
            let mut conn = self.acquire();
            let tx = conn.transaction()?;
            for (path, fields) in documents {
                let kind = if document_exists(&tx, &path)? {
                    ChangeKind::Modified
                } else {
                    ChangeKind::Added
                };
                upsert_document(&tx, &path, &fields)?;
                changes.push(Change { kind, path });
            }
            tx.commit()?;
        }
        for change in changes.iter() {
            self.listeners.notify(change);
        }
        Ok(())
    }

    async fn update_document(&self, path: &str, fields: Fields) -> Fallible<()> {
        {
            let mut conn = self.acquire();
            let tx = conn.transaction()?;
            let sql = "select fields from documents where path = ?;";
            let existing: Option<String> =
                tx.query_row(sql, [path], |row| row.get(0)).optional()?;
            let Some(existing) = existing else {
                return fail(format!("no document to update at {path}"));
            };
            let mut merged: Fields = serde_json::from_str(&existing)?;
            merged.extend(fields);
            let json = serde_json::to_string(&merged)?;
            tx.execute("update documents set fields = ? where path = ?;", (&json, path))?;
            tx.commit()?;
        }
        self.notify(ChangeKind::Modified, path);
        Ok(())
    }

    async fn delete_document(&self, path: &str) -> Fallible<()> {
        let deleted = {
            let conn = self.acquire();
            conn.execute("delete from documents where path = ?;", [path])?
        };
        if deleted > 0 {
            self.notify(ChangeKind::Removed, path);
        }
        Ok(())
    }

    fn add_change_listener(&self, path: &str, listener: Listener) -> ListenerHandle {
        self.listeners.register(path, listener)
    }
}

fn upsert_document(tx: &Transaction, path: &str, fields: &Fields) -> Fallible<()> {
    let json = serde_json::to_string(fields)?;
    let sql = "insert into documents (path, collection, fields) values (?, ?, ?) on conflict (path) do update set fields = excluded.fields;";
    tx.execute(sql, (path, collection_of(path), &json))?;
    Ok(())
}

fn document_exists(tx: &Transaction, path: &str) -> Fallible<bool> {
    let sql = "select count(*) from documents where path = ?;";
    let count: i64 = tx.query_row(sql, [path], |row| row.get(0))?;
    Ok(count > 0)
}

fn probe_schema_exists(tx: &Transaction) -> Fallible<bool> {
    let sql = "select count(*) from sqlite_master where type='table' AND name=?;";
    let count: i64 = tx.query_row(sql, ["documents"], |row| row.get(0))?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use serde_json::Value;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memorize.sqlite3");
        let store = SqliteStore::new(path.to_str().unwrap()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_set_get_update_delete() -> Fallible<()> {
        let (_dir, store) = temp_store();
        let path = "decks/spanish/cards/hola";
        assert_eq!(store.get_document(path).await?, None);

        store
            .set_document(path, fields(json!({"front": "hola", "viewCount": 0})))
            .await?;
        let doc = store.get_document(path).await?.unwrap();
        assert_eq!(doc.id(), "hola");
        assert_eq!(doc.str_field("front"), Some("hola"));

        store
            .update_document(path, fields(json!({"viewCount": 1})))
            .await?;
        let doc = store.get_document(path).await?.unwrap();
        assert_eq!(doc.str_field("front"), Some("hola"));
        assert_eq!(doc.u32_field("viewCount")?, Some(1));

        store.delete_document(path).await?;
        assert_eq!(store.get_document(path).await?, None);
        store.delete_document(path).await?;
        assert_eq!(store.document_count()?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let (_dir, store) = temp_store();
        let result = store
            .update_document("users/alice", fields(json!({"xp": 1})))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_query_filters_order_and_limit() -> Fallible<()> {
        let (_dir, store) = temp_store();
        let collection = "users/alice/decks/spanish/cards";
        let docs = [
            ("a", json!({"new": false, "due": "2025-03-11T00:00:00.000"})),
            ("b", json!({"new": false, "due": "2025-03-09T00:00:00.000"})),
            ("c", json!({"new": true, "due": null})),
            ("d", json!({"new": false, "due": "2025-03-01T00:00:00.000"})),
        ];
        for (id, value) in docs {
            store
                .set_document(&format!("{collection}/{id}"), fields(value))
                .await?;
        }
        // Documents of nested collections are not part of the query.
        store
            .set_document(
                &format!("{collection}/a/history/000000"),
                fields(json!({"new": false})),
            )
            .await?;

        let due = store
            .query(
                collection,
                &[
                    Filter::eq("new", false),
                    Filter::le("due", "2025-03-10T00:00:00.000"),
                ],
                Some(&OrderBy::asc("due")),
                None,
            )
            .await?;
        let ids: Vec<&str> = due.iter().map(|doc| doc.id()).collect();
        assert_eq!(ids, vec!["d", "b"]);

        let first = store
            .query(collection, &[], Some(&OrderBy::asc("due")), Some(1))
            .await?;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id(), "d");

        let new = store
            .query(collection, &[Filter::eq("new", true)], None, None)
            .await?;
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].id(), "c");
        Ok(())
    }

    #[tokio::test]
    async fn test_listeners_see_changes() -> Fallible<()> {
        let (_dir, store) = temp_store();
        let removed = Arc::new(AtomicUsize::new(0));
        let counter = removed.clone();
        let handle = store.add_change_listener(
            "decks/spanish/cards",
            Box::new(move |change: &Change| {
                if change.kind == ChangeKind::Removed {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );
        store
            .set_document("decks/spanish/cards/hola", fields(json!({})))
            .await?;
        store.delete_document("decks/spanish/cards/hola").await?;
        store.delete_document("decks/spanish/cards/hola").await?;
        assert_eq!(removed.load(Ordering::SeqCst), 1);

        drop(handle);
        store
            .set_document("decks/spanish/cards/adios", fields(json!({})))
            .await?;
        store.delete_document("decks/spanish/cards/adios").await?;
        assert_eq!(removed.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_set_documents_in_one_transaction() -> Fallible<()> {
        let (_dir, store) = temp_store();
        store
            .set_documents(vec![
                ("users/alice/decks/d1/cards/c1".to_string(), fields(json!({"count": 1}))),
                (
                    "users/alice/decks/d1/cards/c1/history/000000".to_string(),
                    fields(json!({"rating": "easy"})),
                ),
            ])
            .await?;
        assert_eq!(store.document_count()?, 2);

        // Reject history entries so the second write of the batch fails.
        store.acquire().execute_batch(
            "create trigger reject_history before insert on documents
             when new.path like '%/history/%'
             begin select raise(abort, 'history rejected'); end;",
        )?;
        let result = store
            .set_documents(vec![
                ("users/alice/decks/d1/cards/c2".to_string(), fields(json!({"count": 1}))),
                (
                    "users/alice/decks/d1/cards/c2/history/000000".to_string(),
                    fields(json!({"rating": "easy"})),
                ),
            ])
            .await;
        assert!(result.is_err());
        assert_eq!(store.get_document("users/alice/decks/d1/cards/c2").await?, None);
        assert_eq!(store.document_count()?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_reopen_keeps_documents() -> Fallible<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memorize.sqlite3");
        let path = path.to_str().unwrap();
        {
            let store = SqliteStore::new(path)?;
            store
                .set_document("users/alice", fields(json!({"xp": 3})))
                .await?;
        }
        let store = SqliteStore::new(path)?;
        let user = store.get_document("users/alice").await?.unwrap();
        assert_eq!(user.fields.get("xp").and_then(Value::as_u64), Some(3));
        Ok(())
    }
}
