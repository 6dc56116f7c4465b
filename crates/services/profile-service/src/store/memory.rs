//! In-memory document store with CouchDB revision semantics.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use common::{AppError, AppResult, OptionExt};
use domain::{identifier, revision, ProfileAttributes, COUCH_REV, DESIGN_DOC_ID, VIEW_PREFIX};

use super::{DocumentStore, ViewRow};

/// Document store kept in a shared map.
///
/// Every write bumps the `<generation>-<hex>` revision, and writes that
/// name a stale revision are rejected as conflicts. Views resolve
/// `by_<field>` in the profile design document to an equality scan.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    documents: Arc<RwLock<HashMap<String, ProfileAttributes>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of a stored document, including its `_rev`.
    pub fn document(&self, id: &str) -> Option<ProfileAttributes> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn next_revision(current: Option<&str>) -> String {
        let generation = current
            .and_then(|rev| rev.split('-').next())
            .and_then(|g| g.parse::<u64>().ok())
            .unwrap_or(0);
        format!("{}-{}", generation + 1, Uuid::new_v4().simple())
    }

    fn document_id(document: &ProfileAttributes) -> AppResult<String> {
        identifier(document)
            .map(str::to_string)
            .ok_or_else(|| AppError::validation("document has no string _id"))
    }
}

/// View keys are always sent as JSON strings, so only string fields match.
fn matches_key(value: Option<&Value>, key: &str) -> bool {
    matches!(value, Some(Value::String(s)) if s == key)
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn create(&self, document: &ProfileAttributes) -> AppResult<()> {
        let id = Self::document_id(document)?;
        let mut docs = self
            .documents
            .write()
            .map_err(|_| AppError::internal("document map lock poisoned"))?;

        if docs.contains_key(&id) {
            return Err(AppError::conflict(format!("document {} already exists", id)));
        }

        let mut stored = document.clone();
        stored.insert(COUCH_REV.to_string(), Value::String(Self::next_revision(None)));
        docs.insert(id, stored);
        Ok(())
    }

    async fn get_as_stream(&self, id: &str) -> AppResult<Vec<u8>> {
        let docs = self
            .documents
            .read()
            .map_err(|_| AppError::internal("document map lock poisoned"))?;
        let document = docs.get(id).ok_or_not_found()?;
        Ok(serde_json::to_vec(document)?)
    }

    async fn update(&self, document: &ProfileAttributes) -> AppResult<()> {
        let id = Self::document_id(document)?;
        let mut docs = self
            .documents
            .write()
            .map_err(|_| AppError::internal("document map lock poisoned"))?;

        let current = docs.get(&id).and_then(|doc| revision(doc)).map(str::to_string);
        if current.as_deref() != revision(document) {
            return Err(AppError::conflict(format!("stale revision for {}", id)));
        }

        let mut stored = document.clone();
        stored.insert(
            COUCH_REV.to_string(),
            Value::String(Self::next_revision(current.as_deref())),
        );
        docs.insert(id, stored);
        Ok(())
    }

    async fn delete(&self, id: &str, rev: &str) -> AppResult<()> {
        let mut docs = self
            .documents
            .write()
            .map_err(|_| AppError::internal("document map lock poisoned"))?;

        let current = docs.get(id).ok_or_not_found()?;
        if revision(current) != Some(rev) {
            return Err(AppError::conflict(format!("stale revision for {}", id)));
        }
        docs.remove(id);
        Ok(())
    }

    async fn query_view(
        &self,
        design_doc_id: &str,
        view_name: &str,
        key: &str,
    ) -> AppResult<Vec<ViewRow>> {
        if design_doc_id != DESIGN_DOC_ID {
            return Err(AppError::NotFound);
        }
        let field = view_name.strip_prefix(VIEW_PREFIX).ok_or_not_found()?;

        let docs = self
            .documents
            .read()
            .map_err(|_| AppError::internal("document map lock poisoned"))?;

        let mut rows = Vec::new();
        for (id, document) in docs.iter() {
            if matches_key(document.get(field), key) {
                rows.push(ViewRow {
                    id: Some(id.clone()),
                    key: Value::String(key.to_string()),
                    value: serde_json::to_string(document)?,
                });
            }
        }
        Ok(rows)
    }
}
