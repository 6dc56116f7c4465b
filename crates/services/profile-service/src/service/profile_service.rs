//! Profile service - Persists profile records as CouchDB documents.
//!
//! The generic profile layer (credential checks, password encoding,
//! attribute mapping) calls back into a `ProfileStore`; this module
//! provides the document-store backed implementation.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use common::{AppError, AppResult, DecodeFailurePolicy};
use domain::{
    decode_attributes, decode_revision, identifier, merge, project, view_name, DomainError,
    ProfileAttributes, COUCH_ID, DESIGN_DOC_ID,
};

use crate::store::DocumentStore;

/// Storage extension points of a profile service.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Store a new profile record
    async fn insert(&self, attributes: &ProfileAttributes) -> AppResult<()>;

    /// Merge attributes into the stored record, creating it when missing
    async fn update(&self, attributes: &ProfileAttributes) -> AppResult<()>;

    /// Remove a record; missing records are not an error
    async fn delete_by_id(&self, id: &str) -> AppResult<()>;

    /// Find records whose `key` equals `value`, keeping only `names`
    /// (every field when `None`)
    async fn read(
        &self,
        names: Option<&[String]>,
        key: &str,
        value: &str,
    ) -> AppResult<Vec<ProfileAttributes>>;
}

/// Concrete implementation of ProfileStore over a document store.
///
/// The `_id` attribute addresses documents; lookups on any other key go
/// through the `by_<key>` view of the `_design/pac4j` design document.
pub struct CouchProfileService {
    store: Arc<dyn DocumentStore>,
    decode_policy: DecodeFailurePolicy,
}

impl CouchProfileService {
    /// Create a new profile service on top of a document store
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            decode_policy: DecodeFailurePolicy::default(),
        }
    }

    /// Choose how undecodable documents are surfaced
    pub fn with_decode_policy(mut self, policy: DecodeFailurePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    pub fn decode_policy(&self) -> DecodeFailurePolicy {
        self.decode_policy
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Log a decode failure, and return it only under `Report`.
    fn decode_failure(&self, id: &str, err: DomainError) -> AppResult<()> {
        error!("Cannot decode CouchDB document {}: {}", id, err);
        match self.decode_policy {
            DecodeFailurePolicy::Absorb => Ok(()),
            DecodeFailurePolicy::Report => Err(err.into()),
        }
    }
}

#[async_trait]
impl ProfileStore for CouchProfileService {
    async fn insert(&self, attributes: &ProfileAttributes) -> AppResult<()> {
        debug!("Insert doc: {:?}", attributes);
        self.store.create(attributes).await
    }

    async fn update(&self, attributes: &ProfileAttributes) -> AppResult<()> {
        let id = identifier(attributes)
            .ok_or_else(|| AppError::validation(format!("profile has no string {}", COUCH_ID)))?;

        let body = match self.store.get_as_stream(id).await {
            Ok(body) => body,
            Err(AppError::NotFound) => {
                debug!("Insert doc (not found by update()): {:?}", attributes);
                return self.store.create(attributes).await;
            }
            Err(e) => return Err(e),
        };

        let existing = match decode_attributes(&body) {
            Ok(existing) => existing,
            Err(e) => return self.decode_failure(id, e),
        };

        self.store.update(&merge(existing, attributes)).await?;
        debug!("Updating id: {} with attributes: {:?}", id, attributes);
        Ok(())
    }

    async fn delete_by_id(&self, id: &str) -> AppResult<()> {
        debug!("Delete id: {}", id);

        let body = match self.store.get_as_stream(id).await {
            Ok(body) => body,
            Err(AppError::NotFound) => {
                debug!("id {} is not in the database", id);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let rev = match decode_revision(&body) {
            Ok(rev) => rev,
            Err(e) => return self.decode_failure(id, e),
        };

        match self.store.delete(id, &rev).await {
            Err(AppError::NotFound) => {
                debug!("id {} was removed concurrently", id);
                Ok(())
            }
            other => other,
        }
    }

    async fn read(
        &self,
        names: Option<&[String]>,
        key: &str,
        value: &str,
    ) -> AppResult<Vec<ProfileAttributes>> {
        debug!("Reading key / value: {} / {}", key, value);
        let mut found = Vec::new();

        if key == COUCH_ID {
            match self.store.get_as_stream(value).await {
                Ok(body) => match decode_attributes(&body) {
                    Ok(document) => found.push(project(&document, names)),
                    Err(e) => self.decode_failure(value, e)?,
                },
                Err(AppError::NotFound) => debug!("Document id {} not found", value),
                Err(e) => return Err(e),
            }
        } else {
            // Requires a by_<key> view in the design document.
            let rows = self
                .store
                .query_view(DESIGN_DOC_ID, &view_name(key), value)
                .await?;
            for row in rows {
                match decode_attributes(row.value.as_bytes()) {
                    Ok(document) => found.push(project(&document, names)),
                    Err(e) => error!(
                        "Skipping undecodable row {} of view by_{}: {}",
                        row.id.as_deref().unwrap_or("?"),
                        key,
                        e
                    ),
                }
            }
        }

        debug!("Found: {:?}", found);
        Ok(found)
    }
}
