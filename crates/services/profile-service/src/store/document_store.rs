//! Document store contract used by the profile adapter.

use async_trait::async_trait;

use common::AppResult;
use domain::ProfileAttributes;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// One row of a secondary-index view query.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRow {
    /// Identifier of the document that emitted the row
    pub id: Option<String>,
    /// Key the row is indexed under
    pub key: serde_json::Value,
    /// Emitted value, as serialized JSON text
    pub value: String,
}

/// Document store trait for dependency injection.
///
/// `get_as_stream` and `delete` report a missing document as
/// `AppError::NotFound`; every other failure is a store failure.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write a new document, keeping the identifier it carries
    async fn create(&self, document: &ProfileAttributes) -> AppResult<()>;

    /// Raw JSON body of the current revision of a document
    async fn get_as_stream(&self, id: &str) -> AppResult<Vec<u8>>;

    /// Write a document that carries its current `_rev`
    async fn update(&self, document: &ProfileAttributes) -> AppResult<()>;

    /// Delete a specific revision of a document
    async fn delete(&self, id: &str, rev: &str) -> AppResult<()>;

    /// Query a named view of a design document by key
    async fn query_view(
        &self,
        design_doc_id: &str,
        view_name: &str,
        key: &str,
    ) -> AppResult<Vec<ViewRow>>;
}
