//! Document store layer: the store contract and its backends.

mod couch;
mod document_store;
mod memory;

pub use couch::{design_views, CouchClient};
pub use document_store::{DocumentStore, ViewRow};
pub use memory::InMemoryStore;

#[cfg(any(test, feature = "test-utils"))]
pub use document_store::MockDocumentStore;
