//! Profile Service Library
//!
//! This crate stores profile records as JSON documents in CouchDB.
//! It can be driven from the bundled CLI or embedded behind any
//! profile-management layer through the `ProfileStore` trait.

pub mod config;
pub mod service;
pub mod store;

use std::sync::Arc;

use tracing::info;

use common::AppResult;

use crate::config::ProfileServiceConfig;
use crate::service::CouchProfileService;
use crate::store::{CouchClient, DocumentStore, InMemoryStore};

/// Build a profile service talking to the configured CouchDB database.
pub fn connect(config: &ProfileServiceConfig) -> AppResult<CouchProfileService> {
    let client = CouchClient::new(&config.couch)?;
    info!(
        "Using CouchDB database {} at {}",
        client.database(),
        config.couch.url
    );
    Ok(with_store(Arc::new(client), config))
}

/// Build a profile service over a fresh in-memory store.
pub fn in_memory(config: &ProfileServiceConfig) -> CouchProfileService {
    with_store(Arc::new(InMemoryStore::new()), config)
}

fn with_store(store: Arc<dyn DocumentStore>, config: &ProfileServiceConfig) -> CouchProfileService {
    CouchProfileService::new(store).with_decode_policy(config.decode_policy)
}

/// Create the database and the `by_<field>` views for the given fields.
pub async fn run_setup(config: &ProfileServiceConfig, fields: &[String]) -> AppResult<()> {
    let client = CouchClient::new(&config.couch)?;
    client.ensure_database().await?;
    if !fields.is_empty() {
        client.ensure_design_document(fields).await?;
    }
    info!("Database {} is ready", client.database());
    Ok(())
}
