//! Service layer - profile storage extension points.

mod profile_service;

pub use profile_service::{CouchProfileService, ProfileStore};
