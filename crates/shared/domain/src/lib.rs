//! Domain layer - Profile records as stored in the document database.
//!
//! This crate contains pure domain logic with no infrastructure dependencies:
//! the document field conventions, attribute projection and merge rules,
//! and the decoding of raw document bodies.

pub mod constants;
pub mod error;
pub mod profile;

pub use constants::*;
pub use error::{DomainError, DomainResult};
pub use profile::{
    decode_attributes, decode_revision, identifier, merge, project, revision, ProfileAttributes,
};
