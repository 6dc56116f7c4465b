//! Domain-level constants.
//!
//! These constants define the document layout shared with the store.

use once_cell::sync::Lazy;
use regex::Regex;

// =============================================================================
// Document fields
// =============================================================================

/// Identifier field of every stored document
pub const COUCH_ID: &str = "_id";

/// Revision field assigned by the store on every write
pub const COUCH_REV: &str = "_rev";

// =============================================================================
// Secondary-index views
// =============================================================================

/// Design document holding the `by_<field>` views
pub const DESIGN_DOC_ID: &str = "_design/pac4j";

/// Prefix of every secondary-index view name
pub const VIEW_PREFIX: &str = "by_";

static FIELD_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("field name pattern is valid")
});

/// Name of the view indexing documents by `field`.
pub fn view_name(field: &str) -> String {
    format!("{}{}", VIEW_PREFIX, field)
}

/// Check if a field name can be embedded in a generated view function.
pub fn is_valid_field_name(field: &str) -> bool {
    FIELD_NAME.is_match(field)
}
