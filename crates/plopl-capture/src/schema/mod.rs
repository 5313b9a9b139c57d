//! Schemas describing a target API call and the conditions its response
//! must satisfy.
//!
//! External payloads are loosely typed (`raw`); they are resolved once at
//! ingestion into the canonical [`Schema`] where every match rule is a
//! parsed `(PathExpr, Condition)` pair. Problems found on the way are kept
//! as [`Diagnostic`]s instead of failing the whole schema.
//!
//! # Module Structure
//!
//! - `raw` - Serde shapes of the canonical and wrapped schema documents
//! - `types` - Canonical schema, ingestion and diagnostics

mod raw;
mod types;

pub use raw::{
    ExpectedEntry, FieldGroup, FieldSpec, RawArgs, RawJsonArgs, RawMatch, RawRequest,
    RawResponse, RawSchema, RawSchemaBody,
};
pub use types::{Diagnostic, DiagnosticKind, MatchRule, RequestSpec, Schema, SchemaError};
