//! Path expressions for pulling values out of JSON response bodies.
//!
//! A path is a dot-separated list of keys. A key may carry a `[]` marker to
//! step into an array-valued field, and the path may end in one of two
//! pseudo-accessors applied to the array reached so far:
//!
//! - `data.items[].length()` - element count (0 when not an array)
//! - `data.users[].find(role)` - `role` of the first element that has it
//!
//! Extraction is total: any traversal failure yields `null`.
//!
//! # Module Structure
//!
//! - `expr` - Path grammar and the parsed `PathExpr`
//! - `extract` - Document traversal

mod expr;
mod extract;

pub use expr::{Accessor, PathError, PathExpr, Segment};
pub use extract::extract;
