//! Condition expressions evaluated against extracted values.
//!
//! The grammar is deliberately closed. A condition is either empty
//! (extract only), a comparison `x <op> <literal>` with
//! `<op>` one of `=== !== > >= < <=`, or one of the string calls
//! `x.includes('s')`, `x.startsWith('s')`, `x.endsWith('s')`. Anything else is
//! rejected at parse time and evaluates to `false`.
//!
//! # Module Structure
//!
//! - `ast` - Operators, literals and the `Condition` tree
//! - `parser` - Hand-written parser for the condition grammar
//! - `eval` - Evaluation, including the `.find(prop)` existence rule

mod ast;
mod eval;
mod parser;

pub use ast::{CompareOp, Condition, Literal, StringOp};
pub use eval::{evaluate, evaluate_rule};
pub use parser::ConditionError;
