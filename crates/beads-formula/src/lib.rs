//! Template variable engine for the beads system.
//!
//! Variable substitution is purely textual; the typed declarations in
//! [`types`] are an optional overlay a template can carry in its root
//! metadata.

pub mod engine;
pub mod types;

pub use engine::{classify_variables, extract_variables, resolve_vars, substitute_vars};
pub use types::{FormulaError, TemplateSchema, VarDef, Variable};
