//! Variable declarations for template instantiation.
//!
//! Templates may carry a structured variable schema in their root
//! metadata. Declared variables can have defaults; variables discovered
//! only by scanning template text are "free" and always required.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Declaration of a single template variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VarDef {
    /// What this variable is for.
    #[serde(default)]
    pub description: String,

    /// Whether the variable must be provided even when a default exists.
    #[serde(default)]
    pub required: bool,

    /// Default value (None = no default).
    #[serde(default)]
    pub default: Option<String>,
}

/// A variable as seen by the instantiation path: either declared in the
/// template schema or discovered free in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variable {
    /// Declared in the template's `vars` schema.
    Declared {
        name: String,
        required: bool,
        default: Option<String>,
    },
    /// Found by scanning text, with no declaration.
    Free(String),
}

impl Variable {
    /// The variable name.
    pub fn name(&self) -> &str {
        match self {
            Self::Declared { name, .. } => name,
            Self::Free(name) => name,
        }
    }

    /// Whether a value must be supplied for instantiation to proceed.
    pub fn is_required(&self) -> bool {
        match self {
            Self::Declared {
                required, default, ..
            } => *required || default.is_none(),
            Self::Free(_) => true,
        }
    }
}

/// The variable schema carried in a template root's metadata under the
/// `"vars"` key, with optional `"requires_skills"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSchema {
    /// Declared variables keyed by name.
    #[serde(default)]
    pub vars: HashMap<String, VarDef>,

    /// Skill tokens every instantiated issue requires.
    #[serde(default)]
    pub requires_skills: Vec<String>,
}

impl TemplateSchema {
    /// Parses the schema out of an issue metadata JSON blob. Absent or
    /// malformed schemas yield the empty default; templates without a
    /// schema are plain free-variable templates.
    pub fn from_metadata_json(metadata: Option<&str>) -> Self {
        metadata
            .and_then(|m| serde_json::from_str(m).ok())
            .unwrap_or_default()
    }
}

/// Errors from variable resolution.
#[derive(Debug, thiserror::Error)]
pub enum FormulaError {
    #[error("missing required variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),

    #[error("invalid variable name: {0}")]
    InvalidName(String),
}
