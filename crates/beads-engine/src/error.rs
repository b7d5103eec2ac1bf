//! Engine error taxonomy and the exit-code mapping at the adapter
//! boundary.

use beads_storage::StorageError;

/// Errors surfaced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A referenced issue/skill/template does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity that was looked up.
        entity: String,
        /// The identifier (or partial) that was looked up.
        id: String,
    },

    /// A partial id matched more than one issue.
    #[error("ambiguous id '{partial}' matches: {}", matches.join(", "))]
    Ambiguous {
        /// The partial id that was resolved.
        partial: String,
        /// Every matching full id, sorted.
        matches: Vec<String>,
    },

    /// A field value violates constraints.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// The offending field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Required template variables were not supplied.
    #[error("missing template variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),

    /// A write would create (or the graph contains) a forbidden cycle.
    #[error("dependency cycle detected: {}", format_cycles(.0))]
    CycleDetected(Vec<Vec<String>>),

    /// A state transition violates lifecycle rules.
    #[error("illegal transition from '{from}' to '{to}'")]
    IllegalTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// A mutation was attempted in read-only mode.
    #[error("store is read-only")]
    Readonly,

    /// The operation's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Wraps an error from the storage capability.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Wraps an error from configuration loading.
    #[error("config error: {0}")]
    Config(#[from] beads_config::ConfigError),
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|c| c.join(" -> "))
        .collect::<Vec<_>>()
        .join("; ")
}

impl EngineError {
    /// Creates a [`EngineError::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a [`EngineError::Validation`].
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Maps the error to the process exit code an adapter should use:
    /// 1 general failure, 2 ambiguous id, 3 storage failure, 4 cancelled.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Ambiguous { .. } => 2,
            Self::Cancelled => 4,
            Self::Storage(e) if e.is_not_found() => 1,
            Self::Storage(_) | Self::Config(_) => 3,
            _ => 1,
        }
    }
}

impl From<beads_core::validation::ValidationError> for EngineError {
    fn from(e: beads_core::validation::ValidationError) -> Self {
        Self::Validation {
            field: e.field().to_string(),
            reason: e.to_string(),
        }
    }
}

impl From<beads_formula::FormulaError> for EngineError {
    fn from(e: beads_formula::FormulaError) -> Self {
        match e {
            beads_formula::FormulaError::MissingVariables(list) => Self::MissingVariables(list),
            beads_formula::FormulaError::InvalidName(name) => Self::Validation {
                field: "variable".into(),
                reason: format!("invalid name: {name}"),
            },
        }
    }
}

/// Converts a storage lookup error into an engine NotFound for the given
/// entity kind, passing other storage errors through.
pub(crate) fn map_not_found(e: StorageError, entity: &str, id: &str) -> EngineError {
    if e.is_not_found() {
        EngineError::not_found(entity, id)
    } else {
        EngineError::Storage(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(
            EngineError::not_found("issue", "bd-000001").exit_code(),
            1
        );
        assert_eq!(
            EngineError::Ambiguous {
                partial: "bd-".into(),
                matches: vec!["bd-000001".into(), "bd-000002".into()],
            }
            .exit_code(),
            2
        );
        assert_eq!(
            EngineError::Storage(StorageError::Connection("refused".into())).exit_code(),
            3
        );
        assert_eq!(EngineError::Cancelled.exit_code(), 4);
        assert_eq!(EngineError::Readonly.exit_code(), 1);
        assert_eq!(
            EngineError::CycleDetected(vec![vec!["a".into(), "b".into()]]).exit_code(),
            1
        );
    }

    #[test]
    fn cycle_display() {
        let e = EngineError::CycleDetected(vec![vec!["x".into(), "y".into()]]);
        assert!(e.to_string().contains("x -> y"));
    }
}
