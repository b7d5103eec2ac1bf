//! Filter types for querying issues.

use chrono::{DateTime, Utc};

use crate::enums::{IssueType, Status};

/// Structured filter translated to SQL by the storage layer.
///
/// All clauses combine with AND; absent fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub status: Option<Status>,
    pub assignee: Option<String>,
    pub issue_type: Option<IssueType>,

    // Numeric ranges
    pub priority_min: Option<i32>,
    pub priority_max: Option<i32>,

    /// AND semantics: issue must have ALL these labels.
    pub labels_all: Vec<String>,
    /// OR semantics: issue must have AT LEAST ONE of these labels.
    pub labels_any: Vec<String>,

    // Date windows
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub closed_after: Option<DateTime<Utc>>,
    pub closed_before: Option<DateTime<Utc>>,

    // Substring probes
    pub description_contains: Option<String>,
    pub notes_contains: Option<String>,

    // Empty/null checks
    pub empty_description: bool,
    pub no_assignee: bool,
    pub no_labels: bool,

    // Metadata probes (JSON blob)
    /// `(field, value)`: metadata must contain the field with this value.
    pub metadata_field_equals: Option<(String, String)>,
    /// Metadata must contain this key (any value).
    pub has_metadata_key: Option<String>,

    /// Glob over issue ids (`*` and `?` wildcards).
    pub ids_glob: Option<String>,

    /// Literal id-prefix match; used by partial-id resolution and
    /// hierarchical child scans.
    pub id_prefix: Option<String>,

    pub limit: Option<i32>,
}

impl IssueFilter {
    /// Filter matching every issue whose id starts with `prefix`.
    pub fn with_id_prefix(prefix: impl Into<String>) -> Self {
        Self {
            id_prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Filter matching issues in the given status.
    pub fn with_status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_unconstrained() {
        let f = IssueFilter::default();
        assert!(f.status.is_none());
        assert!(f.labels_all.is_empty());
        assert!(f.labels_any.is_empty());
        assert!(!f.empty_description);
        assert!(f.limit.is_none());
    }

    #[test]
    fn convenience_constructors() {
        let f = IssueFilter::with_id_prefix("bd-00");
        assert_eq!(f.id_prefix.as_deref(), Some("bd-00"));

        let f = IssueFilter::with_status(Status::Closed);
        assert_eq!(f.status, Some(Status::Closed));
    }
}
