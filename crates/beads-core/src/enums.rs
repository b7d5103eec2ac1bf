//! String-backed enum types for the beads data model.
//!
//! Every enum serializes as its wire string and deserializes any unknown
//! value into a `Custom(String)` variant, so rows written by a newer
//! version survive a round-trip through an older one.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Macro: enum with known string variants + a Custom(String) fallback.
// ---------------------------------------------------------------------------
macro_rules! define_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident,
        variants: [
            $( ($variant:ident, $str:expr) ),+ $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $variant, )+
            /// Unknown value preserved verbatim.
            Custom(String),
        }

        impl $name {
            /// Returns the wire string for this variant.
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $str, )+
                    Self::Custom(s) => s.as_str(),
                }
            }

            /// Returns `true` if this is the default variant.
            pub fn is_default(&self) -> bool {
                *self == Self::$default
            }

            /// Returns `true` for a known variant or a non-empty custom value.
            pub fn is_valid(&self) -> bool {
                match self {
                    Self::Custom(s) => !s.is_empty(),
                    _ => true,
                }
            }

            /// Returns every known wire string.
            pub fn known_values() -> &'static [&'static str] {
                &[ $( $str, )+ ]
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Ok(Self::from(String::deserialize(deserializer)?))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s {
                    $( $str => Self::$variant, )+
                    other => Self::Custom(other.to_owned()),
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                match s.as_str() {
                    $( $str => Self::$variant, )+
                    _ => Self::Custom(s),
                }
            }
        }
    };
}

// ===========================================================================
// Status
// ===========================================================================

define_enum! {
    /// Lifecycle state of an issue.
    Status, default = Open,
    variants: [
        (Open, "open"),
        (InProgress, "in_progress"),
        (Blocked, "blocked"),
        (Deferred, "deferred"),
        (Closed, "closed"),
    ]
}

impl Status {
    /// Returns `true` for the states in which an issue can be worked.
    ///
    /// Blocked, deferred and closed issues are never ready regardless of
    /// their dependency edges.
    pub fn is_workable(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }
}

// ===========================================================================
// IssueType
// ===========================================================================

define_enum! {
    /// Categorises the kind of work an issue represents.
    IssueType, default = Task,
    variants: [
        (Task, "task"),
        (Bug, "bug"),
        (Feature, "feature"),
        (Epic, "epic"),
        (Chore, "chore"),
        (Decision, "decision"),
        (Event, "event"),
        (Gate, "gate"),
        (Advice, "advice"),
        (Route, "route"),
        (Other, "other"),
    ]
}

impl IssueType {
    /// Normalises common aliases to their canonical form.
    pub fn normalize(&self) -> Self {
        match self.as_str() {
            "enhancement" | "feat" => Self::Feature,
            "dec" | "adr" => Self::Decision,
            _ => self.clone(),
        }
    }
}

// ===========================================================================
// DependencyType
// ===========================================================================

define_enum! {
    /// Relationship type carried by a dependency edge.
    DependencyType, default = Blocks,
    variants: [
        (Blocks, "blocks"),
        (Tracks, "tracks"),
        (Related, "related"),
        (ParentChild, "parent-child"),
        (DiscoveredFrom, "discovered-from"),
        (Until, "until"),
        (CausedBy, "caused-by"),
        (Validates, "validates"),
        (RelatesTo, "relates-to"),
        (Supersedes, "supersedes"),
        (ConditionalBlocks, "conditional-blocks"),
        (RequiresSkill, "requires-skill"),
    ]
}

impl DependencyType {
    /// Returns `true` if edges of this type participate in the ready
    /// computation. All other types are informational.
    pub fn affects_ready_work(&self) -> bool {
        matches!(
            self,
            Self::Blocks | Self::ParentChild | Self::ConditionalBlocks | Self::RequiresSkill
        )
    }

    /// Returns `true` for the edge types across which dependency cycles
    /// are forbidden (`blocks` and `parent-child`).
    pub fn forbids_cycles(&self) -> bool {
        matches!(self, Self::Blocks | Self::ParentChild)
    }
}

// ===========================================================================
// EventType
// ===========================================================================

/// Categorises audit trail observations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Created,
    Updated,
    Closed,
    Reopened,
    DependencyAdded,
    DependencyRemoved,
    LabelAdded,
    LabelRemoved,
    /// Catch-all for unknown / future event types.
    Other(String),
}

impl EventType {
    /// Returns the wire string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Closed => "closed",
            Self::Reopened => "reopened",
            Self::DependencyAdded => "dependency_added",
            Self::DependencyRemoved => "dependency_removed",
            Self::LabelAdded => "label_added",
            Self::LabelRemoved => "label_removed",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "created" => Self::Created,
            "updated" => Self::Updated,
            "closed" => Self::Closed,
            "reopened" => Self::Reopened,
            "dependency_added" => Self::DependencyAdded,
            "dependency_removed" => Self::DependencyRemoved,
            "label_added" => Self::LabelAdded,
            "label_removed" => Self::LabelRemoved,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_default_is_open() {
        assert_eq!(Status::default(), Status::Open);
        assert!(Status::Open.is_default());
        assert!(!Status::Closed.is_default());
    }

    #[test]
    fn status_workable() {
        assert!(Status::Open.is_workable());
        assert!(Status::InProgress.is_workable());
        assert!(!Status::Blocked.is_workable());
        assert!(!Status::Deferred.is_workable());
        assert!(!Status::Closed.is_workable());
    }

    #[test]
    fn status_serde_roundtrip() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, r#""in_progress""#);
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Status::InProgress);
    }

    #[test]
    fn status_custom_preserved() {
        let s: Status = serde_json::from_str(r#""triaging""#).unwrap();
        assert_eq!(s, Status::Custom("triaging".into()));
        assert_eq!(serde_json::to_string(&s).unwrap(), r#""triaging""#);
    }

    #[test]
    fn dependency_type_wire_strings() {
        assert_eq!(DependencyType::ParentChild.as_str(), "parent-child");
        assert_eq!(
            DependencyType::ConditionalBlocks.as_str(),
            "conditional-blocks"
        );
        assert_eq!(DependencyType::RequiresSkill.as_str(), "requires-skill");
    }

    #[test]
    fn dependency_type_ready_participation() {
        assert!(DependencyType::Blocks.affects_ready_work());
        assert!(DependencyType::ParentChild.affects_ready_work());
        assert!(DependencyType::ConditionalBlocks.affects_ready_work());
        assert!(DependencyType::RequiresSkill.affects_ready_work());
        assert!(!DependencyType::Related.affects_ready_work());
        assert!(!DependencyType::Tracks.affects_ready_work());
    }

    #[test]
    fn dependency_type_cycle_set() {
        assert!(DependencyType::Blocks.forbids_cycles());
        assert!(DependencyType::ParentChild.forbids_cycles());
        assert!(!DependencyType::ConditionalBlocks.forbids_cycles());
        assert!(!DependencyType::Related.forbids_cycles());
    }

    #[test]
    fn issue_type_normalize() {
        assert_eq!(
            IssueType::Custom("enhancement".into()).normalize(),
            IssueType::Feature
        );
        assert_eq!(
            IssueType::Custom("adr".into()).normalize(),
            IssueType::Decision
        );
        assert_eq!(IssueType::Bug.normalize(), IssueType::Bug);
    }

    #[test]
    fn event_type_roundtrip() {
        assert_eq!(EventType::from("reopened"), EventType::Reopened);
        assert_eq!(EventType::Reopened.as_str(), "reopened");
        let e: EventType = serde_json::from_str(r#""escalated""#).unwrap();
        assert_eq!(e, EventType::Other("escalated".into()));
    }
}
