//! Bond lineage references for compound molecules.

use serde::{Deserialize, Serialize};

/// Records one source of a compound issue.
///
/// When templates or live subgraphs are bonded together, each operand is
/// remembered as a `BondRef` on the resulting root so the composition can
/// be traced later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondRef {
    /// Source template or issue ID.
    pub source_id: String,

    /// Bond type: sequential, parallel, conditional.
    pub bond_type: String,

    /// Attachment site (issue ID, or empty for the root).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bond_point: String,
}

impl BondRef {
    /// Creates a root-attached bond reference.
    pub fn new(source_id: impl Into<String>, bond_type: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            bond_type: bond_type.into(),
            bond_point: String::new(),
        }
    }
}

/// Bond type constants for compound composition.
pub mod bond_type {
    pub const SEQUENTIAL: &str = "sequential";
    pub const PARALLEL: &str = "parallel";
    pub const CONDITIONAL: &str = "conditional";
}
