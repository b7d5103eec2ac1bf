//! The bond operator: composing templates and live issues.
//!
//! Bonding is polymorphic over its operands. Two templates compose into
//! a new compound template; a template bonded to a live issue is
//! instantiated and linked; two live issues just get an edge. The
//! dispatch itself lives on [`Engine`](crate::ops::Engine); this module
//! holds the vocabulary and the edge mapping.

use std::collections::HashMap;

use beads_core::enums::DependencyType;
use beads_core::entity::bond_type;

use crate::error::{EngineError, Result};
use crate::instantiate::InstantiateResult;

/// How two operands are bonded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondType {
    /// B waits for A.
    Sequential,
    /// A and B proceed independently.
    Parallel,
    /// B runs only if A fails.
    Conditional,
}

impl BondType {
    /// Returns the wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => bond_type::SEQUENTIAL,
            Self::Parallel => bond_type::PARALLEL,
            Self::Conditional => bond_type::CONDITIONAL,
        }
    }

    /// Parses a wire string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            bond_type::SEQUENTIAL => Ok(Self::Sequential),
            bond_type::PARALLEL => Ok(Self::Parallel),
            bond_type::CONDITIONAL => Ok(Self::Conditional),
            other => Err(EngineError::validation(
                "bond_type",
                format!("unknown bond type '{other}'"),
            )),
        }
    }

    /// The dependency type carried by the ordering edge between two
    /// bonded templates, if the bond orders them at all.
    pub fn template_edge(&self) -> Option<DependencyType> {
        match self {
            Self::Sequential => Some(DependencyType::Blocks),
            Self::Conditional => Some(DependencyType::ConditionalBlocks),
            Self::Parallel => None,
        }
    }

    /// The dependency type used when linking a spawned or live issue to
    /// another live issue.
    pub fn instance_edge(&self) -> DependencyType {
        match self {
            Self::Sequential => DependencyType::Blocks,
            Self::Conditional => DependencyType::ConditionalBlocks,
            Self::Parallel => DependencyType::ParentChild,
        }
    }
}

impl std::fmt::Display for BondType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options controlling a bond.
#[derive(Debug, Clone, Default)]
pub struct BondOptions {
    /// Instantiate into the ephemeral store (wisp phase) instead of the
    /// persistent one. Ignored for template+template bonds, which are
    /// always permanent.
    pub ephemeral: bool,
    /// Variables for any instantiation the bond performs.
    pub vars: HashMap<String, String>,
}

/// What a bond produced.
#[derive(Debug, Clone)]
pub enum BondResult {
    /// Two templates composed into a new compound template root.
    Compound { root_id: String },
    /// A template was instantiated and its spawned root linked to a
    /// live issue.
    Spawned {
        instantiated: InstantiateResult,
        edge: BondEdge,
    },
    /// Two live issues were linked directly.
    Linked { edge: BondEdge },
}

/// The edge a bond created.
#[derive(Debug, Clone)]
pub struct BondEdge {
    pub from: String,
    pub to: String,
    pub dep_type: DependencyType,
}
