//! The beads work-graph engine.
//!
//! Turns a persistent directed graph of issues and typed dependencies
//! into an actionable queue: ready-set computation, cycle detection,
//! tree rendering, template instantiation with variable substitution,
//! the bond composition operator, squash (ephemeral subgraph to
//! persistent digest), wisp garbage collection, debounced flush
//! scheduling, and cross-repo reference resolution.
//!
//! The engine consumes the storage capability from `beads-storage`; the
//! ephemeral "wisp" store is the same capability opened at a second path
//! and passed in explicitly.

pub mod bond;
pub mod cancel;
pub mod error;
pub mod external;
pub mod flush;
pub mod graph;
pub mod ident;
pub mod instantiate;
pub mod ops;
pub mod ready;
pub mod routing;
pub mod squash;
pub mod subgraph;
pub mod tree;
pub mod wisp;

pub use bond::{BondEdge, BondOptions, BondResult, BondType};
pub use cancel::CancelToken;
pub use error::{EngineError, Result};
pub use external::{ExternalRef, ExternalResolver};
pub use flush::FlushScheduler;
pub use instantiate::{InstantiateOptions, InstantiateResult};
pub use ops::{Engine, IssueWithCounts, NewIssue, Scope};
pub use squash::{SquashOptions, SquashResult};
pub use subgraph::Subgraph;
pub use tree::{TreeDirection, TreeNode, TreeOptions, TreeResult};
pub use wisp::{GcOptions, GcResult};
