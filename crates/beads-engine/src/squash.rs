//! Squash: collapse a live subgraph into a single persistent digest.
//!
//! Cross-store squash is deliberately not transactional: the digest is
//! committed to the persistent store first, then the source issues are
//! deleted best-effort. A crash between the two loses ephemeral work but
//! never the digest.

use std::cell::RefCell;

use chrono::Utc;

use beads_core::dependency::Dependency;
use beads_core::entity::BondRef;
use beads_core::enums::{DependencyType, IssueType, Status};
use beads_core::issue::Issue;
use beads_storage::{Storage, Transaction as _};
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::ident;
use crate::subgraph::Subgraph;

/// Maximum characters of each step description quoted into a generated
/// digest body.
const DIGEST_DESCRIPTION_LIMIT: usize = 200;

/// Options controlling a squash.
#[derive(Debug, Clone, Default)]
pub struct SquashOptions {
    /// Caller-supplied digest body; when absent a step report is
    /// generated.
    pub summary: Option<String>,
    /// Preserve the source subgraph instead of deleting it.
    pub keep_children: bool,
}

/// Outcome of a squash.
#[derive(Debug, Clone)]
pub struct SquashResult {
    /// Id of the digest issue in the persistent store.
    pub digest_id: String,
    /// Issues removed from the source store.
    pub deleted: Vec<String>,
    /// Deletion failures, when the digest still succeeded (partial
    /// success).
    pub deletion_errors: Vec<String>,
}

/// Collapses `subgraph` into a digest issue created in `persistent`.
///
/// `source_store` identifies which member-store index of the loaded
/// subgraph is the ephemeral one whose issues get deleted; members
/// living in the persistent store (index 0) survive, matching the
/// cross-store contract where only wisps are collapsed.
pub fn squash(
    persistent: &dyn Storage,
    stores: &[&dyn Storage],
    subgraph: &Subgraph,
    opts: &SquashOptions,
    actor: &str,
) -> Result<SquashResult> {
    // Deletion set: every member not living in the persistent store,
    // plus the whole subgraph when the root itself is ephemeral.
    let root_is_persistent = subgraph.members[0].store == 0;
    let doomed: Vec<(String, usize)> = if opts.keep_children {
        Vec::new()
    } else {
        subgraph
            .members
            .iter()
            .filter(|m| !root_is_persistent || m.store != 0)
            .map(|m| (m.issue.id.clone(), m.store))
            .collect()
    };

    let wisp_count = if doomed.is_empty() {
        subgraph
            .members
            .iter()
            .filter(|m| !root_is_persistent || m.store != 0)
            .count()
    } else {
        doomed.len()
    };

    let body = match opts.summary {
        Some(ref s) => s.clone(),
        None => compose_digest(subgraph),
    };

    // The digest links back to the root only when the root survives;
    // otherwise the lineage lives in bonded_from so the persistent store
    // never holds an edge to a deleted ephemeral id.
    let root_survives =
        root_is_persistent && (opts.keep_children || !doomed.iter().any(|(id, _)| *id == subgraph.root_id));

    let now = Utc::now();
    let digest_cell: RefCell<Option<String>> = RefCell::new(None);
    let root_id = subgraph.root_id.clone();
    let root_title = subgraph.root().title.clone();

    persistent.run_in_transaction(&|tx| {
        let prefix = tx
            .get_config(ident::ISSUE_PREFIX_KEY)?
            .unwrap_or_else(|| ident::DEFAULT_PREFIX.to_string());
        let digest_id = ident::allocate_id(tx, &prefix)?;

        let mut digest = Issue::default();
        digest.id = digest_id.clone();
        digest.title = format!("Digest: {root_title}");
        digest.description = body.clone();
        digest.status = Status::Closed;
        digest.issue_type = IssueType::Other;
        digest.closed_at = Some(now);
        digest.closed_by = actor.to_string();
        digest.close_reason = format!("squashed from {wisp_count} wisps");
        digest.ephemeral = false;
        digest.created_at = now;
        digest.updated_at = now;
        digest.bonded_from = vec![BondRef::new(root_id.clone(), "squash")];
        tx.create_issue(&digest, actor)?;

        if root_survives {
            tx.add_dependency(
                &Dependency::new(
                    digest_id.clone(),
                    root_id.clone(),
                    DependencyType::ParentChild,
                    actor,
                ),
                actor,
            )?;
        }

        *digest_cell.borrow_mut() = Some(digest_id);
        Ok(())
    })?;

    let digest_id = digest_cell
        .into_inner()
        .ok_or_else(|| EngineError::validation("squash", "transaction produced no digest"))?;

    // Digest is committed; deletion is best-effort from here on.
    let mut deleted = Vec::new();
    let mut deletion_errors = Vec::new();
    for (id, store_idx) in doomed {
        match stores.get(store_idx) {
            Some(store) => match store.delete_issue(&id) {
                Ok(()) => deleted.push(id),
                Err(e) => {
                    warn!(id, error = %e, "failed to delete squashed issue");
                    deletion_errors.push(format!("{id}: {e}"));
                }
            },
            None => deletion_errors.push(format!("{id}: unknown store index {store_idx}")),
        }
    }

    Ok(SquashResult {
        digest_id,
        deleted,
        deletion_errors,
    })
}

/// Generates the digest body: heading, step count, completion stats, and
/// a bulleted step report.
pub fn compose_digest(subgraph: &Subgraph) -> String {
    let total = subgraph.len();
    let closed = subgraph
        .members
        .iter()
        .filter(|m| m.issue.status == Status::Closed)
        .count();

    let mut body = String::new();
    body.push_str(&format!("# Digest: {}\n\n", subgraph.root().title));
    body.push_str(&format!("{total} steps, {closed} completed\n\n"));

    for member in &subgraph.members {
        let issue = &member.issue;
        body.push_str(&format!("- [{}] {}", issue.status, issue.title));
        if !issue.description.is_empty() {
            let mut desc = issue.description.replace('\n', " ");
            if desc.len() > DIGEST_DESCRIPTION_LIMIT {
                let mut cut = DIGEST_DESCRIPTION_LIMIT;
                while !desc.is_char_boundary(cut) {
                    cut -= 1;
                }
                desc.truncate(cut);
                desc.push_str("...");
            }
            body.push_str(&format!(" -- {desc}"));
        }
        if !issue.close_reason.is_empty() {
            body.push_str(&format!(" ({})", issue.close_reason));
        }
        body.push('\n');
    }

    body
}
