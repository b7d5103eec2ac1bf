//! Identifier service: allocation and partial-id resolution.
//!
//! Allocation draws a monotonic counter from the store's config table so
//! that ids sort in creation order and a rolled-back transaction
//! reclaims its counter values.

use std::collections::HashSet;

use beads_core::filter::IssueFilter;
use beads_core::idgen;
use beads_storage::{Storage, Transaction};

use crate::error::{EngineError, Result};

/// Config key holding the id allocation counter.
pub const ID_SEQ_KEY: &str = "id_seq";

/// Config key holding the per-repo issue prefix.
pub const ISSUE_PREFIX_KEY: &str = "issue_prefix";

/// Fallback prefix for stores with no configured `issue_prefix`.
pub const DEFAULT_PREFIX: &str = "bd";

/// Allocates a fresh id with the given prefix inside the transaction.
///
/// The counter advances with the transaction, so a rollback releases the
/// allocated suffixes.
pub fn allocate_id(
    tx: &dyn Transaction,
    prefix: &str,
) -> beads_storage::error::Result<String> {
    let seq: u64 = tx
        .get_config(ID_SEQ_KEY)?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
        + 1;
    tx.set_config(ID_SEQ_KEY, &seq.to_string())?;
    Ok(idgen::format_id(prefix, seq))
}

/// Allocates `parent.N` where N is the smallest unused positive integer
/// among the parent's direct hierarchical children.
///
/// Fails with NotFound when the parent does not exist (hierarchical id
/// consistency).
pub fn allocate_child_id(
    tx: &dyn Transaction,
    parent_id: &str,
) -> beads_storage::error::Result<String> {
    tx.get_issue(parent_id)?;

    let filter = IssueFilter::with_id_prefix(format!("{parent_id}."));
    let existing = tx.search_issues("", &filter)?;
    let used: HashSet<u32> = existing
        .iter()
        .filter(|i| idgen::is_direct_child(&i.id, parent_id))
        .filter_map(|i| idgen::child_ordinal(&i.id))
        .collect();

    let mut n = 1;
    while used.contains(&n) {
        n += 1;
    }
    Ok(idgen::child_id(parent_id, n))
}

/// Resolves a possibly-partial id to a full id.
///
/// - External references pass through verbatim.
/// - An exact match wins even when longer ids share the prefix.
/// - Otherwise the unique prefix match is returned; several matches fail
///   with [`EngineError::Ambiguous`], none with [`EngineError::NotFound`].
pub fn resolve_partial(store: &dyn Storage, partial: &str) -> Result<String> {
    if idgen::is_external_ref(partial) {
        return Ok(partial.to_string());
    }

    match store.get_issue(partial) {
        Ok(issue) => return Ok(issue.id),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.into()),
    }

    let matches = store.search_issues("", &IssueFilter::with_id_prefix(partial))?;
    let mut ids: Vec<String> = matches.into_iter().map(|i| i.id).collect();
    ids.sort();

    match ids.len() {
        0 => Err(EngineError::not_found("issue", partial)),
        1 => Ok(ids.remove(0)),
        _ => Err(EngineError::Ambiguous {
            partial: partial.to_string(),
            matches: ids,
        }),
    }
}

/// Resolves a partial against two stores in order (persistent first,
/// then ephemeral), combining their matches.
pub fn resolve_partial_multi(stores: &[&dyn Storage], partial: &str) -> Result<String> {
    if idgen::is_external_ref(partial) {
        return Ok(partial.to_string());
    }

    for store in stores {
        match store.get_issue(partial) {
            Ok(issue) => return Ok(issue.id),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }

    let mut ids: Vec<String> = Vec::new();
    for store in stores {
        let matches = store.search_issues("", &IssueFilter::with_id_prefix(partial))?;
        ids.extend(matches.into_iter().map(|i| i.id));
    }
    ids.sort();
    ids.dedup();

    match ids.len() {
        0 => Err(EngineError::not_found("issue", partial)),
        1 => Ok(ids.remove(0)),
        _ => Err(EngineError::Ambiguous {
            partial: partial.to_string(),
            matches: ids,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    fn store_with(ids: &[&str]) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for id in ids {
            let issue = IssueBuilder::new("x").id(*id).build();
            Storage::create_issue(&store, &issue, "test").unwrap();
        }
        store
    }

    #[test]
    fn allocation_is_sequential() {
        let store = store_with(&[]);
        let mut ids = Vec::new();
        for _ in 0..3 {
            store
                .run_in_transaction(&|tx| {
                    let id = allocate_id(tx, "bd")?;
                    let issue = IssueBuilder::new("seq").id(&id).build();
                    tx.create_issue(&issue, "test")?;
                    Ok(())
                })
                .unwrap();
        }
        let all = store
            .search_issues("", &IssueFilter::default())
            .unwrap();
        for issue in all {
            ids.push(issue.id);
        }
        ids.sort();
        assert_eq!(ids, vec!["bd-000001", "bd-000002", "bd-000003"]);
    }

    #[test]
    fn rollback_reclaims_counter() {
        let store = store_with(&[]);
        let result = store.run_in_transaction(&|tx| {
            allocate_id(tx, "bd")?;
            Err(beads_storage::StorageError::Internal("abort".into()))
        });
        assert!(result.is_err());

        store
            .run_in_transaction(&|tx| {
                let id = allocate_id(tx, "bd")?;
                assert_eq!(id, "bd-000001");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn child_allocation_fills_gaps_in_order() {
        let store = store_with(&["bd-000001"]);
        for expected in ["bd-000001.1", "bd-000001.2", "bd-000001.3"] {
            store
                .run_in_transaction(&|tx| {
                    let id = allocate_child_id(tx, "bd-000001")?;
                    assert_eq!(id, expected);
                    let issue = IssueBuilder::new("child").id(&id).build();
                    tx.create_issue(&issue, "test")?;
                    Ok(())
                })
                .unwrap();
        }
    }

    #[test]
    fn child_allocation_requires_parent() {
        let store = store_with(&[]);
        let result = store.run_in_transaction(&|tx| {
            allocate_child_id(tx, "bd-missing")?;
            Ok(())
        });
        assert!(result.is_err());
    }

    #[test]
    fn resolve_exact_match_wins() {
        let store = store_with(&["bd-000001", "bd-000001.1"]);
        assert_eq!(
            resolve_partial(&store, "bd-000001").unwrap(),
            "bd-000001"
        );
        assert_eq!(
            resolve_partial(&store, "bd-000001.1").unwrap(),
            "bd-000001.1"
        );
    }

    #[test]
    fn resolve_unique_prefix() {
        let store = store_with(&["bd-000abc", "bd-000abd"]);
        assert_eq!(
            resolve_partial(&store, "bd-000abc").unwrap(),
            "bd-000abc"
        );
        let err = resolve_partial(&store, "bd-000ab").unwrap_err();
        match err {
            EngineError::Ambiguous { matches, .. } => {
                assert_eq!(matches, vec!["bd-000abc", "bd-000abd"]);
            }
            other => panic!("expected ambiguous, got {other}"),
        }
    }

    #[test]
    fn resolve_missing_is_not_found() {
        let store = store_with(&["bd-000001"]);
        let err = resolve_partial(&store, "zz").unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn resolve_external_passes_through() {
        let store = store_with(&[]);
        assert_eq!(
            resolve_partial(&store, "external:beads:login").unwrap(),
            "external:beads:login"
        );
    }
}
