//! Ephemeral lifecycle: garbage collection and burn.
//!
//! Wisps live in their own store, excluded from exports and sync. They
//! end in one of two ways: `squash` (a persistent digest survives) or
//! the operations here (nothing survives).

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use beads_core::enums::Status;
use beads_core::filter::IssueFilter;
use beads_storage::Storage;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::subgraph::load_subgraph;

/// Options for ephemeral garbage collection.
#[derive(Debug, Clone)]
pub struct GcOptions {
    /// Collect issues whose `updated_at` is older than this.
    pub age: Duration,
    /// Also collect closed issues.
    pub include_closed: bool,
    /// Report the selection without deleting.
    pub dry_run: bool,
}

/// Outcome of a GC or burn pass.
#[derive(Debug, Clone)]
pub struct GcResult {
    pub cleaned_ids: Vec<String>,
    pub count: usize,
    pub dry_run: bool,
}

/// Scans the ephemeral store and removes stale wisps.
///
/// An issue is selected when it has not been touched within the age
/// threshold and is either still open or `include_closed` is set.
pub fn wisp_gc(wisp: &dyn Storage, opts: &GcOptions, cancel: &CancelToken) -> Result<GcResult> {
    let cutoff = Utc::now() - opts.age;

    let stale = wisp.search_issues(
        "",
        &IssueFilter {
            updated_before: Some(cutoff),
            ..Default::default()
        },
    )?;

    let mut cleaned_ids: Vec<String> = Vec::new();
    for issue in stale {
        cancel.check()?;
        if issue.status == Status::Closed && !opts.include_closed {
            continue;
        }
        cleaned_ids.push(issue.id);
    }
    cleaned_ids.sort();

    if !opts.dry_run {
        for id in &cleaned_ids {
            cancel.check()?;
            if let Err(e) = wisp.delete_issue(id) {
                // Already-cascaded children are fine; anything else is
                // best-effort too.
                if !e.is_not_found() {
                    warn!(id, error = %e, "wisp gc deletion failed");
                }
            }
        }
        debug!(count = cleaned_ids.len(), "wisp gc pass complete");
    }

    Ok(GcResult {
        count: cleaned_ids.len(),
        dry_run: opts.dry_run,
        cleaned_ids,
    })
}

/// Removes a wisp subgraph outright, producing no digest.
pub fn burn(wisp: &dyn Storage, root_id: &str, cancel: &CancelToken) -> Result<GcResult> {
    let subgraph = load_subgraph(&[wisp], root_id, cancel)?;

    let mut cleaned_ids: Vec<String> = Vec::new();
    // Children first so parent deletion never strands a cascade.
    for member in subgraph.members.iter().rev() {
        cancel.check()?;
        match wisp.delete_issue(&member.issue.id) {
            Ok(()) => cleaned_ids.push(member.issue.id.clone()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(GcResult {
        count: cleaned_ids.len(),
        dry_run: false,
        cleaned_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::enums::DependencyType;
    use beads_core::dependency::Dependency;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn aged(store: &SqliteStore, id: &str, hours_old: i64, status: Status) {
        let stamp = Utc::now() - Duration::hours(hours_old);
        let mut b = IssueBuilder::new(id)
            .id(id)
            .ephemeral(true)
            .status(status.clone())
            .created_at(stamp)
            .updated_at(stamp);
        if status == Status::Closed {
            b = b.closed_at(stamp);
        }
        Storage::create_issue(store, &b.build(), "test").unwrap();
    }

    #[test]
    fn collects_only_stale_open_wisps() {
        let s = store();
        aged(&s, "w-000001", 48, Status::Open);
        aged(&s, "w-000002", 1, Status::Open);
        aged(&s, "w-000003", 48, Status::Closed);

        let result = wisp_gc(
            &s,
            &GcOptions {
                age: Duration::hours(24),
                include_closed: false,
                dry_run: false,
            },
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(result.cleaned_ids, vec!["w-000001"]);
        assert_eq!(result.count, 1);
        assert!(Storage::get_issue(&s, "w-000001").unwrap_err().is_not_found());
        assert!(Storage::get_issue(&s, "w-000002").is_ok());
        assert!(Storage::get_issue(&s, "w-000003").is_ok());
    }

    #[test]
    fn include_closed_widens_selection() {
        let s = store();
        aged(&s, "w-000001", 48, Status::Closed);

        let result = wisp_gc(
            &s,
            &GcOptions {
                age: Duration::hours(24),
                include_closed: true,
                dry_run: false,
            },
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(result.cleaned_ids, vec!["w-000001"]);
    }

    #[test]
    fn dry_run_reports_without_deleting() {
        let s = store();
        aged(&s, "w-000001", 48, Status::Open);

        let result = wisp_gc(
            &s,
            &GcOptions {
                age: Duration::hours(24),
                include_closed: false,
                dry_run: true,
            },
            &CancelToken::new(),
        )
        .unwrap();

        assert!(result.dry_run);
        assert_eq!(result.cleaned_ids, vec!["w-000001"]);
        assert!(Storage::get_issue(&s, "w-000001").is_ok());
    }

    #[test]
    fn burn_removes_whole_subgraph() {
        let s = store();
        aged(&s, "w-000001", 1, Status::Open);
        aged(&s, "w-000002", 1, Status::Open);
        Storage::add_dependency(
            &s,
            &Dependency::new("w-000002", "w-000001", DependencyType::ParentChild, "test"),
            "test",
        )
        .unwrap();
        // An unrelated wisp survives the burn.
        aged(&s, "w-000003", 1, Status::Open);

        let result = burn(&s, "w-000001", &CancelToken::new()).unwrap();
        assert_eq!(result.count, 2);
        assert!(Storage::get_issue(&s, "w-000001").unwrap_err().is_not_found());
        assert!(Storage::get_issue(&s, "w-000002").unwrap_err().is_not_found());
        assert!(Storage::get_issue(&s, "w-000003").is_ok());
    }
}
