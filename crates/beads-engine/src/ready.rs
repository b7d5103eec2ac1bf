//! The ready computation: which issues are eligible for immediate work.
//!
//! An issue is ready iff its status is workable, its defer window has
//! passed, and every ready-affecting edge is satisfied:
//!
//! - `blocks` -> target closed (or satisfied external reference)
//! - `conditional-blocks` -> target closed with a failure outcome
//! - `parent-child` -> parent not closed
//! - `requires-skill` -> some closed issue provides the skill
//!
//! Informational edge types never block.

use std::collections::HashMap;

use chrono::Utc;

use beads_core::dependency::is_failure_close;
use beads_core::enums::{DependencyType, Status};
use beads_core::filter::IssueFilter;
use beads_core::idgen;
use beads_core::issue::{Issue, PROVIDES_LABEL_PREFIX};
use beads_storage::Storage;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::external::ExternalResolver;

/// Computes the ready set across the given stores (persistent first,
/// then the wisp store when present).
///
/// Returned issues are sorted by `(priority asc, updated_at desc, id
/// asc)`.
pub fn compute_ready(
    stores: &[&dyn Storage],
    resolver: Option<&ExternalResolver>,
    cancel: &CancelToken,
) -> Result<Vec<Issue>> {
    let now = Utc::now();
    let mut ready: Vec<Issue> = Vec::new();

    // Per-call caches; external and skill probes may repeat heavily.
    let mut external_cache: HashMap<String, bool> = HashMap::new();
    let mut skill_cache: HashMap<String, bool> = HashMap::new();

    for store in stores {
        cancel.check()?;
        let candidates = store.search_issues("", &IssueFilter::default())?;

        'candidates: for issue in candidates {
            cancel.check()?;

            if !issue.status.is_workable() {
                continue;
            }
            if let Some(defer) = issue.defer_until {
                if defer > now {
                    continue;
                }
            }

            for dep in store.get_dependency_records(&issue.id)? {
                if !dep.dep_type.affects_ready_work() {
                    continue;
                }

                if idgen::is_external_ref(&dep.depends_on_id) {
                    let satisfied = *external_cache
                        .entry(dep.depends_on_id.clone())
                        .or_insert_with(|| {
                            resolver
                                .map(|r| r.is_satisfied_str(&dep.depends_on_id))
                                .unwrap_or(false)
                        });
                    if !satisfied {
                        continue 'candidates;
                    }
                    continue;
                }

                match dep.dep_type {
                    DependencyType::Blocks => {
                        if !target_closed(stores, &dep.depends_on_id)? {
                            continue 'candidates;
                        }
                    }
                    DependencyType::ConditionalBlocks => {
                        if !target_failed(stores, &dep.depends_on_id)? {
                            continue 'candidates;
                        }
                    }
                    DependencyType::ParentChild => {
                        // Ready children only make sense under an open
                        // parent. A vanished parent does not block.
                        if let Some(parent) = lookup(stores, &dep.depends_on_id)? {
                            if parent.status == Status::Closed {
                                continue 'candidates;
                            }
                        }
                    }
                    DependencyType::RequiresSkill => {
                        let skill = dep.depends_on_id.clone();
                        let provided =
                            *match skill_cache.entry(skill) {
                                std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                                std::collections::hash_map::Entry::Vacant(e) => {
                                    let v = skill_provided(stores, e.key())?;
                                    e.insert(v)
                                }
                            };
                        if !provided {
                            continue 'candidates;
                        }
                    }
                    _ => {}
                }
            }

            ready.push(issue);
        }
    }

    ready.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(ready)
}

fn lookup(stores: &[&dyn Storage], id: &str) -> Result<Option<Issue>> {
    for store in stores {
        match store.get_issue(id) {
            Ok(issue) => return Ok(Some(issue)),
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(None)
}

/// A `blocks` target is satisfied when closed. Missing targets keep the
/// source blocked (no dangling optimism).
fn target_closed(stores: &[&dyn Storage], id: &str) -> Result<bool> {
    Ok(lookup(stores, id)?.is_some_and(|i| i.status == Status::Closed))
}

/// A `conditional-blocks` target is satisfied only by a failure close.
fn target_failed(stores: &[&dyn Storage], id: &str) -> Result<bool> {
    Ok(lookup(stores, id)?
        .is_some_and(|i| i.status == Status::Closed && is_failure_close(&i.close_reason)))
}

/// A skill is provided when any closed issue carries the
/// `provides:<skill>` label.
fn skill_provided(stores: &[&dyn Storage], skill: &str) -> Result<bool> {
    let label = format!("{PROVIDES_LABEL_PREFIX}{skill}");
    for store in stores {
        let providers = store.get_issues_by_label(&label)?;
        if providers.iter().any(|i| i.status == Status::Closed) {
            return Ok(true);
        }
    }
    Ok(false)
}
