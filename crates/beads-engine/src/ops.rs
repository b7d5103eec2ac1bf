//! The engine's operation surface.
//!
//! [`Engine`] owns the persistent store, the optional ephemeral (wisp)
//! store handle, and the ambient pieces every operation needs: actor
//! identity, cancellation, the readonly flag, and the flush scheduler.
//! A command layer wraps these operations one-to-one.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use beads_core::dependency::{Dependency, DependencyCounts};
use beads_core::entity::BondRef;
use beads_core::enums::{DependencyType, IssueType, Status};
use beads_core::filter::IssueFilter;
use beads_core::issue::{Issue, TEMPLATE_LABEL};
use beads_core::validation;
use beads_storage::{IssueUpdates, Storage, Transaction as _};

use crate::bond::{BondEdge, BondOptions, BondResult, BondType};
use crate::cancel::CancelToken;
use crate::error::{EngineError, Result, map_not_found};
use crate::external::ExternalResolver;
use crate::flush::FlushScheduler;
use crate::graph;
use crate::ident;
use crate::instantiate::{self, InstantiateOptions, InstantiateResult};
use crate::ready;
use crate::squash::{self, SquashOptions, SquashResult};
use crate::subgraph::{self, Subgraph};
use crate::tree::{self, TreeOptions, TreeResult};
use crate::wisp::{self, GcOptions, GcResult};

/// Prefix under which opaque user key-value pairs live in config.
pub const USER_KV_PREFIX: &str = "kv.";

/// Suffix appended to the repo prefix for ids allocated in the wisp
/// store, keeping the two id spaces disjoint.
pub const WISP_ID_SUFFIX: &str = "wisp";

/// Which store an issue was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Persistent,
    Ephemeral,
}

/// Fields for a new issue.
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub design: String,
    pub acceptance_criteria: String,
    pub notes: String,
    pub priority: i32,
    pub issue_type: IssueType,
    pub assignee: String,
    pub labels: Vec<String>,
    pub ephemeral: bool,
    pub pinned: bool,
    pub defer_until: Option<DateTime<Utc>>,
}

impl Default for NewIssue {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            design: String::new(),
            acceptance_criteria: String::new(),
            notes: String::new(),
            priority: 2,
            issue_type: IssueType::Task,
            assignee: String::new(),
            labels: Vec::new(),
            ephemeral: false,
            pinned: false,
            defer_until: None,
        }
    }
}

impl NewIssue {
    /// Minimal constructor.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// A search hit with its labels and edge counts attached.
#[derive(Debug, Clone)]
pub struct IssueWithCounts {
    pub issue: Issue,
    pub counts: DependencyCounts,
}

/// The work-graph engine.
pub struct Engine {
    store: Arc<dyn Storage>,
    wisp: Option<Arc<dyn Storage>>,
    beads_dir: Option<PathBuf>,
    actor: String,
    readonly: bool,
    cancel: CancelToken,
    flush: Option<FlushScheduler>,
}

impl Engine {
    /// Creates an engine over a persistent store.
    pub fn new(store: Arc<dyn Storage>, actor: impl Into<String>) -> Self {
        Self {
            store,
            wisp: None,
            beads_dir: None,
            actor: actor.into(),
            readonly: false,
            cancel: CancelToken::new(),
            flush: None,
        }
    }

    /// Attaches the ephemeral store handle.
    pub fn with_wisp_store(mut self, wisp: Arc<dyn Storage>) -> Self {
        self.wisp = Some(wisp);
        self
    }

    /// Sets the `.beads` directory used for routing and federation.
    pub fn with_beads_dir(mut self, dir: PathBuf) -> Self {
        self.beads_dir = Some(dir);
        self
    }

    /// Blocks every mutation with [`EngineError::Readonly`].
    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// Uses an externally-owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attaches a flush scheduler armed after every mutation.
    pub fn with_flush_scheduler(mut self, flush: FlushScheduler) -> Self {
        self.flush = Some(flush);
        self
    }

    /// The engine's cancellation token.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Cancels in-flight work and drops pending flush timers.
    pub fn cancel(&self) {
        self.cancel.cancel();
        if let Some(ref flush) = self.flush {
            flush.cancel_pending();
        }
    }

    /// Marks the store dirty; the scheduler coalesces bursts into one
    /// flush after quiescence.
    pub fn mark_dirty_and_schedule_flush(&self) {
        if let Some(ref flush) = self.flush {
            flush.notify();
        }
    }

    // -- Internal helpers ----------------------------------------------------

    fn stores(&self) -> Vec<&dyn Storage> {
        let mut stores: Vec<&dyn Storage> = vec![self.store.as_ref()];
        if let Some(ref wisp) = self.wisp {
            stores.push(wisp.as_ref());
        }
        stores
    }

    fn store_for(&self, scope: Scope) -> Result<&dyn Storage> {
        match scope {
            Scope::Persistent => Ok(self.store.as_ref()),
            Scope::Ephemeral => self
                .wisp
                .as_deref()
                .ok_or_else(|| EngineError::validation("store", "no ephemeral store attached")),
        }
    }

    fn locate(&self, id: &str) -> Result<(Issue, Scope)> {
        match self.store.get_issue(id) {
            Ok(issue) => return Ok((issue, Scope::Persistent)),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(ref wisp) = self.wisp {
            match wisp.get_issue(id) {
                Ok(issue) => return Ok((issue, Scope::Ephemeral)),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::not_found("issue", id))
    }

    fn guard_write(&self) -> Result<()> {
        self.cancel.check()?;
        if self.readonly {
            return Err(EngineError::Readonly);
        }
        Ok(())
    }

    fn prefix(&self) -> Result<String> {
        Ok(self
            .store
            .get_config(ident::ISSUE_PREFIX_KEY)?
            .unwrap_or_else(|| ident::DEFAULT_PREFIX.to_string()))
    }

    fn wisp_prefix(&self) -> Result<String> {
        Ok(format!("{}-{}", self.prefix()?, WISP_ID_SUFFIX))
    }

    fn resolver(&self) -> Option<ExternalResolver> {
        self.beads_dir
            .as_deref()
            .map(ExternalResolver::new)
    }

    fn is_template(&self, id: &str, scope: Scope) -> Result<bool> {
        let labels = self.store_for(scope)?.get_labels(id)?;
        Ok(labels.iter().any(|l| l == TEMPLATE_LABEL))
    }

    // -- Issue lifecycle -----------------------------------------------------

    /// Creates an issue and returns its freshly allocated id.
    ///
    /// Ephemeral issues are written into the wisp store with a disjoint
    /// id prefix; the ephemeral flag is normalized from the target
    /// store, not the caller's struct.
    pub fn create_issue(&self, new: &NewIssue) -> Result<String> {
        self.guard_write()?;

        let scope = if new.ephemeral {
            Scope::Ephemeral
        } else {
            Scope::Persistent
        };
        let target = self.store_for(scope)?;
        let prefix = if new.ephemeral {
            self.wisp_prefix()?
        } else {
            self.prefix()?
        };

        let mut issue = Issue::default();
        issue.title = new.title.clone();
        issue.description = new.description.clone();
        issue.design = new.design.clone();
        issue.acceptance_criteria = new.acceptance_criteria.clone();
        issue.notes = new.notes.clone();
        issue.priority = new.priority;
        issue.issue_type = new.issue_type.normalize();
        issue.assignee = new.assignee.clone();
        issue.labels = new.labels.clone();
        issue.ephemeral = scope == Scope::Ephemeral;
        issue.pinned = new.pinned;
        issue.defer_until = new.defer_until;
        validation::validate(&issue)?;

        let actor = self.actor.clone();
        let created: RefCell<Option<String>> = RefCell::new(None);
        target.run_in_transaction(&|tx| {
            let id = ident::allocate_id(tx, &prefix)?;
            let mut issue = issue.clone();
            issue.id = id.clone();
            tx.create_issue(&issue, &actor)?;
            *created.borrow_mut() = Some(id);
            Ok(())
        })?;

        self.mark_dirty_and_schedule_flush();
        created
            .into_inner()
            .ok_or_else(|| EngineError::validation("create", "transaction produced no id"))
    }

    /// Creates an issue as a hierarchical child of an existing parent.
    pub fn create_child_issue(&self, parent: &str, new: &NewIssue) -> Result<String> {
        self.guard_write()?;
        let parent = self.resolve_id(parent)?;
        let (_, scope) = self.locate(&parent)?;
        let target = self.store_for(scope)?;

        let mut issue = Issue::default();
        issue.title = new.title.clone();
        issue.description = new.description.clone();
        issue.priority = new.priority;
        issue.issue_type = new.issue_type.normalize();
        issue.assignee = new.assignee.clone();
        issue.labels = new.labels.clone();
        issue.ephemeral = scope == Scope::Ephemeral;
        validation::validate(&issue)?;

        let actor = self.actor.clone();
        let created: RefCell<Option<String>> = RefCell::new(None);
        target.run_in_transaction(&|tx| {
            let id = ident::allocate_child_id(tx, &parent)?;
            let mut issue = issue.clone();
            issue.id = id.clone();
            tx.create_issue(&issue, &actor)?;
            tx.add_dependency(
                &Dependency::new(
                    id.clone(),
                    parent.clone(),
                    DependencyType::ParentChild,
                    &actor,
                ),
                &actor,
            )?;
            *created.borrow_mut() = Some(id);
            Ok(())
        })?;

        self.mark_dirty_and_schedule_flush();
        created
            .into_inner()
            .ok_or_else(|| EngineError::validation("create", "transaction produced no id"))
    }

    /// Applies a partial update. Closure transitions must go through
    /// [`close_issue`](Self::close_issue) / [`reopen_issue`](Self::reopen_issue)
    /// so the lifecycle invariants hold.
    pub fn update_issue(&self, id: &str, updates: &IssueUpdates) -> Result<()> {
        self.guard_write()?;
        let id = self.resolve_id(id)?;
        let (issue, scope) = self.locate(&id)?;

        if let Some(ref status) = updates.status {
            if issue.status == Status::Closed && *status != Status::Closed {
                return Err(EngineError::IllegalTransition {
                    from: issue.status.to_string(),
                    to: status.to_string(),
                });
            }
            if *status == Status::Closed && issue.status != Status::Closed {
                return Err(EngineError::IllegalTransition {
                    from: issue.status.to_string(),
                    to: status.to_string(),
                });
            }
        }
        if let Some(priority) = updates.priority {
            if !(0..=4).contains(&priority) {
                return Err(EngineError::validation(
                    "priority",
                    format!("must be between 0 and 4 (got {priority})"),
                ));
            }
        }

        self.store_for(scope)?
            .update_issue(&id, updates, &self.actor)?;
        self.mark_dirty_and_schedule_flush();
        Ok(())
    }

    /// Closes an issue, recording the reason and timestamp.
    pub fn close_issue(&self, id: &str, reason: &str) -> Result<()> {
        self.guard_write()?;
        let id = self.resolve_id(id)?;
        let (issue, scope) = self.locate(&id)?;
        if issue.status == Status::Closed {
            return Err(EngineError::IllegalTransition {
                from: "closed".into(),
                to: "closed".into(),
            });
        }
        self.store_for(scope)?
            .close_issue(&id, reason, &self.actor)?;
        self.mark_dirty_and_schedule_flush();
        Ok(())
    }

    /// Reopens a closed issue, clearing the closure fields and emitting
    /// the distinct reopened observation.
    pub fn reopen_issue(&self, id: &str) -> Result<()> {
        self.guard_write()?;
        let id = self.resolve_id(id)?;
        let (issue, scope) = self.locate(&id)?;
        if issue.status != Status::Closed {
            return Err(EngineError::IllegalTransition {
                from: issue.status.to_string(),
                to: "open".into(),
            });
        }
        self.store_for(scope)?.reopen_issue(&id, &self.actor)?;
        self.mark_dirty_and_schedule_flush();
        Ok(())
    }

    /// Fetches an issue with labels populated.
    pub fn get_issue(&self, id: &str) -> Result<Issue> {
        self.cancel.check()?;
        let id = self.resolve_id(id)?;
        let (mut issue, scope) = self.locate(&id)?;
        issue.labels = self.store_for(scope)?.get_labels(&id)?;
        Ok(issue)
    }

    // -- Dependencies --------------------------------------------------------

    /// Adds a typed dependency edge `from -> to`.
    ///
    /// Rejects edges that would close a `blocks`/`parent-child` cycle,
    /// parent-child/blocks doubling on the same pair, and persistent
    /// issues depending on ephemeral ones.
    pub fn add_dependency(&self, from: &str, to: &str, dep_type: DependencyType) -> Result<()> {
        self.guard_write()?;
        let from = self.resolve_id(from)?;
        let (_, from_scope) = self.locate(&from)?;

        let to = if dep_type == DependencyType::RequiresSkill {
            // Skill targets are tokens, not issues.
            to.to_string()
        } else {
            self.resolve_id(to)?
        };

        let to_is_external = beads_core::idgen::is_external_ref(&to);
        if !to_is_external && dep_type != DependencyType::RequiresSkill {
            let (_, to_scope) = self.locate(&to)?;
            if from_scope == Scope::Persistent && to_scope == Scope::Ephemeral {
                return Err(EngineError::validation(
                    "dependency",
                    "a persistent issue cannot depend on an ephemeral one",
                ));
            }
        }

        let source_store = self.store_for(from_scope)?;

        // parent-child plus blocks on the same pair is a self-deadlock.
        if matches!(
            dep_type,
            DependencyType::Blocks | DependencyType::ParentChild
        ) {
            let conflicting = match dep_type {
                DependencyType::Blocks => DependencyType::ParentChild,
                _ => DependencyType::Blocks,
            };
            let existing = source_store.get_dependency_records(&from)?;
            if existing
                .iter()
                .any(|d| d.depends_on_id == to && d.dep_type == conflicting)
            {
                return Err(EngineError::validation(
                    "dependency",
                    format!(
                        "{from} already has a {conflicting} edge to {to}; combining it with {dep_type} would self-deadlock"
                    ),
                ));
            }
        }

        if dep_type.forbids_cycles() && !to_is_external {
            if let Some(cycle) = graph::cycle_created_by(&self.stores(), &from, &to)? {
                return Err(EngineError::CycleDetected(vec![cycle]));
            }
        }

        source_store.add_dependency(
            &Dependency::new(from, to, dep_type, self.actor.as_str()),
            &self.actor,
        )?;
        self.mark_dirty_and_schedule_flush();
        Ok(())
    }

    /// Removes the edge `from -> to`.
    pub fn remove_dependency(&self, from: &str, to: &str) -> Result<()> {
        self.guard_write()?;
        let from = self.resolve_id(from)?;
        let (_, scope) = self.locate(&from)?;
        self.store_for(scope)?
            .remove_dependency(&from, to, &self.actor)
            .map_err(|e| map_not_found(e, "dependency", &format!("{from} -> {to}")))?;
        self.mark_dirty_and_schedule_flush();
        Ok(())
    }

    // -- Queries -------------------------------------------------------------

    /// Substring + structured search over the persistent store, with
    /// labels and dependency counts attached.
    pub fn search(&self, query: &str, filter: &IssueFilter) -> Result<Vec<IssueWithCounts>> {
        self.cancel.check()?;
        let mut issues = self.store.search_issues(query, filter)?;

        let ids: Vec<String> = issues.iter().map(|i| i.id.clone()).collect();
        let mut labels = self.store.get_labels_for_issues(&ids)?;
        let counts = self.store.get_dependency_counts(&ids)?;

        Ok(issues
            .drain(..)
            .map(|mut issue| {
                if let Some(l) = labels.remove(&issue.id) {
                    issue.labels = l;
                }
                let counts = counts.get(&issue.id).copied().unwrap_or_default();
                IssueWithCounts { issue, counts }
            })
            .collect())
    }

    /// The ready set: issues eligible for immediate work, best first.
    pub fn ready(&self) -> Result<Vec<Issue>> {
        self.cancel.check()?;
        let resolver = self.resolver();
        ready::compute_ready(&self.stores(), resolver.as_ref(), &self.cancel)
    }

    /// Renders the dependency tree rooted at `root`.
    pub fn dep_tree(&self, root: &str, opts: &TreeOptions) -> Result<TreeResult> {
        self.cancel.check()?;
        let root = self.resolve_id(root)?;
        tree::dep_tree(&self.stores(), &root, opts, &self.cancel)
    }

    /// Reports every `blocks`/`parent-child` cycle in the graph.
    pub fn detect_cycles(&self) -> Result<Vec<Vec<Issue>>> {
        self.cancel.check()?;
        let cycles = graph::detect_cycles(&self.stores(), &self.cancel)?;
        let mut result = Vec::with_capacity(cycles.len());
        for cycle in cycles {
            let mut issues = Vec::with_capacity(cycle.len());
            for id in cycle {
                let (issue, _) = self.locate(&id)?;
                issues.push(issue);
            }
            result.push(issues);
        }
        Ok(result)
    }

    /// Resolves a possibly-partial id across both stores.
    pub fn resolve_id(&self, partial: &str) -> Result<String> {
        self.cancel.check()?;
        ident::resolve_partial_multi(&self.stores(), partial)
    }

    // -- Templates -----------------------------------------------------------

    /// Loads a template subgraph (root must carry the `template` label).
    pub fn load_template(&self, id: &str) -> Result<Subgraph> {
        self.cancel.check()?;
        let id = self.resolve_id(id)?;
        subgraph::load_template_subgraph(self.store.as_ref(), &id, &self.cancel)
    }

    /// Instantiates a template: clones its subgraph with variables
    /// substituted, into the persistent or wisp store per the options.
    pub fn instantiate_template(
        &self,
        id: &str,
        vars: &HashMap<String, String>,
        opts: &InstantiateOptions,
    ) -> Result<InstantiateResult> {
        self.guard_write()?;
        let template = self.load_template(id)?;

        let scope = if opts.ephemeral {
            Scope::Ephemeral
        } else {
            Scope::Persistent
        };
        let target = self.store_for(scope)?;

        let mut opts = opts.clone();
        if opts.ephemeral && opts.id_prefix.is_none() {
            opts.id_prefix = Some(self.wisp_prefix()?);
        }

        let result = instantiate::clone_subgraph(target, &template, vars, &opts, &self.actor)?;
        self.mark_dirty_and_schedule_flush();
        Ok(result)
    }

    // -- Composition ---------------------------------------------------------

    /// Bonds two operands. Behavior is polymorphic over whether each is
    /// a template (carries the `template` label) or a live issue.
    pub fn bond(
        &self,
        a: &str,
        b: &str,
        bond_type: BondType,
        opts: &BondOptions,
    ) -> Result<BondResult> {
        self.guard_write()?;
        let a = self.resolve_id(a)?;
        let b = self.resolve_id(b)?;
        let (_, a_scope) = self.locate(&a)?;
        let (_, b_scope) = self.locate(&b)?;
        let a_is_template = self.is_template(&a, a_scope)?;
        let b_is_template = self.is_template(&b, b_scope)?;

        let result = match (a_is_template, b_is_template) {
            (true, true) => self.bond_templates(&a, &b, bond_type)?,
            (true, false) => self.bond_template_instance(&a, &b, bond_type, opts)?,
            (false, true) => self.bond_template_instance(&b, &a, bond_type, opts)?,
            (false, false) => {
                let dep_type = bond_type.instance_edge();
                self.add_dependency(&a, &b, dep_type.clone())?;
                BondResult::Linked {
                    edge: BondEdge {
                        from: a,
                        to: b,
                        dep_type,
                    },
                }
            }
        };

        self.mark_dirty_and_schedule_flush();
        Ok(result)
    }

    /// Template+template: a new compound template root with both
    /// operands as children, ordered by the bond type. Always permanent.
    fn bond_templates(&self, a: &str, b: &str, bond_type: BondType) -> Result<BondResult> {
        let (a_issue, _) = self.locate(a)?;
        let (b_issue, _) = self.locate(b)?;
        let prefix = self.prefix()?;
        let actor = self.actor.clone();

        let created: RefCell<Option<String>> = RefCell::new(None);
        self.store.run_in_transaction(&|tx| {
            let root_id = ident::allocate_id(tx, &prefix)?;

            let mut root = Issue::default();
            root.id = root_id.clone();
            root.title = format!("{} + {}", a_issue.title, b_issue.title);
            root.issue_type = IssueType::Epic;
            root.labels = vec![TEMPLATE_LABEL.to_string()];
            root.bonded_from = vec![
                BondRef::new(a, bond_type.as_str()),
                BondRef::new(b, bond_type.as_str()),
            ];
            tx.create_issue(&root, &actor)?;

            for operand in [a, b] {
                tx.add_dependency(
                    &Dependency::new(
                        operand,
                        root_id.clone(),
                        DependencyType::ParentChild,
                        &actor,
                    ),
                    &actor,
                )?;
            }
            if let Some(edge_type) = bond_type.template_edge() {
                tx.add_dependency(&Dependency::new(b, a, edge_type, &actor), &actor)?;
            }

            *created.borrow_mut() = Some(root_id);
            Ok(())
        })?;

        let root_id = created
            .into_inner()
            .ok_or_else(|| EngineError::validation("bond", "transaction produced no root"))?;
        Ok(BondResult::Compound { root_id })
    }

    /// Template+instance: instantiate the template, then link the
    /// spawned root to the live issue.
    fn bond_template_instance(
        &self,
        template_id: &str,
        instance_id: &str,
        bond_type: BondType,
        opts: &BondOptions,
    ) -> Result<BondResult> {
        let (_, instance_scope) = self.locate(instance_id)?;
        if !opts.ephemeral && instance_scope == Scope::Ephemeral {
            return Err(EngineError::validation(
                "bond",
                "a persistent spawn cannot depend on an ephemeral issue; pass ephemeral",
            ));
        }

        let instantiated = self.instantiate_template(
            template_id,
            &opts.vars,
            &InstantiateOptions {
                ephemeral: opts.ephemeral,
                ..Default::default()
            },
        )?;

        let dep_type = bond_type.instance_edge();
        self.add_dependency(&instantiated.new_root_id, instance_id, dep_type.clone())?;

        Ok(BondResult::Spawned {
            edge: BondEdge {
                from: instantiated.new_root_id.clone(),
                to: instance_id.to_string(),
                dep_type,
            },
            instantiated,
        })
    }

    /// Collapses the subgraph rooted at `root` into a persistent digest.
    pub fn squash(&self, root: &str, opts: &SquashOptions) -> Result<SquashResult> {
        self.guard_write()?;
        let root = self.resolve_id(root)?;
        let stores = self.stores();
        let sub = subgraph::load_subgraph(&stores, &root, &self.cancel)?;
        let result = squash::squash(self.store.as_ref(), &stores, &sub, opts, &self.actor)?;
        self.mark_dirty_and_schedule_flush();
        Ok(result)
    }

    // -- Ephemeral lifecycle -------------------------------------------------

    /// Garbage-collects stale wisps.
    pub fn wisp_gc(&self, opts: &GcOptions) -> Result<GcResult> {
        if !opts.dry_run {
            self.guard_write()?;
        } else {
            self.cancel.check()?;
        }
        let wisp_store = self.store_for(Scope::Ephemeral)?;
        let result = wisp::wisp_gc(wisp_store, opts, &self.cancel)?;
        if !opts.dry_run && result.count > 0 {
            self.mark_dirty_and_schedule_flush();
        }
        Ok(result)
    }

    /// Removes a wisp subgraph without producing a digest.
    pub fn burn_wisp(&self, root: &str) -> Result<GcResult> {
        self.guard_write()?;
        let wisp_store = self.store_for(Scope::Ephemeral)?;
        let root = ident::resolve_partial(wisp_store, root)?;
        let result = wisp::burn(wisp_store, &root, &self.cancel)?;
        self.mark_dirty_and_schedule_flush();
        Ok(result)
    }

    // -- Config / user KV ----------------------------------------------------

    /// Stores an opaque user key-value pair.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.guard_write()?;
        self.store
            .set_config(&format!("{USER_KV_PREFIX}{key}"), value)?;
        self.mark_dirty_and_schedule_flush();
        Ok(())
    }

    /// Reads an opaque user key-value pair.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        self.cancel.check()?;
        Ok(self.store.get_config(&format!("{USER_KV_PREFIX}{key}"))?)
    }
}
