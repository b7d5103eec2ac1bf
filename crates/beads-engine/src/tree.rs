//! Dependency tree rendering: down, up, and bidirectional traversal.

use std::collections::{HashMap, HashSet};

use beads_core::dependency::Dependency;
use beads_core::enums::{DependencyType, Status};
use beads_core::issue::Issue;
use beads_storage::Storage;

use crate::cancel::CancelToken;
use crate::error::{Result, map_not_found};

/// Traversal direction relative to the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeDirection {
    /// Follow outbound edges: what the root depends on.
    #[default]
    Down,
    /// Follow inbound edges: what depends on the root.
    Up,
    /// Dependents above, root in the middle, dependencies below.
    Both,
}

/// Options controlling a tree traversal.
#[derive(Debug, Clone)]
pub struct TreeOptions {
    pub direction: TreeDirection,
    /// Maximum depth below the root; deeper nodes are cut and the last
    /// rendered node marked truncated.
    pub max_depth: i32,
    /// Dedup mode: a node's second appearance is marked duplicate and
    /// not expanded. Show-all-paths mode expands every path.
    pub dedup: bool,
    /// Prunes any subtree whose root does not match.
    pub status_filter: Option<Status>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            direction: TreeDirection::Down,
            max_depth: 10,
            dedup: true,
            status_filter: None,
        }
    }
}

/// One node of the rendered forest.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub issue: Issue,
    /// Depth from the root (0 = root).
    pub depth: i32,
    /// Type of the edge leading here from the parent node; None for the
    /// root.
    pub dep_type: Option<DependencyType>,
    /// True for nodes reached against edge direction (dependents).
    pub reverse: bool,
    /// Marked on a node's second appearance in dedup mode; its children
    /// are not expanded.
    pub is_duplicate: bool,
    /// Marked when children exist but the depth limit cut them off.
    pub truncated: bool,
    pub children: Vec<TreeNode>,
}

/// A rendered forest plus non-fatal observations (e.g. cycles crossed
/// during traversal).
#[derive(Debug, Clone)]
pub struct TreeResult {
    pub roots: Vec<TreeNode>,
    pub warnings: Vec<String>,
}

/// Renders the dependency tree rooted at `root_id`.
///
/// Cycles through informational edge types are legal in the stored
/// graph; traversal guards against them and reports a warning instead of
/// recursing forever.
pub fn dep_tree(
    stores: &[&dyn Storage],
    root_id: &str,
    opts: &TreeOptions,
    cancel: &CancelToken,
) -> Result<TreeResult> {
    let index = EdgeIndex::load(stores)?;
    let mut walker = Walker {
        stores,
        index: &index,
        opts,
        cancel,
        visited: HashSet::new(),
        on_path: HashSet::new(),
        warnings: Vec::new(),
    };

    let root_issue = walker.fetch(root_id)?;
    let Some(root_issue) = root_issue else {
        return Err(crate::error::EngineError::not_found("issue", root_id));
    };

    if let Some(ref status) = opts.status_filter {
        if root_issue.status != *status {
            return Ok(TreeResult {
                roots: Vec::new(),
                warnings: walker.warnings,
            });
        }
    }

    walker.visited.insert(root_id.to_string());
    walker.on_path.insert(root_id.to_string());

    let mut root = TreeNode {
        issue: root_issue,
        depth: 0,
        dep_type: None,
        reverse: false,
        is_duplicate: false,
        truncated: false,
        children: Vec::new(),
    };

    match opts.direction {
        TreeDirection::Down => walker.expand(&mut root, false)?,
        TreeDirection::Up => walker.expand(&mut root, true)?,
        TreeDirection::Both => {
            // Dependents above, dependencies below, one root node, with
            // overlap deduplicated through the shared visited set.
            walker.expand(&mut root, true)?;
            walker.expand(&mut root, false)?;
        }
    }

    walker.on_path.remove(root_id);

    Ok(TreeResult {
        roots: vec![root],
        warnings: walker.warnings,
    })
}

/// All edges of the given stores, indexed both ways.
struct EdgeIndex {
    outbound: HashMap<String, Vec<Dependency>>,
    inbound: HashMap<String, Vec<Dependency>>,
}

impl EdgeIndex {
    fn load(stores: &[&dyn Storage]) -> Result<Self> {
        let mut outbound: HashMap<String, Vec<Dependency>> = HashMap::new();
        let mut inbound: HashMap<String, Vec<Dependency>> = HashMap::new();
        for store in stores {
            for dep in store.get_all_dependency_records()? {
                outbound
                    .entry(dep.issue_id.clone())
                    .or_default()
                    .push(dep.clone());
                inbound
                    .entry(dep.depends_on_id.clone())
                    .or_default()
                    .push(dep);
            }
        }
        // Deterministic child order.
        for edges in outbound.values_mut() {
            edges.sort_by(|a, b| a.depends_on_id.cmp(&b.depends_on_id));
        }
        for edges in inbound.values_mut() {
            edges.sort_by(|a, b| a.issue_id.cmp(&b.issue_id));
        }
        Ok(Self { outbound, inbound })
    }
}

struct Walker<'a> {
    stores: &'a [&'a dyn Storage],
    index: &'a EdgeIndex,
    opts: &'a TreeOptions,
    cancel: &'a CancelToken,
    /// Global first-appearance tracking for dedup mode.
    visited: HashSet<String>,
    /// Current branch, for cycle guarding in both modes.
    on_path: HashSet<String>,
    warnings: Vec<String>,
}

impl Walker<'_> {
    fn fetch(&self, id: &str) -> Result<Option<Issue>> {
        for store in self.stores {
            match store.get_issue(id) {
                Ok(issue) => return Ok(Some(issue)),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(map_not_found(e, "issue", id)),
            }
        }
        Ok(None)
    }

    /// Expands a node's children in one direction.
    fn expand(&mut self, node: &mut TreeNode, reverse: bool) -> Result<()> {
        self.cancel.check()?;

        let id = node.issue.id.clone();
        let edges: Vec<(String, DependencyType)> = if reverse {
            self.index
                .inbound
                .get(&id)
                .map(|deps| {
                    deps.iter()
                        .map(|d| (d.issue_id.clone(), d.dep_type.clone()))
                        .collect()
                })
                .unwrap_or_default()
        } else {
            self.index
                .outbound
                .get(&id)
                .map(|deps| {
                    deps.iter()
                        .map(|d| (d.depends_on_id.clone(), d.dep_type.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        if edges.is_empty() {
            return Ok(());
        }

        if node.depth >= self.opts.max_depth {
            node.truncated = true;
            return Ok(());
        }

        for (next_id, dep_type) in edges {
            self.cancel.check()?;

            // External endpoints are leaves; there is nothing local to
            // expand behind them.
            let Some(issue) = self.fetch(&next_id)? else {
                continue;
            };

            if let Some(ref status) = self.opts.status_filter {
                if issue.status != *status {
                    continue;
                }
            }

            let cycles_back = self.on_path.contains(&next_id);
            if cycles_back {
                self.warnings
                    .push(format!("cycle detected through {next_id}"));
            }
            let duplicate = cycles_back || (self.opts.dedup && self.visited.contains(&next_id));

            let mut child = TreeNode {
                issue,
                depth: node.depth + 1,
                dep_type: Some(dep_type),
                reverse,
                is_duplicate: duplicate,
                truncated: false,
                children: Vec::new(),
            };

            if !duplicate {
                self.visited.insert(next_id.clone());
                self.on_path.insert(next_id.clone());
                self.expand(&mut child, reverse)?;
                self.on_path.remove(&next_id);
            }

            node.children.push(child);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn add(store: &SqliteStore, id: &str) {
        let issue = IssueBuilder::new(id).id(id).build();
        Storage::create_issue(store, &issue, "test").unwrap();
    }

    fn add_with_status(store: &SqliteStore, id: &str, status: Status) {
        let mut b = IssueBuilder::new(id).id(id).status(status.clone());
        if status == Status::Closed {
            b = b.closed_at(chrono::Utc::now());
        }
        Storage::create_issue(store, &b.build(), "test").unwrap();
    }

    fn link(store: &SqliteStore, from: &str, to: &str, t: DependencyType) {
        Storage::add_dependency(
            store,
            &Dependency::new(from, to, t, "test"),
            "test",
        )
        .unwrap();
    }

    fn tree(store: &SqliteStore, root: &str, opts: &TreeOptions) -> TreeResult {
        dep_tree(&[store as &dyn Storage], root, opts, &CancelToken::new()).unwrap()
    }

    fn diamond(s: &SqliteStore) {
        // a depends on b and c; both depend on d.
        for id in ["a", "b", "c", "d"] {
            add(s, id);
        }
        link(s, "a", "b", DependencyType::Blocks);
        link(s, "a", "c", DependencyType::Blocks);
        link(s, "b", "d", DependencyType::Blocks);
        link(s, "c", "d", DependencyType::Blocks);
    }

    #[test]
    fn down_traversal_shape() {
        let s = store();
        diamond(&s);
        let result = tree(&s, "a", &TreeOptions::default());
        let root = &result.roots[0];
        assert_eq!(root.issue.id, "a");
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].issue.id, "b");
        assert_eq!(root.children[1].issue.id, "c");
    }

    #[test]
    fn dedup_marks_second_appearance() {
        let s = store();
        diamond(&s);
        let result = tree(&s, "a", &TreeOptions::default());
        let root = &result.roots[0];
        let d_under_b = &root.children[0].children[0];
        let d_under_c = &root.children[1].children[0];
        assert_eq!(d_under_b.issue.id, "d");
        assert!(!d_under_b.is_duplicate);
        assert_eq!(d_under_c.issue.id, "d");
        assert!(d_under_c.is_duplicate);
        assert!(d_under_c.children.is_empty());
    }

    #[test]
    fn show_all_paths_expands_both() {
        let s = store();
        diamond(&s);
        let opts = TreeOptions {
            dedup: false,
            ..Default::default()
        };
        let result = tree(&s, "a", &opts);
        let root = &result.roots[0];
        assert!(!root.children[0].children[0].is_duplicate);
        assert!(!root.children[1].children[0].is_duplicate);
    }

    #[test]
    fn up_traversal_follows_dependents() {
        let s = store();
        diamond(&s);
        let opts = TreeOptions {
            direction: TreeDirection::Up,
            ..Default::default()
        };
        let result = tree(&s, "d", &opts);
        let root = &result.roots[0];
        assert_eq!(root.issue.id, "d");
        let ids: Vec<&str> = root.children.iter().map(|c| c.issue.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(root.children.iter().all(|c| c.reverse));
        assert_eq!(root.children[0].children[0].issue.id, "a");
    }

    #[test]
    fn both_merges_around_single_root() {
        let s = store();
        diamond(&s);
        let opts = TreeOptions {
            direction: TreeDirection::Both,
            ..Default::default()
        };
        let result = tree(&s, "b", &opts);
        assert_eq!(result.roots.len(), 1);
        let root = &result.roots[0];
        // One dependent branch (a, reverse) and one dependency (d).
        let up: Vec<&str> = root
            .children
            .iter()
            .filter(|c| c.reverse)
            .map(|c| c.issue.id.as_str())
            .collect();
        let down: Vec<&str> = root
            .children
            .iter()
            .filter(|c| !c.reverse)
            .map(|c| c.issue.id.as_str())
            .collect();
        assert_eq!(up, vec!["a"]);
        assert_eq!(down, vec!["d"]);
    }

    #[test]
    fn max_depth_truncates_with_marker() {
        let s = store();
        for id in ["a", "b", "c"] {
            add(&s, id);
        }
        link(&s, "a", "b", DependencyType::Blocks);
        link(&s, "b", "c", DependencyType::Blocks);

        let opts = TreeOptions {
            max_depth: 1,
            ..Default::default()
        };
        let result = tree(&s, "a", &opts);
        let b = &result.roots[0].children[0];
        assert_eq!(b.issue.id, "b");
        assert!(b.truncated);
        assert!(b.children.is_empty());
    }

    #[test]
    fn status_filter_prunes_subtrees() {
        let s = store();
        add(&s, "a");
        add_with_status(&s, "b", Status::Closed);
        add(&s, "c");
        link(&s, "a", "b", DependencyType::Blocks);
        link(&s, "a", "c", DependencyType::Blocks);

        let opts = TreeOptions {
            status_filter: Some(Status::Open),
            ..Default::default()
        };
        let result = tree(&s, "a", &opts);
        let ids: Vec<&str> = result.roots[0]
            .children
            .iter()
            .map(|c| c.issue.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c"]);

        // A root that fails the filter yields an empty forest.
        let opts = TreeOptions {
            status_filter: Some(Status::Closed),
            ..Default::default()
        };
        let result = tree(&s, "a", &opts);
        assert!(result.roots.is_empty());
    }

    #[test]
    fn informational_cycle_warns_instead_of_recursing() {
        let s = store();
        add(&s, "a");
        add(&s, "b");
        link(&s, "a", "b", DependencyType::Related);
        link(&s, "b", "a", DependencyType::Related);

        let opts = TreeOptions {
            dedup: false,
            ..Default::default()
        };
        let result = tree(&s, "a", &opts);
        assert!(!result.warnings.is_empty());
        let b = &result.roots[0].children[0];
        assert!(b.children[0].is_duplicate);
    }

    #[test]
    fn edge_type_annotations() {
        let s = store();
        add(&s, "a");
        add(&s, "b");
        link(&s, "a", "b", DependencyType::ParentChild);
        let result = tree(&s, "a", &TreeOptions::default());
        assert_eq!(
            result.roots[0].children[0].dep_type,
            Some(DependencyType::ParentChild)
        );
    }
}
