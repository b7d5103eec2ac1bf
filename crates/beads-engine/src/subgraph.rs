//! Subgraph loading: a root plus its transitive descendants.
//!
//! Two complementary strategies are merged without duplication:
//!
//! 1. **Dependency strategy** -- follow inbound `parent-child` edges
//!    from each frontier node to its children.
//! 2. **Hierarchical-id strategy** -- include every issue whose id is a
//!    direct dotted child of a member (`node.N`), even when the edge
//!    record is missing. Older data can lose edges; the id encodes the
//!    same containment.

use std::collections::{HashMap, HashSet, VecDeque};

use beads_core::dependency::Dependency;
use beads_core::enums::DependencyType;
use beads_core::filter::IssueFilter;
use beads_core::idgen;
use beads_core::issue::Issue;
use beads_formula::TemplateSchema;
use beads_storage::Storage;

use crate::cancel::CancelToken;
use crate::error::{EngineError, Result, map_not_found};

/// One member of a loaded subgraph.
#[derive(Debug, Clone)]
pub struct Member {
    pub issue: Issue,
    /// Index into the store slice the subgraph was loaded from.
    pub store: usize,
}

/// A root plus transitive descendants and every edge between members.
///
/// Derived on demand; never persisted.
#[derive(Debug, Clone)]
pub struct Subgraph {
    pub root_id: String,
    /// Members in BFS order; the root is first.
    pub members: Vec<Member>,
    /// Every edge whose endpoints are both members.
    pub dependencies: Vec<Dependency>,
    index: HashMap<String, usize>,
}

impl Subgraph {
    /// The root issue.
    pub fn root(&self) -> &Issue {
        &self.members[0].issue
    }

    /// Looks up a member by id.
    pub fn get(&self, id: &str) -> Option<&Member> {
        self.index.get(id).map(|&i| &self.members[i])
    }

    /// Whether the id belongs to this subgraph.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Number of member issues.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false: a subgraph has at least its root.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The template variable schema carried by the root, if any.
    pub fn schema(&self) -> TemplateSchema {
        TemplateSchema::from_metadata_json(self.root().metadata.as_ref().map(|m| m.get()))
    }

    /// Unions `{{var}}` references over every textual field of every
    /// member, in first-appearance order.
    pub fn referenced_variables(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for member in &self.members {
            for field in member.issue.text_fields() {
                for name in beads_formula::extract_variables(field) {
                    if !seen.contains(&name) {
                        seen.push(name);
                    }
                }
            }
        }
        seen
    }
}

/// Loads the subgraph rooted at `root_id`, searching the stores in
/// order. Members may span stores (a persistent root with ephemeral
/// children).
pub fn load_subgraph(
    stores: &[&dyn Storage],
    root_id: &str,
    cancel: &CancelToken,
) -> Result<Subgraph> {
    let (root, root_store) = fetch(stores, root_id)?;

    let mut members: Vec<Member> = vec![Member {
        issue: root,
        store: root_store,
    }];
    let mut index: HashMap<String, usize> = HashMap::new();
    index.insert(root_id.to_string(), 0);

    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(root_id.to_string());

    while let Some(node_id) = queue.pop_front() {
        cancel.check()?;

        let mut found: Vec<String> = Vec::new();

        // Dependency strategy: inbound parent-child edges.
        for store in stores {
            for dep in store.get_dependent_records(&node_id)? {
                if dep.dep_type == DependencyType::ParentChild {
                    found.push(dep.issue_id);
                }
            }
        }

        // Hierarchical-id strategy: direct dotted children, edge or no
        // edge.
        let prefix = format!("{node_id}.");
        for store in stores {
            for issue in store.search_issues("", &IssueFilter::with_id_prefix(&prefix))? {
                if idgen::is_direct_child(&issue.id, &node_id) {
                    found.push(issue.id);
                }
            }
        }

        for child_id in found {
            if index.contains_key(&child_id) {
                continue;
            }
            let (issue, store) = fetch(stores, &child_id)?;
            index.insert(child_id.clone(), members.len());
            members.push(Member { issue, store });
            queue.push_back(child_id);
        }
    }

    // Collect every edge with both endpoints inside the member set.
    let ids: HashSet<&str> = index.keys().map(String::as_str).collect();
    let mut dependencies: Vec<Dependency> = Vec::new();
    let mut seen_edges: HashSet<(String, String)> = HashSet::new();
    for member in &members {
        let store = stores[member.store];
        for dep in store.get_dependency_records(&member.issue.id)? {
            if ids.contains(dep.depends_on_id.as_str())
                && seen_edges.insert((dep.issue_id.clone(), dep.depends_on_id.clone()))
            {
                dependencies.push(dep);
            }
        }
    }

    // Attach labels; template detection and cloning both need them.
    for member in &mut members {
        let store = stores[member.store];
        member.issue.labels = store.get_labels(&member.issue.id)?;
    }

    Ok(Subgraph {
        root_id: root_id.to_string(),
        members,
        dependencies,
        index,
    })
}

/// Loads a template subgraph: like [`load_subgraph`] but the root must
/// carry the `template` label.
pub fn load_template_subgraph(
    store: &dyn Storage,
    root_id: &str,
    cancel: &CancelToken,
) -> Result<Subgraph> {
    let subgraph = load_subgraph(&[store], root_id, cancel)?;
    if !subgraph.root().has_template_label() {
        return Err(EngineError::validation(
            "template",
            format!("issue '{root_id}' does not carry the template label"),
        ));
    }
    Ok(subgraph)
}

fn fetch(stores: &[&dyn Storage], id: &str) -> Result<(Issue, usize)> {
    for (i, store) in stores.iter().enumerate() {
        match store.get_issue(id) {
            Ok(issue) => return Ok((issue, i)),
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(map_not_found(e, "issue", id)),
        }
    }
    Err(EngineError::not_found("issue", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn add(store: &SqliteStore, id: &str, labels: &[&str]) {
        let issue = IssueBuilder::new(id)
            .id(id)
            .labels(labels.iter().map(|s| s.to_string()).collect())
            .build();
        Storage::create_issue(store, &issue, "test").unwrap();
    }

    fn link(store: &SqliteStore, from: &str, to: &str, t: DependencyType) {
        Storage::add_dependency(store, &Dependency::new(from, to, t, "test"), "test").unwrap();
    }

    #[test]
    fn loads_children_via_edges() {
        let s = store();
        add(&s, "bd-000001", &["template"]);
        add(&s, "bd-000002", &[]);
        add(&s, "bd-000003", &[]);
        link(&s, "bd-000002", "bd-000001", DependencyType::ParentChild);
        link(&s, "bd-000003", "bd-000001", DependencyType::ParentChild);
        link(&s, "bd-000003", "bd-000002", DependencyType::Blocks);

        let sub = load_subgraph(&[&s], "bd-000001", &CancelToken::new()).unwrap();
        assert_eq!(sub.len(), 3);
        assert_eq!(sub.root().id, "bd-000001");
        // Both parent-child edges and the cross edge are captured.
        assert_eq!(sub.dependencies.len(), 3);
    }

    #[test]
    fn loads_children_via_hierarchical_ids() {
        let s = store();
        add(&s, "bd-000001", &[]);
        // No parent-child edge records at all.
        add(&s, "bd-000001.1", &[]);
        add(&s, "bd-000001.2", &[]);
        add(&s, "bd-000001.2.1", &[]);
        // A deeper id that is NOT a direct child of any member chain.
        add(&s, "bd-000002", &[]);

        let sub = load_subgraph(&[&s], "bd-000001", &CancelToken::new()).unwrap();
        assert_eq!(sub.root().id, "bd-000001");
        let mut ids: Vec<&str> = sub.members.iter().map(|m| m.issue.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(
            ids,
            vec!["bd-000001", "bd-000001.1", "bd-000001.2", "bd-000001.2.1"]
        );
    }

    #[test]
    fn strategies_merge_without_duplicates() {
        let s = store();
        add(&s, "bd-000001", &[]);
        add(&s, "bd-000001.1", &[]);
        // The same child is reachable both ways.
        link(&s, "bd-000001.1", "bd-000001", DependencyType::ParentChild);

        let sub = load_subgraph(&[&s], "bd-000001", &CancelToken::new()).unwrap();
        assert_eq!(sub.len(), 2);
    }

    #[test]
    fn non_child_edges_do_not_pull_members() {
        let s = store();
        add(&s, "bd-000001", &[]);
        add(&s, "bd-000002", &[]);
        link(&s, "bd-000002", "bd-000001", DependencyType::Blocks);

        let sub = load_subgraph(&[&s], "bd-000001", &CancelToken::new()).unwrap();
        assert_eq!(sub.len(), 1);
    }

    #[test]
    fn template_label_is_semantic() {
        let s = store();
        add(&s, "bd-000001", &[]);
        let err = load_template_subgraph(&s, "bd-000001", &CancelToken::new()).unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));

        add(&s, "bd-000002", &["template"]);
        let sub = load_template_subgraph(&s, "bd-000002", &CancelToken::new()).unwrap();
        assert!(sub.root().has_template_label());
    }

    #[test]
    fn referenced_variables_across_members() {
        let s = store();
        let root = IssueBuilder::new("Release {{version}}")
            .id("bd-000001")
            .labels(vec!["template".into()])
            .build();
        Storage::create_issue(&s, &root, "test").unwrap();
        let child = IssueBuilder::new("Tag {{version}}")
            .id("bd-000001.1")
            .description("for {{owner}}")
            .build();
        Storage::create_issue(&s, &child, "test").unwrap();

        let sub = load_subgraph(&[&s], "bd-000001", &CancelToken::new()).unwrap();
        assert_eq!(sub.referenced_variables(), vec!["version", "owner"]);
    }

    #[test]
    fn missing_root_is_not_found() {
        let s = store();
        let err = load_subgraph(&[&s], "bd-zzzzzz", &CancelToken::new()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }
}
