//! Atomic cloning of template subgraphs into fresh issue subgraphs.
//!
//! Everything happens inside one transaction on the target store: id
//! allocation, issue creation with substituted text, edge remapping, and
//! skill edges. A failure at any step leaves no partial state.

use std::cell::RefCell;
use std::collections::HashMap;

use chrono::Utc;

use beads_core::dependency::Dependency;
use beads_core::enums::{DependencyType, Status};
use beads_core::idgen;
use beads_core::issue::{Issue, TEMPLATE_LABEL};
use beads_storage::{Storage, Transaction};

use crate::error::{EngineError, Result};
use crate::ident;
use crate::subgraph::Subgraph;

/// Options controlling instantiation.
#[derive(Debug, Clone, Default)]
pub struct InstantiateOptions {
    /// Override the id prefix for the clones (defaults to the target
    /// store's configured prefix).
    pub id_prefix: Option<String>,
    /// Assignee applied to the root clone only.
    pub assignee: Option<String>,
    /// Phase of the clones; inherited by every created issue.
    pub ephemeral: bool,
    /// Attach the root clone as a hierarchical child of this existing
    /// issue; descendants then follow hierarchical allocation under
    /// their remapped parents.
    pub parent_id: Option<String>,
}

/// Outcome of a clone: the new root, the old->new id mapping, and the
/// number of created issues.
#[derive(Debug, Clone)]
pub struct InstantiateResult {
    pub new_root_id: String,
    pub id_mapping: HashMap<String, String>,
    pub created: usize,
}

/// Clones a loaded subgraph into `target` after substituting `vars`.
///
/// Variable resolution happens up front: the referenced set is checked
/// against the template schema, defaults are applied, and missing
/// required variables abort before any write.
pub fn clone_subgraph(
    target: &dyn Storage,
    subgraph: &Subgraph,
    vars: &HashMap<String, String>,
    opts: &InstantiateOptions,
    actor: &str,
) -> Result<InstantiateResult> {
    let schema = subgraph.schema();
    let referenced = subgraph.referenced_variables();
    let variables = beads_formula::classify_variables(&referenced, &schema);
    let resolved = beads_formula::resolve_vars(&variables, vars)?;

    let prefix = match opts.id_prefix {
        Some(ref p) => p.clone(),
        None => target
            .get_config(ident::ISSUE_PREFIX_KEY)?
            .unwrap_or_else(|| ident::DEFAULT_PREFIX.to_string()),
    };

    // Template-parent of each member, for hierarchical allocation:
    // prefer the parent-child edge, fall back to id containment.
    let template_parent: HashMap<&str, &str> = {
        let mut map: HashMap<&str, &str> = HashMap::new();
        for dep in &subgraph.dependencies {
            if dep.dep_type == DependencyType::ParentChild && subgraph.contains(&dep.depends_on_id)
            {
                map.insert(dep.issue_id.as_str(), dep.depends_on_id.as_str());
            }
        }
        for member in &subgraph.members {
            if let Some(parent) = idgen::parent_of(&member.issue.id) {
                if subgraph.contains(parent) {
                    map.entry(member.issue.id.as_str()).or_insert(parent);
                }
            }
        }
        map
    };

    let outcome: RefCell<Option<InstantiateResult>> = RefCell::new(None);

    target.run_in_transaction(&|tx| {
        let now = Utc::now();
        let mut id_mapping: HashMap<String, String> = HashMap::new();

        // Members arrive in BFS order, so a parent is always mapped
        // before its children.
        for (pos, member) in subgraph.members.iter().enumerate() {
            let old_id = member.issue.id.as_str();

            let new_id = if pos == 0 {
                match opts.parent_id {
                    Some(ref parent) => ident::allocate_child_id(tx, parent)?,
                    None => ident::allocate_id(tx, &prefix)?,
                }
            } else {
                let mapped_parent = template_parent
                    .get(old_id)
                    .and_then(|p| id_mapping.get(*p))
                    .cloned();
                match (opts.parent_id.is_some(), mapped_parent) {
                    (true, Some(parent)) => ident::allocate_child_id(tx, &parent)?,
                    _ => ident::allocate_id(tx, &prefix)?,
                }
            };

            let mut clone = build_clone(&member.issue, &resolved, now);
            clone.id = new_id.clone();
            clone.ephemeral = opts.ephemeral;
            if pos == 0 {
                if let Some(ref assignee) = opts.assignee {
                    clone.assignee = assignee.clone();
                }
            }

            tx.create_issue(&clone, actor)?;
            id_mapping.insert(old_id.to_string(), new_id);
        }

        // Recreate every captured edge with translated endpoints.
        for dep in &subgraph.dependencies {
            let (Some(from), Some(to)) = (
                id_mapping.get(&dep.issue_id),
                id_mapping.get(&dep.depends_on_id),
            ) else {
                continue;
            };
            tx.add_dependency(
                &Dependency::new(from.clone(), to.clone(), dep.dep_type.clone(), actor),
                actor,
            )?;
        }

        // Skill requirements apply to every created issue.
        for skill in &schema.requires_skills {
            for new_id in id_mapping.values() {
                tx.add_dependency(
                    &Dependency::new(
                        new_id.clone(),
                        skill.clone(),
                        DependencyType::RequiresSkill,
                        actor,
                    ),
                    actor,
                )?;
            }
        }

        let new_root_id = id_mapping
            .get(&subgraph.root_id)
            .cloned()
            .unwrap_or_default();
        *outcome.borrow_mut() = Some(InstantiateResult {
            new_root_id,
            created: id_mapping.len(),
            id_mapping,
        });
        Ok(())
    })?;

    outcome
        .into_inner()
        .ok_or_else(|| EngineError::validation("instantiate", "transaction produced no result"))
}

/// Builds the clone of one template issue: substituted text, fresh
/// lifecycle, preserved lineage. Labels are carried over minus the
/// `template` marker, so clones are live work rather than templates.
fn build_clone(source: &Issue, vars: &HashMap<String, String>, now: chrono::DateTime<Utc>) -> Issue {
    let mut clone = Issue::default();
    clone.title = beads_formula::substitute_vars(&source.title, vars);
    clone.description = beads_formula::substitute_vars(&source.description, vars);
    clone.design = beads_formula::substitute_vars(&source.design, vars);
    clone.acceptance_criteria = beads_formula::substitute_vars(&source.acceptance_criteria, vars);
    clone.notes = beads_formula::substitute_vars(&source.notes, vars);
    clone.status = Status::Open;
    clone.priority = source.priority;
    clone.issue_type = source.issue_type.clone();
    clone.assignee = source.assignee.clone();
    clone.created_at = now;
    clone.updated_at = now;
    clone.bonded_from = source.bonded_from.clone();
    clone.labels = source
        .labels
        .iter()
        .filter(|l| l.as_str() != TEMPLATE_LABEL)
        .cloned()
        .collect();
    clone
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::subgraph::load_subgraph;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Release template: root + two children, one cross edge.
    fn seed_template(s: &SqliteStore) {
        let root = IssueBuilder::new("Release {{version}}")
            .id("bd-t00001")
            .labels(vec!["template".into()])
            .build();
        let tag = IssueBuilder::new("Tag {{version}}").id("bd-t00002").build();
        let announce = IssueBuilder::new("Announce").id("bd-t00003").build();
        for issue in [&root, &tag, &announce] {
            Storage::create_issue(s, issue, "test").unwrap();
        }
        for (from, to, t) in [
            ("bd-t00002", "bd-t00001", DependencyType::ParentChild),
            ("bd-t00003", "bd-t00001", DependencyType::ParentChild),
            ("bd-t00003", "bd-t00002", DependencyType::Blocks),
        ] {
            Storage::add_dependency(s, &Dependency::new(from, to, t, "test"), "test").unwrap();
        }
    }

    #[test]
    fn clones_topology_with_substitution() {
        let s = store();
        seed_template(&s);
        let sub = load_subgraph(&[&s], "bd-t00001", &CancelToken::new()).unwrap();

        let result = clone_subgraph(
            &s,
            &sub,
            &vars(&[("version", "1.2.3")]),
            &InstantiateOptions::default(),
            "alice",
        )
        .unwrap();

        assert_eq!(result.created, 3);
        assert_eq!(result.id_mapping.len(), 3);

        let new_root = Storage::get_issue(&s, &result.new_root_id).unwrap();
        assert_eq!(new_root.title, "Release 1.2.3");
        assert_eq!(new_root.status, Status::Open);

        let new_tag_id = &result.id_mapping["bd-t00002"];
        let new_tag = Storage::get_issue(&s, new_tag_id).unwrap();
        assert_eq!(new_tag.title, "Tag 1.2.3");

        // The clone is live work, not a template.
        assert!(Storage::get_labels(&s, &result.new_root_id)
            .unwrap()
            .is_empty());

        // Edge topology is preserved under the mapping.
        let new_announce_id = &result.id_mapping["bd-t00003"];
        let deps = Storage::get_dependency_records(&s, new_announce_id).unwrap();
        let blocks: Vec<&Dependency> = deps
            .iter()
            .filter(|d| d.dep_type == DependencyType::Blocks)
            .collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(&blocks[0].depends_on_id, new_tag_id);

        // Originals untouched.
        let original = Storage::get_issue(&s, "bd-t00001").unwrap();
        assert_eq!(original.title, "Release {{version}}");
    }

    #[test]
    fn missing_required_variable_aborts_cleanly() {
        let s = store();
        seed_template(&s);
        let sub = load_subgraph(&[&s], "bd-t00001", &CancelToken::new()).unwrap();

        let before = Storage::search_issues(&s, "", &Default::default())
            .unwrap()
            .len();

        let err = clone_subgraph(
            &s,
            &sub,
            &HashMap::new(),
            &InstantiateOptions::default(),
            "alice",
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::MissingVariables(ref v) if v == &vec!["version"]));

        let after = Storage::search_issues(&s, "", &Default::default())
            .unwrap()
            .len();
        assert_eq!(before, after);
    }

    #[test]
    fn defaults_fill_missing_values() {
        let s = store();
        let root = IssueBuilder::new("Deploy to {{env}}")
            .id("bd-t00001")
            .labels(vec!["template".into()])
            .metadata_json(r#"{"vars":{"env":{"default":"staging"}}}"#)
            .build();
        Storage::create_issue(&s, &root, "test").unwrap();
        let sub = load_subgraph(&[&s], "bd-t00001", &CancelToken::new()).unwrap();

        let result = clone_subgraph(
            &s,
            &sub,
            &HashMap::new(),
            &InstantiateOptions::default(),
            "alice",
        )
        .unwrap();
        let clone = Storage::get_issue(&s, &result.new_root_id).unwrap();
        assert_eq!(clone.title, "Deploy to staging");
    }

    #[test]
    fn parent_id_switches_to_hierarchical_allocation() {
        let s = store();
        seed_template(&s);
        let host = IssueBuilder::new("Host epic").id("bd-000001").build();
        Storage::create_issue(&s, &host, "test").unwrap();

        let sub = load_subgraph(&[&s], "bd-t00001", &CancelToken::new()).unwrap();
        let result = clone_subgraph(
            &s,
            &sub,
            &vars(&[("version", "2.0")]),
            &InstantiateOptions {
                parent_id: Some("bd-000001".into()),
                ..Default::default()
            },
            "alice",
        )
        .unwrap();

        assert_eq!(result.new_root_id, "bd-000001.1");
        // Children hang below the remapped root.
        let child_ids: Vec<&String> = [
            &result.id_mapping["bd-t00002"],
            &result.id_mapping["bd-t00003"],
        ]
        .into_iter()
        .collect();
        for id in child_ids {
            assert!(id.starts_with("bd-000001.1."), "unexpected id {id}");
        }
    }

    #[test]
    fn requires_skills_edges_added() {
        let s = store();
        let root = IssueBuilder::new("Port {{thing}}")
            .id("bd-t00001")
            .labels(vec!["template".into()])
            .metadata_json(r#"{"vars":{"thing":{"required":true}},"requires_skills":["rust"]}"#)
            .build();
        Storage::create_issue(&s, &root, "test").unwrap();
        let sub = load_subgraph(&[&s], "bd-t00001", &CancelToken::new()).unwrap();

        let result = clone_subgraph(
            &s,
            &sub,
            &vars(&[("thing", "codec")]),
            &InstantiateOptions::default(),
            "alice",
        )
        .unwrap();

        let deps = Storage::get_dependency_records(&s, &result.new_root_id).unwrap();
        assert!(deps
            .iter()
            .any(|d| d.dep_type == DependencyType::RequiresSkill && d.depends_on_id == "rust"));
    }

    #[test]
    fn assignee_applies_to_root_only() {
        let s = store();
        seed_template(&s);
        let sub = load_subgraph(&[&s], "bd-t00001", &CancelToken::new()).unwrap();

        let result = clone_subgraph(
            &s,
            &sub,
            &vars(&[("version", "3.0")]),
            &InstantiateOptions {
                assignee: Some("alice".into()),
                ..Default::default()
            },
            "alice",
        )
        .unwrap();

        let root = Storage::get_issue(&s, &result.new_root_id).unwrap();
        assert_eq!(root.assignee, "alice");
        let child = Storage::get_issue(&s, &result.id_mapping["bd-t00002"]).unwrap();
        assert!(child.assignee.is_empty());
    }
}
