//! Cross-repo external references: `external:<project>:<capability>`.
//!
//! A dependency on an external reference is satisfied when the sibling
//! repo named by the routing table contains a closed issue labelled
//! `provides:<capability>`. Resolution is best-effort, read-only, and
//! never retains a handle past the check.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use beads_config::{BeadsConfig, DB_FILE_NAME, beads_dir_for_repo, expand_path, load_config};
use beads_core::enums::Status;
use beads_core::idgen::EXTERNAL_REF_PREFIX;
use beads_core::issue::PROVIDES_LABEL_PREFIX;
use beads_storage::{SqliteStore, Storage};

/// A parsed `external:<project>:<capability>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRef {
    pub project: String,
    pub capability: String,
}

impl ExternalRef {
    /// Parses an external reference string. Returns `None` unless the
    /// string has the full three-part shape with non-empty components.
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix(EXTERNAL_REF_PREFIX)?;
        let (project, capability) = rest.split_once(':')?;
        if project.is_empty() || capability.is_empty() {
            return None;
        }
        Some(Self {
            project: project.to_string(),
            capability: capability.to_string(),
        })
    }
}

impl fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}", EXTERNAL_REF_PREFIX, self.project, self.capability)
    }
}

/// Resolves external references against sibling repos.
pub struct ExternalResolver {
    beads_dir: PathBuf,
    config: BeadsConfig,
}

impl ExternalResolver {
    /// Creates a resolver rooted at the local `.beads` directory. The
    /// routing table is read from its `config.yaml`; a missing or broken
    /// config leaves every reference unsatisfied.
    pub fn new(beads_dir: &Path) -> Self {
        let config = load_config(beads_dir).unwrap_or_else(|e| {
            warn!(error = %e, "failed to load routing config; external refs unsatisfied");
            BeadsConfig::default()
        });
        Self {
            beads_dir: beads_dir.to_path_buf(),
            config,
        }
    }

    /// Creates a resolver from an already-loaded config (tests,
    /// embedded callers).
    pub fn with_config(beads_dir: &Path, config: BeadsConfig) -> Self {
        Self {
            beads_dir: beads_dir.to_path_buf(),
            config,
        }
    }

    /// Returns the sibling repo's `.beads` directory for a project name.
    pub fn project_beads_dir(&self, project: &str) -> Option<PathBuf> {
        let path = self.config.external_project_path(project)?;
        let base = self
            .beads_dir
            .parent()
            .unwrap_or(self.beads_dir.as_path());
        Some(beads_dir_for_repo(&expand_path(path, base)))
    }

    /// Checks whether an external reference string is satisfied.
    pub fn is_satisfied_str(&self, reference: &str) -> bool {
        match ExternalRef::parse(reference) {
            Some(r) => self.is_satisfied(&r),
            None => {
                warn!(reference, "malformed external reference");
                false
            }
        }
    }

    /// Checks whether the referenced capability is provided: the target
    /// store contains a closed issue labelled `provides:<capability>`.
    ///
    /// The target store is opened read-only and dropped before
    /// returning, on every path.
    pub fn is_satisfied(&self, reference: &ExternalRef) -> bool {
        let Some(dir) = self.project_beads_dir(&reference.project) else {
            debug!(project = %reference.project, "no route for external project");
            return false;
        };
        let db_path = dir.join(DB_FILE_NAME);

        let store = match SqliteStore::open_read_only(&db_path) {
            Ok(store) => store,
            Err(e) => {
                warn!(path = %db_path.display(), error = %e, "cannot open external store");
                return false;
            }
        };

        let label = format!("{PROVIDES_LABEL_PREFIX}{}", reference.capability);
        let satisfied = match store.get_issues_by_label(&label) {
            Ok(issues) => issues.iter().any(|i| i.status == Status::Closed),
            Err(e) => {
                warn!(label, error = %e, "external capability lookup failed");
                false
            }
        };
        let _ = store.close();
        satisfied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_well_formed() {
        let r = ExternalRef::parse("external:beads:login").unwrap();
        assert_eq!(r.project, "beads");
        assert_eq!(r.capability, "login");
        assert_eq!(r.to_string(), "external:beads:login");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(ExternalRef::parse("bd-000001").is_none());
        assert!(ExternalRef::parse("external:beads").is_none());
        assert!(ExternalRef::parse("external::login").is_none());
        assert!(ExternalRef::parse("external:beads:").is_none());
    }

    #[test]
    fn capability_with_colons_keeps_remainder() {
        let r = ExternalRef::parse("external:beads:auth:v2").unwrap();
        assert_eq!(r.project, "beads");
        assert_eq!(r.capability, "auth:v2");
    }

    #[test]
    fn unrouted_project_is_unsatisfied() {
        let dir = tempfile::tempdir().unwrap();
        let resolver =
            ExternalResolver::with_config(&dir.path().join(".beads"), BeadsConfig::default());
        assert!(!resolver.is_satisfied_str("external:unknown:thing"));
    }
}
