//! Routing: where new issues land and how bare tokens resolve into
//! cross-repo references.
//!
//! Settings live in the store's config table under `routing.*`; legacy
//! `contributor.*` keys remain readable. The project->path table for
//! federation comes from `config.yaml`.

use std::path::{Path, PathBuf};

use tracing::debug;

use beads_config::{BeadsConfig, beads_dir_for_repo, expand_path, load_config};
use beads_core::idgen::EXTERNAL_REF_PREFIX;
use beads_storage::Storage;

use crate::error::{EngineError, Result};

/// Config key: routing mode, `auto` or `off`.
pub const ROUTING_MODE_KEY: &str = "routing.mode";
/// Config key: contributor repo path.
pub const ROUTING_CONTRIBUTOR_KEY: &str = "routing.contributor";
/// Config key: maintainer repo path.
pub const ROUTING_MAINTAINER_KEY: &str = "routing.maintainer";

/// Legacy config key: `"true"` meant what `routing.mode=auto` means now.
pub const LEGACY_AUTO_ROUTE_KEY: &str = "contributor.auto_route";
/// Legacy config key superseded by `routing.contributor`.
pub const LEGACY_PLANNING_REPO_KEY: &str = "contributor.planning_repo";

/// The caller's relationship to the repo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Maintainer,
    Contributor,
}

/// Effective routing settings after legacy-key fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingSettings {
    pub mode: String,
    pub contributor: String,
    pub maintainer: String,
}

impl RoutingSettings {
    /// Reads settings from store config, falling back to the legacy
    /// `contributor.*` keys and then to defaults.
    pub fn load(store: &dyn Storage) -> Result<Self> {
        let mode = match store.get_config(ROUTING_MODE_KEY)? {
            Some(mode) => mode,
            None => match store.get_config(LEGACY_AUTO_ROUTE_KEY)? {
                Some(v) if v == "true" => "auto".to_string(),
                _ => String::new(),
            },
        };

        let contributor = match store.get_config(ROUTING_CONTRIBUTOR_KEY)? {
            Some(path) => path,
            None => store
                .get_config(LEGACY_PLANNING_REPO_KEY)?
                .unwrap_or_else(|| "~/.beads-planning".to_string()),
        };

        let maintainer = store
            .get_config(ROUTING_MAINTAINER_KEY)?
            .unwrap_or_else(|| ".".to_string());

        Ok(Self {
            mode,
            contributor,
            maintainer,
        })
    }

    /// Whether contributor redirection is active.
    pub fn is_auto(&self) -> bool {
        self.mode == "auto"
    }
}

/// Returns the repo new issues should be written into.
///
/// A maintainer always stays local. A contributor is redirected to the
/// configured contributor repo while the mode is `auto`.
pub fn determine_target_repo(settings: &RoutingSettings, role: Role, local: &Path) -> PathBuf {
    match role {
        Role::Maintainer => local.to_path_buf(),
        Role::Contributor if settings.is_auto() && settings.contributor != "." => {
            let target = expand_path(&settings.contributor, local);
            debug!(target = %target.display(), "contributor routed");
            target
        }
        Role::Contributor => local.to_path_buf(),
    }
}

/// Tries to interpret a bare token as a route into a known sibling repo.
///
/// `<project>:<capability>` becomes `external:<project>:<capability>`
/// when the project appears in the routing table; everything else yields
/// the empty string.
pub fn resolve_to_external_ref(token: &str, beads_dir: &Path) -> String {
    let config = load_config(beads_dir).unwrap_or_default();
    resolve_token(token, &config)
}

/// Token resolution against an already-loaded config.
pub fn resolve_token(token: &str, config: &BeadsConfig) -> String {
    if token.starts_with(EXTERNAL_REF_PREFIX) {
        return token.to_string();
    }
    let Some((project, capability)) = token.split_once(':') else {
        return String::new();
    };
    if project.is_empty() || capability.is_empty() {
        return String::new();
    }
    if config.external_project_path(project).is_none() {
        return String::new();
    }
    format!("{EXTERNAL_REF_PREFIX}{project}:{capability}")
}

/// Produces the `.beads` directory of a routed project.
pub fn resolve_beads_dir_for_rig(project: &str, beads_dir: &Path) -> Result<PathBuf> {
    let config = load_config(beads_dir)?;
    let Some(path) = config.external_project_path(project) else {
        return Err(EngineError::not_found("route", project));
    };
    let base = beads_dir.parent().unwrap_or(beads_dir);
    Ok(beads_dir_for_repo(&expand_path(path, base)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_storage::SqliteStore;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn defaults_without_any_keys() {
        let s = store();
        let settings = RoutingSettings::load(&s).unwrap();
        assert_eq!(settings.mode, "");
        assert!(!settings.is_auto());
        assert_eq!(settings.contributor, "~/.beads-planning");
        assert_eq!(settings.maintainer, ".");
    }

    #[test]
    fn modern_keys_win() {
        let s = store();
        Storage::set_config(&s, ROUTING_MODE_KEY, "off").unwrap();
        Storage::set_config(&s, LEGACY_AUTO_ROUTE_KEY, "true").unwrap();
        Storage::set_config(&s, ROUTING_CONTRIBUTOR_KEY, "/srv/planning").unwrap();
        Storage::set_config(&s, LEGACY_PLANNING_REPO_KEY, "/old/planning").unwrap();

        let settings = RoutingSettings::load(&s).unwrap();
        assert_eq!(settings.mode, "off");
        assert_eq!(settings.contributor, "/srv/planning");
    }

    #[test]
    fn legacy_keys_fall_back() {
        let s = store();
        Storage::set_config(&s, LEGACY_AUTO_ROUTE_KEY, "true").unwrap();
        Storage::set_config(&s, LEGACY_PLANNING_REPO_KEY, "/old/planning").unwrap();

        let settings = RoutingSettings::load(&s).unwrap();
        assert_eq!(settings.mode, "auto");
        assert!(settings.is_auto());
        assert_eq!(settings.contributor, "/old/planning");
    }

    #[test]
    fn maintainer_stays_local() {
        let settings = RoutingSettings {
            mode: "auto".into(),
            contributor: "/srv/planning".into(),
            maintainer: ".".into(),
        };
        let local = Path::new("/work/repo");
        assert_eq!(
            determine_target_repo(&settings, Role::Maintainer, local),
            local
        );
    }

    #[test]
    fn contributor_redirected_in_auto_mode() {
        let settings = RoutingSettings {
            mode: "auto".into(),
            contributor: "/srv/planning".into(),
            maintainer: ".".into(),
        };
        let local = Path::new("/work/repo");
        assert_eq!(
            determine_target_repo(&settings, Role::Contributor, local),
            PathBuf::from("/srv/planning")
        );

        let off = RoutingSettings {
            mode: String::new(),
            ..settings
        };
        assert_eq!(determine_target_repo(&off, Role::Contributor, local), local);
    }

    #[test]
    fn token_resolution_requires_known_project() {
        let mut config = BeadsConfig::default();
        config
            .external_projects
            .insert("beads".into(), "../beads".into());

        assert_eq!(
            resolve_token("beads:login", &config),
            "external:beads:login"
        );
        assert_eq!(resolve_token("unknown:login", &config), "");
        assert_eq!(resolve_token("plain-token", &config), "");
        // Already-external refs pass through.
        assert_eq!(
            resolve_token("external:beads:login", &config),
            "external:beads:login"
        );
    }

    #[test]
    fn rig_dir_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let beads_dir = dir.path().join("app/.beads");
        std::fs::create_dir_all(&beads_dir).unwrap();
        let mut config = BeadsConfig::default();
        config
            .external_projects
            .insert("beads".into(), "../beads".into());
        beads_config::save_config(&beads_dir, &config).unwrap();

        let resolved = resolve_beads_dir_for_rig("beads", &beads_dir).unwrap();
        assert_eq!(resolved, dir.path().join("app/../beads/.beads"));

        let err = resolve_beads_dir_for_rig("nope", &beads_dir).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }
}
