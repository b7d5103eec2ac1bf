//! Configuration management for the beads work-graph engine.

pub mod beads_dir;
pub mod config;

pub use beads_dir::{
    BEADS_DIR_NAME, DB_FILE_NAME, WISP_DB_FILE_NAME, beads_dir_for_repo, expand_path,
    find_beads_dir, find_beads_dir_from,
};
pub use config::{BeadsConfig, ConfigError, RoutingConfig, load_config, save_config};
