//! KDL configuration parsing for patchbot.
//!
//! This crate handles:
//! - The system configuration file (patchbot.kdl)
//! - Provenance commit message templating

pub mod error;
pub mod system;
pub mod template;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    CommitfestConfig, GitConfig, HttpConfig, PatchbotConfig, PathsConfig, SchedulerConfig,
    load_config, parse_config,
};
pub use template::{DEFAULT_PROVENANCE_TEMPLATE, ProvenanceContext};
