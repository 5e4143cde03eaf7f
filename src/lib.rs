//! mageos-release: prepare multi-repository Mage-OS releases
//!
//! For every configured repository the tool checks out the source ref, creates a
//! work branch, rewrites each package's composer.json (vendor rename, version
//! pins, replace declarations, custom rules), commits, tags the release version
//! and deletes the work branch again. Pushing is left to a separate step.
//!
//! - **core**: configuration, errors, process runner, git working copies
//! - **composer**: manifest model and release rewrite rules
//! - **release**: package discovery and the per-repository orchestrator

pub mod commands;
pub mod composer;
pub mod core;
pub mod logging;
pub mod release;
pub mod ui;
pub mod utils;
