//! Core engine for mageos-release
//!
//! - **config**: build configuration (release.toml) parsing, merging and validation
//! - **error**: error types with contextual help messages and exit codes
//! - **process**: bounded execution of external tools
//! - **security**: argument safety predicate for refs, branches and messages
//! - **vcs**: git working copies and the URL-keyed repository registry

pub mod config;
pub mod error;
pub mod process;
pub mod security;
pub mod vcs;
