//! Version-control layer
//!
//! - **system_git**: one working copy driven through the git binary
//! - **registry**: URL-keyed working-copy cache exposing the release operations

pub mod registry;
pub mod system_git;

pub use registry::{GitIdentity, RepositoryRegistry};
pub use system_git::SystemGit;

use std::path::PathBuf;

/// A file read from a working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
  /// Path relative to the working-copy root
  pub path: PathBuf,
  pub content: Vec<u8>,
  pub is_executable: bool,
}
