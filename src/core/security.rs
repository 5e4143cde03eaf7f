//! Argument safety checks for values that reach git
//!
//! Git is always invoked with an argument vector, so nothing here is parsed by a
//! shell. The predicate still runs on every ref, branch name and commit message:
//! a leading `-` would be read by git as a flag, and spaces, backticks or `$`
//! never appear in the refs this tool works with. This is a blunt filter, not an
//! escaping scheme.

use crate::core::error::{ReleaseResult, ValidationError};

fn looks_like_flag(value: &str) -> bool {
  value.starts_with('-')
}

fn has_substitution_chars(value: &str) -> bool {
  value.contains('`') || value.contains('$')
}

fn is_unsafe_name(value: &str) -> bool {
  looks_like_flag(value) || value.contains(' ') || has_substitution_chars(value)
}

/// Ensure a ref (branch, tag or commit id) is safe to pass to git
pub fn validate_ref_is_secure(git_ref: &str) -> ReleaseResult<&str> {
  if is_unsafe_name(git_ref) {
    return Err(
      ValidationError::UnsafeRef {
        kind: "ref",
        value: git_ref.to_string(),
      }
      .into(),
    );
  }
  Ok(git_ref)
}

/// Ensure a branch name is safe to pass to git
pub fn validate_branch_is_secure(branch: &str) -> ReleaseResult<&str> {
  if is_unsafe_name(branch) {
    return Err(
      ValidationError::UnsafeRef {
        kind: "branch",
        value: branch.to_string(),
      }
      .into(),
    );
  }
  Ok(branch)
}

/// Ensure a commit message is safe to pass to git
///
/// Spaces are allowed here, messages are prose.
pub fn validate_commit_message_is_secure(message: &str) -> ReleaseResult<&str> {
  if looks_like_flag(message) || has_substitution_chars(message) {
    return Err(
      ValidationError::UnsafeInput {
        value: message.to_string(),
      }
      .into(),
    );
  }
  Ok(message)
}
