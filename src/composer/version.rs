//! Release version format
//!
//! Accepted: `X.Y[-suffix]` and `X.Y.Z[-suffix]`, where the suffix starts with a
//! lowercase letter followed by lowercase letters, digits or dots
//! (`2.4-p2`, `1.2.3-alpha`, `1.2.2-patch2`).

use crate::core::error::{ReleaseResult, ValidationError};
use regex::Regex;
use std::sync::LazyLock;

static VERSION_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
  [
    // 1.0, 1.2-beta, 2.4-p2
    Regex::new(r"^[0-9]+\.[0-9]+(-[a-z][a-z0-9.]*)?$").expect("static regex"),
    // 1.0.0, 1.2.1-alpha, 1.2.2-patch2
    Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+(-[a-z][a-z0-9.]*)?$").expect("static regex"),
  ]
});

/// Whether `version` matches one of the accepted patterns
pub fn is_valid_version(version: &str) -> bool {
  VERSION_PATTERNS.iter().any(|re| re.is_match(version))
}

/// Fail with `InvalidVersion` unless `version` is accepted; `what` names the value
pub fn validate_version_string(version: &str, what: &str) -> ReleaseResult<()> {
  if is_valid_version(version) {
    return Ok(());
  }
  Err(
    ValidationError::InvalidVersion {
      what: what.to_string(),
      version: version.to_string(),
    }
    .into(),
  )
}
