//! CLI commands for mageos-release
//!
//! - **prep**: prepare, commit and tag a release in every configured repository
//! - **plan**: dry run listing the packages each repository would release
//! - **upstream**: resolve the package versions of an upstream release via composer

pub mod plan;
pub mod prep;
pub mod upstream;

pub use plan::run_plan;
pub use prep::{PrepArgs, run_prep};
pub use upstream::run_upstream_versions;

use crate::core::config::BuildConfig;
use crate::core::process::ProcessLimits;
use std::time::Duration;

/// Configured process limits, with `--timeout` taking precedence
fn limits_with_timeout(config: &BuildConfig, timeout_secs: Option<u64>) -> ProcessLimits {
  let mut limits = config.process.limits();
  if let Some(secs) = timeout_secs {
    limits.timeout = Some(Duration::from_secs(secs));
  }
  limits
}
