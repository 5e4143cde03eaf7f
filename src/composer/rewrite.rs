//! Per-package custom manifest rewrites
//!
//! Build configurations attach an ordered list of rules to a package name
//! (the name before the vendor rename). Rules are plain data so they can live
//! in TOML:
//!
//! ```toml
//! [components.transform]
//! "magento/module-elasticsearch-8" = [
//!   { rule = "drop-dependency", package = "elasticsearch/elasticsearch" },
//! ]
//! ```

use super::manifest::{DependencySection, Manifest};
use crate::core::error::ReleaseResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// One manifest rewrite step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum RewriteRule {
  /// Remove `package` from `section` when `when_present` (default: `package`) is a key there
  DropDependency {
    #[serde(default)]
    section: DependencySection,
    package: String,
    #[serde(default)]
    when_present: Option<String>,
  },

  /// Set (or add) a dependency constraint
  SetDependency {
    #[serde(default)]
    section: DependencySection,
    package: String,
    constraint: String,
  },

  /// Set a top-level field to an arbitrary JSON value
  SetField { key: String, value: Value },

  /// Remove a top-level field
  RemoveField { key: String },
}

impl RewriteRule {
  /// Apply this rule, returning the rewritten manifest
  pub fn apply(&self, mut manifest: Manifest) -> ReleaseResult<Manifest> {
    match self {
      RewriteRule::DropDependency {
        section,
        package,
        when_present,
      } => {
        let condition = when_present.as_deref().unwrap_or(package);
        let holds = manifest
          .section(*section)
          .map(|s| s.contains_key(condition))
          .unwrap_or(false);
        if holds && manifest.remove_dependency(*section, package) {
          debug!(manifest = manifest.name(), package = %package, section = section.key(), "dropped dependency");
        }
      }
      RewriteRule::SetDependency {
        section,
        package,
        constraint,
      } => manifest.set_dependency(*section, package, constraint),
      RewriteRule::SetField { key, value } => {
        if key == "name" {
          let name = value.as_str().unwrap_or_default();
          manifest.set_name(name)?;
        } else {
          manifest.set_field(key, value.clone());
        }
      }
      RewriteRule::RemoveField { key } => {
        manifest.remove_field(key);
      }
    }
    Ok(manifest)
  }
}

/// Fold a manifest through `rules` in order, then re-check its invariants
pub fn apply_transforms(manifest: Manifest, rules: &[RewriteRule]) -> ReleaseResult<Manifest> {
  let source = manifest.name().to_string();
  let manifest = rules.iter().try_fold(manifest, |m, rule| rule.apply(m))?;
  manifest.validate(&source)?;
  Ok(manifest)
}
