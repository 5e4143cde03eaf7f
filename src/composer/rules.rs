//! Release rewrite policy: vendor rename, version propagation, replace declarations
//!
//! Every manifest touched by a release goes through the same chain, in this order:
//! [`set_release_identity`] (needs the original name), [`rename_vendor`],
//! [`propagate_version`], then the package's custom rules.

use super::manifest::{DependencySection, Manifest};
use super::rewrite::{RewriteRule, apply_transforms};
use super::version::validate_version_string;
use crate::core::error::ReleaseResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Suffix of informational sample-data suggestions
pub const SAMPLE_DATA_SUFFIX: &str = "-sample-data";

/// Prefix of the suggestion text for sample-data packages
pub const SAMPLE_DATA_SUGGEST: &str = "Sample Data version:";

/// Package name → replace constraint recorded on the renamed package
pub type ReplaceVersionMap = BTreeMap<String, String>;

/// Vendor namespace rewrite, e.g. `magento/*` → `mage-os/*`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRename {
  pub from: String,
  pub to: String,
}

impl Default for VendorRename {
  fn default() -> Self {
    Self {
      from: "magento".to_string(),
      to: "mage-os".to_string(),
    }
  }
}

impl VendorRename {
  /// The renamed package, or `None` when it is not under the source vendor
  pub fn rename(&self, package: &str) -> Option<String> {
    package
      .split_once('/')
      .filter(|(vendor, _)| *vendor == self.from)
      .map(|(_, local)| format!("{}/{}", self.to, local))
  }
}

/// Move the name and every dependency key from the source to the destination vendor
pub fn rename_vendor(mut manifest: Manifest, rename: &VendorRename) -> ReleaseResult<Manifest> {
  if let Some(name) = rename.rename(manifest.name()) {
    manifest.set_name(&name)?;
  }
  for section in DependencySection::ALL {
    manifest.rename_dependencies(section, |key| rename.rename(key));
  }
  Ok(manifest)
}

/// Pin every dependency under `vendor` to `release_version`
///
/// Sample-data suggestions get a readable text instead of a constraint, since
/// they are informational rather than installable.
pub fn propagate_version(mut manifest: Manifest, vendor: &str, release_version: &str) -> Manifest {
  let prefix = format!("{}/", vendor);
  for section in DependencySection::ALL {
    let Some(map) = manifest.section_mut(section) else {
      continue;
    };
    for (package, constraint) in map.iter_mut() {
      if !package.starts_with(&prefix) {
        continue;
      }
      let pinned = if section == DependencySection::Suggest && package.ends_with(SAMPLE_DATA_SUFFIX) {
        format!("{} {}", SAMPLE_DATA_SUGGEST, release_version)
      } else {
        release_version.to_string()
      };
      *constraint = serde_json::Value::String(pinned);
    }
  }
  manifest
}

/// Stamp the release version and record which upstream package this one replaces
///
/// Must run before [`rename_vendor`]: the replace map is keyed by original names.
pub fn set_release_identity(mut manifest: Manifest, release_version: &str, replace_versions: &ReplaceVersionMap) -> Manifest {
  manifest.set_version(release_version);
  let original = manifest.name().to_string();
  if let Some(constraint) = replace_versions.get(&original) {
    manifest.add_replace(&original, constraint);
  }
  manifest
}

/// Rules shared by every manifest of one release run
#[derive(Debug, Clone)]
pub struct ReleaseRules {
  release_version: String,
  vendor: VendorRename,
  replace_versions: ReplaceVersionMap,
}

impl ReleaseRules {
  /// Validates the release version up front, before anything is mutated
  pub fn new(release_version: &str, vendor: VendorRename, replace_versions: ReplaceVersionMap) -> ReleaseResult<Self> {
    validate_version_string(release_version, "Release version")?;
    Ok(Self {
      release_version: release_version.to_string(),
      vendor,
      replace_versions,
    })
  }

  pub fn release_version(&self) -> &str {
    &self.release_version
  }

  pub fn vendor(&self) -> &VendorRename {
    &self.vendor
  }

  /// Run the full chain; `custom` is keyed by the pre-rename package name
  pub fn apply(&self, manifest: Manifest, custom: &BTreeMap<String, Vec<RewriteRule>>) -> ReleaseResult<Manifest> {
    let original = manifest.name().to_string();
    let manifest = set_release_identity(manifest, &self.release_version, &self.replace_versions);
    let manifest = rename_vendor(manifest, &self.vendor)?;
    let manifest = propagate_version(manifest, &self.vendor.to, &self.release_version);
    match custom.get(&original) {
      Some(rules) => apply_transforms(manifest, rules),
      None => Ok(manifest),
    }
  }
}
