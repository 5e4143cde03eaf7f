//! Aggregate metapackage synthesis
//!
//! The community edition metapackage lists every released package so a single
//! `composer require` pulls the whole distribution. It is derived from the
//! repository's root composer.json: its requirements survive, everything that
//! only makes sense for a project checkout (autoload, scripts, replace...) is
//! dropped.

use super::manifest::{DependencySection, Manifest};
use crate::core::error::ReleaseResult;
use serde_json::{Map, Value};

/// Name of the synthesized aggregate package (pre-rename)
pub const COMMUNITY_EDITION_METAPACKAGE: &str = "magento/product-community-edition";

/// Root keys that have no meaning in a metapackage
const PROJECT_ONLY_KEYS: &[&str] = &[
  "autoload",
  "autoload-dev",
  "replace",
  "require-dev",
  "scripts",
  "extra",
  "config",
  "repositories",
  "minimum-stability",
  "prefer-stable",
  "bin",
];

/// Build the community edition metapackage
///
/// `released` holds the pre-rename names of every package prepared in this
/// run. They are required with a `*` placeholder which the release chain pins
/// to the release version after the vendor rename.
pub fn community_edition_metapackage(root: &Manifest, released: &[String]) -> ReleaseResult<Manifest> {
  let mut doc = Map::new();
  doc.insert(
    "name".to_string(),
    Value::String(COMMUNITY_EDITION_METAPACKAGE.to_string()),
  );
  for (key, value) in root.as_map() {
    if key == "name" || key == "version" || PROJECT_ONLY_KEYS.contains(&key.as_str()) {
      continue;
    }
    doc.insert(key.clone(), value.clone());
  }
  doc.insert("type".to_string(), Value::String("metapackage".to_string()));

  let mut manifest = Manifest::from_map(doc, COMMUNITY_EDITION_METAPACKAGE)?;
  for package in released {
    if package != COMMUNITY_EDITION_METAPACKAGE {
      manifest.set_dependency(DependencySection::Require, package, "*");
    }
  }

  Ok(manifest)
}
