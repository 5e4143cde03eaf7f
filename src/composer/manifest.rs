//! composer.json model
//!
//! The manifest is kept as an order-preserving JSON object so that fields this
//! tool does not know about (autoload, extra, license, ...) survive a rewrite
//! byte-for-byte in content and position.

use super::version::validate_version_string;
use crate::core::error::{ReleaseResult, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dependency sections rewritten during release prep, in processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencySection {
  #[default]
  Require,
  RequireDev,
  Suggest,
}

impl DependencySection {
  pub const ALL: [DependencySection; 3] = [
    DependencySection::Require,
    DependencySection::RequireDev,
    DependencySection::Suggest,
  ];

  /// Key of the section in composer.json
  pub fn key(self) -> &'static str {
    match self {
      DependencySection::Require => "require",
      DependencySection::RequireDev => "require-dev",
      DependencySection::Suggest => "suggest",
    }
  }
}

/// A parsed composer.json
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
  doc: Map<String, Value>,
}

impl Manifest {
  /// Parse and validate manifest JSON; `source` names the file in errors
  pub fn parse(content: &str, source: &str) -> ReleaseResult<Self> {
    let value: Value = serde_json::from_str(content).map_err(|e| ValidationError::InvalidManifest {
      source_path: source.to_string(),
      reason: e.to_string(),
    })?;
    match value {
      Value::Object(doc) => Self::from_map(doc, source),
      _ => Err(
        ValidationError::InvalidManifest {
          source_path: source.to_string(),
          reason: "top level is not a JSON object".to_string(),
        }
        .into(),
      ),
    }
  }

  /// Wrap an existing JSON object, validating invariants
  pub fn from_map(doc: Map<String, Value>, source: &str) -> ReleaseResult<Self> {
    let manifest = Self { doc };
    manifest.validate(source)?;
    Ok(manifest)
  }

  /// Check the name and version invariants
  pub fn validate(&self, source: &str) -> ReleaseResult<()> {
    let invalid = |reason: String| ValidationError::InvalidManifest {
      source_path: source.to_string(),
      reason,
    };

    let name = self
      .doc
      .get("name")
      .and_then(Value::as_str)
      .ok_or_else(|| invalid("missing string field \"name\"".to_string()))?;
    if !is_qualified_name(name) {
      return Err(invalid(format!("name \"{}\" is not of the form vendor/package", name)).into());
    }

    match self.doc.get("version") {
      None => Ok(()),
      Some(Value::String(version)) => validate_version_string(version, &format!("Version of {}", name)),
      Some(other) => Err(invalid(format!("version must be a string, found {}", other)).into()),
    }
  }

  /// Vendor-qualified package name
  pub fn name(&self) -> &str {
    self.doc.get("name").and_then(Value::as_str).unwrap_or_default()
  }

  /// Vendor segment of the name
  pub fn vendor(&self) -> &str {
    self.name().split_once('/').map(|(vendor, _)| vendor).unwrap_or_default()
  }

  /// Set the package name; it must stay vendor-qualified
  pub fn set_name(&mut self, name: &str) -> ReleaseResult<()> {
    if !is_qualified_name(name) {
      return Err(
        ValidationError::InvalidManifest {
          source_path: self.name().to_string(),
          reason: format!("name \"{}\" is not of the form vendor/package", name),
        }
        .into(),
      );
    }
    self.doc.insert("name".to_string(), Value::String(name.to_string()));
    Ok(())
  }

  pub fn version(&self) -> Option<&str> {
    self.doc.get("version").and_then(Value::as_str)
  }

  pub fn set_version(&mut self, version: &str) {
    self.doc.insert("version".to_string(), Value::String(version.to_string()));
  }

  /// A dependency section, if present and an object
  pub fn section(&self, section: DependencySection) -> Option<&Map<String, Value>> {
    self.doc.get(section.key()).and_then(Value::as_object)
  }

  /// Mutable dependency section, if present and an object
  pub fn section_mut(&mut self, section: DependencySection) -> Option<&mut Map<String, Value>> {
    self.doc.get_mut(section.key()).and_then(Value::as_object_mut)
  }

  /// Constraint of one dependency
  pub fn dependency(&self, section: DependencySection, package: &str) -> Option<&str> {
    self.section(section).and_then(|s| s.get(package)).and_then(Value::as_str)
  }

  /// Set a dependency constraint, creating the section when needed
  pub fn set_dependency(&mut self, section: DependencySection, package: &str, constraint: &str) {
    let entry = self
      .doc
      .entry(section.key())
      .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
      *entry = Value::Object(Map::new());
    }
    if let Value::Object(map) = entry {
      map.insert(package.to_string(), Value::String(constraint.to_string()));
    }
  }

  /// Remove a dependency, returning whether it was present
  pub fn remove_dependency(&mut self, section: DependencySection, package: &str) -> bool {
    self
      .section_mut(section)
      .map(|s| s.shift_remove(package).is_some())
      .unwrap_or(false)
  }

  /// Rename dependency keys in place, keeping their positions
  ///
  /// `rename` returns the new key, or `None` to keep the key unchanged.
  pub fn rename_dependencies<F>(&mut self, section: DependencySection, rename: F)
  where
    F: Fn(&str) -> Option<String>,
  {
    if let Some(map) = self.section_mut(section) {
      let old = std::mem::take(map);
      for (key, value) in old {
        let key = rename(&key).unwrap_or(key);
        map.insert(key, value);
      }
    }
  }

  /// The replace declarations, if any
  pub fn replace(&self) -> Option<&Map<String, Value>> {
    self.doc.get("replace").and_then(Value::as_object)
  }

  /// Declare that this package replaces `package` at `constraint`
  pub fn add_replace(&mut self, package: &str, constraint: &str) {
    let entry = self.doc.entry("replace").or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
      *entry = Value::Object(Map::new());
    }
    if let Value::Object(map) = entry {
      map.insert(package.to_string(), Value::String(constraint.to_string()));
    }
  }

  /// Raw top-level field
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.doc.get(key)
  }

  /// Set a raw top-level field
  pub fn set_field(&mut self, key: &str, value: Value) {
    self.doc.insert(key.to_string(), value);
  }

  /// Remove a raw top-level field
  pub fn remove_field(&mut self, key: &str) -> Option<Value> {
    self.doc.shift_remove(key)
  }

  /// The underlying JSON object
  pub fn as_map(&self) -> &Map<String, Value> {
    &self.doc
  }

  /// Pretty JSON (2-space indent) with a trailing newline
  pub fn to_json_string(&self) -> ReleaseResult<String> {
    let mut out = serde_json::to_string_pretty(&self.doc)?;
    out.push('\n');
    Ok(out)
  }
}

fn is_qualified_name(name: &str) -> bool {
  matches!(name.split_once('/'), Some((vendor, package))
    if !vendor.is_empty() && !package.is_empty() && !package.contains('/'))
}
