//! Package discovery: which directories of a repository are released packages

use crate::composer::manifest::Manifest;
use crate::core::config::{BuildInstruction, PackageDirGroup, PackageIndividual};
use crate::core::error::{ReleaseResult, ValidationError};
use crate::core::vcs::RepositoryRegistry;
use crate::utils::trim_dir;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const MANIFEST_FILE: &str = "composer.json";

/// A package directory to prepare
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredPackage {
  pub label: String,
  /// Relative to the working-copy root; empty for the root itself
  pub dir: String,
}

impl DiscoveredPackage {
  /// Repo-relative path of the package manifest
  pub fn manifest_path(&self) -> PathBuf {
    manifest_path(&self.dir)
  }
}

impl From<&PackageIndividual> for DiscoveredPackage {
  fn from(individual: &PackageIndividual) -> Self {
    Self {
      label: individual.label.clone(),
      dir: trim_dir(&individual.dir).to_string(),
    }
  }
}

/// Repo-relative manifest path of a package directory
pub fn manifest_path(dir: &str) -> PathBuf {
  let dir = trim_dir(dir);
  if dir.is_empty() {
    PathBuf::from(MANIFEST_FILE)
  } else {
    Path::new(dir).join(MANIFEST_FILE)
  }
}

/// Immediate children of `group.dir` at `git_ref` that are packages
///
/// Children are visited in name order. A child is skipped when `<child>/` (or
/// `<dir>/<child>/`) is excluded. Every remaining child must hold a manifest:
/// a missing one means the exclude list is wrong, so it fails the whole run.
pub fn discover_dir_group(
  registry: &RepositoryRegistry,
  url: &str,
  git_ref: &str,
  group: &PackageDirGroup,
) -> ReleaseResult<Vec<DiscoveredPackage>> {
  let dir = trim_dir(&group.dir);
  let root = registry.path_for(url);
  let mut packages = Vec::new();

  for child in registry.list_package_directories(url, dir, git_ref)? {
    if is_excluded(group, dir, &child) {
      debug!(dir, child = %child, "excluded");
      continue;
    }

    let child_dir = if dir.is_empty() { child } else { format!("{}/{}", dir, child) };
    let manifest = manifest_path(&child_dir);
    if !root.join(&manifest).is_file() {
      return Err(
        ValidationError::MissingManifest {
          path: root.join(&child_dir),
        }
        .into(),
      );
    }

    let content = registry.read_file(url, &manifest, git_ref)?;
    let name = Manifest::parse(&content, &manifest.to_string_lossy())?.name().to_string();
    packages.push(DiscoveredPackage {
      label: format!("{} (part of {})", name, group.label),
      dir: child_dir,
    });
  }

  Ok(packages)
}

/// Directory groups in listed order, then individual packages in listed order
pub fn discover_packages(
  registry: &RepositoryRegistry,
  url: &str,
  git_ref: &str,
  instruction: &BuildInstruction,
) -> ReleaseResult<Vec<DiscoveredPackage>> {
  let mut packages = Vec::new();
  for group in &instruction.package_dirs {
    packages.extend(discover_dir_group(registry, url, git_ref, group)?);
  }
  packages.extend(instruction.package_individual.iter().map(DiscoveredPackage::from));
  Ok(packages)
}

/// Directories holding an existing metapackage manifest, in listed order
pub fn discover_meta_dirs(
  registry: &RepositoryRegistry,
  url: &str,
  git_ref: &str,
  instruction: &BuildInstruction,
) -> ReleaseResult<Vec<DiscoveredPackage>> {
  if instruction.package_meta_from_dirs.is_empty() {
    return Ok(Vec::new());
  }

  let root = registry.ensure_checked_out(url, Some(git_ref))?;
  instruction
    .package_meta_from_dirs
    .iter()
    .map(|entry| {
      let package = DiscoveredPackage::from(entry);
      if root.join(package.manifest_path()).is_file() {
        Ok(package)
      } else {
        Err(ValidationError::MissingManifest { path: root.join(&package.dir) }.into())
      }
    })
    .collect()
}

fn is_excluded(group: &PackageDirGroup, dir: &str, child: &str) -> bool {
  let short = format!("{}/", child);
  let long = format!("{}/{}/", dir, child);
  group.excludes.iter().any(|e| *e == short || *e == long)
}
