//! Release orchestration for one repository
//!
//! Each repository walks the same states:
//!
//! ```text
//! Pending → Cloned → OnSourceRef → OnWorkBranch → PackagesPrepared → Committed → Tagged → WorkBranchDeleted
//! ```
//!
//! Any failure stops the walk where it is. Nothing is rolled back: the work
//! branch and the tag are both created check-before-create, so running the
//! same release again resumes from whatever state the last run left behind.

use super::discovery::{DiscoveredPackage, discover_meta_dirs, discover_packages, manifest_path};
use crate::composer::manifest::Manifest;
use crate::composer::metapackage::community_edition_metapackage;
use crate::composer::rules::ReleaseRules;
use crate::core::config::BuildInstruction;
use crate::core::error::{ReleaseResult, ResultExt};
use crate::core::vcs::RepositoryRegistry;
use crate::ui::progress::PackageProgress;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Prefix of the transient branch holding one release's edits
pub const WORK_BRANCH_PREFIX: &str = "work-in-progress-release-prep-";

/// Deterministic work branch for a release version
pub fn work_branch_name(release_version: &str) -> String {
  format!("{}{}", WORK_BRANCH_PREFIX, release_version)
}

/// How far a repository got
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepoState {
  Pending,
  Cloned,
  OnSourceRef,
  OnWorkBranch,
  PackagesPrepared,
  Committed,
  Tagged,
  WorkBranchDeleted,
}

impl fmt::Display for RepoState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      RepoState::Pending => "pending",
      RepoState::Cloned => "cloned",
      RepoState::OnSourceRef => "on source ref",
      RepoState::OnWorkBranch => "on work branch",
      RepoState::PackagesPrepared => "packages prepared",
      RepoState::Committed => "committed",
      RepoState::Tagged => "tagged",
      RepoState::WorkBranchDeleted => "work branch deleted",
    };
    f.write_str(name)
  }
}

/// A manifest rewritten during prep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedPackage {
  pub label: String,
  /// Repo-relative path of the written composer.json
  pub manifest: PathBuf,
  pub original_name: String,
  pub name: String,
}

/// Result of one repository's release prep
#[derive(Debug, Clone, Serialize)]
pub struct PrepOutcome {
  pub component: String,
  pub repo_url: String,
  pub source_ref: String,
  pub release_version: String,
  pub work_branch: String,
  pub state: RepoState,
  pub packages: Vec<PreparedPackage>,
  /// `false` when the manifests were already committed by an earlier run
  pub committed: bool,
}

impl PrepOutcome {
  fn new(instruction: &BuildInstruction, release_version: &str) -> Self {
    Self {
      component: instruction.name.clone(),
      repo_url: instruction.repo_url.clone(),
      source_ref: instruction.git_ref.clone(),
      release_version: release_version.to_string(),
      work_branch: work_branch_name(release_version),
      state: RepoState::Pending,
      packages: Vec::new(),
      committed: false,
    }
  }

  fn reach(&mut self, state: RepoState) {
    info!(component = %self.component, state = %state, "reached state");
    self.state = state;
  }
}

/// Read-only view of what a release of one repository would touch
#[derive(Debug, Clone, Serialize)]
pub struct ReleasePlan {
  pub component: String,
  pub repo_url: String,
  pub source_ref: String,
  pub packages: Vec<DiscoveredPackage>,
  pub meta_packages: Vec<DiscoveredPackage>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub community_edition_metapackage: Option<PathBuf>,
}

/// Drives release prep for one release version
pub struct ReleasePrep<'a> {
  registry: &'a RepositoryRegistry,
  rules: ReleaseRules,
  commit_message: String,
  metapackage_dir: String,
  show_progress: bool,
}

impl<'a> ReleasePrep<'a> {
  pub fn new(registry: &'a RepositoryRegistry, rules: ReleaseRules) -> Self {
    let commit_message = format!("Release {}", rules.release_version());
    Self {
      registry,
      rules,
      commit_message,
      metapackage_dir: "_metapackage".to_string(),
      show_progress: false,
    }
  }

  pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
    self.commit_message = message.into();
    self
  }

  pub fn with_metapackage_dir(mut self, dir: impl Into<String>) -> Self {
    self.metapackage_dir = dir.into();
    self
  }

  /// Draw a per-package progress bar (sequential runs only)
  pub fn with_progress(mut self, show: bool) -> Self {
    self.show_progress = show;
    self
  }

  pub fn release_version(&self) -> &str {
    self.rules.release_version()
  }

  /// Prepare, commit and tag one repository
  ///
  /// On failure the error names the component and the last state reached.
  pub fn prep_release(&self, instruction: &BuildInstruction) -> ReleaseResult<PrepOutcome> {
    let mut outcome = PrepOutcome::new(instruction, self.release_version());
    match self.drive(instruction, &mut outcome) {
      Ok(()) => Ok(outcome),
      Err(e) => Err(e.context(format!(
        "Release prep of '{}' ({}) stopped after state: {}",
        instruction.name, instruction.repo_url, outcome.state
      ))),
    }
  }

  /// Run several repositories, isolating failures per repository
  ///
  /// Results come back in instruction order. With `parallel`, one task runs per
  /// working copy; instructions whose URLs share a cache directory stay sequential.
  pub fn prep_all(&self, instructions: &[BuildInstruction], parallel: bool) -> Vec<ReleaseResult<PrepOutcome>> {
    if !parallel {
      return instructions.iter().map(|i| self.prep_release(i)).collect();
    }

    let groups = group_by_working_copy(self.registry, instructions);

    let quiet = ReleasePrep {
      registry: self.registry,
      rules: self.rules.clone(),
      commit_message: self.commit_message.clone(),
      metapackage_dir: self.metapackage_dir.clone(),
      show_progress: false,
    };

    let mut results: Vec<(usize, ReleaseResult<PrepOutcome>)> = groups
      .par_iter()
      .flat_map_iter(|members| {
        members
          .iter()
          .map(|&idx| (idx, quiet.prep_release(&instructions[idx])))
          .collect::<Vec<_>>()
      })
      .collect();
    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, result)| result).collect()
  }

  fn drive(&self, instruction: &BuildInstruction, outcome: &mut PrepOutcome) -> ReleaseResult<()> {
    let url = instruction.repo_url.as_str();
    let source_ref = instruction.git_ref.as_str();
    let work_branch = outcome.work_branch.clone();
    let version = self.release_version();

    info!(component = %instruction.name, url, version, "prepping release");

    self.registry.ensure_checked_out(url, None)?;
    outcome.reach(RepoState::Cloned);

    let root = self.registry.ensure_checked_out(url, Some(source_ref))?;
    outcome.reach(RepoState::OnSourceRef);

    self.registry.create_branch(url, &work_branch)?;
    outcome.reach(RepoState::OnWorkBranch);

    // Discover everything up front so a misconfigured exclude fails before any write
    let packages = discover_packages(self.registry, url, &work_branch, instruction)?;
    let meta_packages = discover_meta_dirs(self.registry, url, &work_branch, instruction)?;

    let total = packages.len() + meta_packages.len();
    let mut progress = (self.show_progress && total > 0).then(|| PackageProgress::new(total, instruction.name.clone()));
    for package in packages.iter().chain(&meta_packages) {
      let prepared = self.prepare_package(instruction, &root, &work_branch, package)?;
      outcome.packages.push(prepared);
      if let Some(progress) = progress.as_mut() {
        progress.inc();
      }
    }

    if instruction.magento_community_edition_metapackage {
      let prepared = self.prepare_community_edition(instruction, &root, &work_branch, &outcome.packages)?;
      outcome.packages.push(prepared);
    }
    outcome.reach(RepoState::PackagesPrepared);

    outcome.committed = self.registry.commit(url, &self.commit_message)?;
    if !outcome.committed {
      warn!(component = %instruction.name, "manifests already committed on {}", work_branch);
    }
    outcome.reach(RepoState::Committed);

    let details = format!("Tag {} already exists for this repo ({}) and was not created by mageos-release", version, url);
    self.registry.create_tag_for_ref(url, &work_branch, version, Some(&details))?;
    outcome.reach(RepoState::Tagged);

    self.registry.delete_branch(url, &work_branch, source_ref, true)?;
    outcome.reach(RepoState::WorkBranchDeleted);

    Ok(())
  }

  fn prepare_package(
    &self,
    instruction: &BuildInstruction,
    root: &Path,
    work_branch: &str,
    package: &DiscoveredPackage,
  ) -> ReleaseResult<PreparedPackage> {
    info!(package = %package.label, "preparing");
    let path = package.manifest_path();
    let content = self.registry.read_file(&instruction.repo_url, &path, work_branch)?;
    let manifest = Manifest::parse(&content, &path.to_string_lossy())?;
    let original_name = manifest.name().to_string();

    let manifest = self
      .rules
      .apply(manifest, &instruction.transform)
      .with_context(|| format!("Failed to prepare {}", package.label))?;
    self.write_and_stage(&instruction.repo_url, root, &path, &manifest)?;

    Ok(PreparedPackage {
      label: package.label.clone(),
      manifest: path,
      original_name,
      name: manifest.name().to_string(),
    })
  }

  fn prepare_community_edition(
    &self,
    instruction: &BuildInstruction,
    root: &Path,
    work_branch: &str,
    prepared: &[PreparedPackage],
  ) -> ReleaseResult<PreparedPackage> {
    info!("preparing community edition metapackage");
    let root_path = manifest_path("");
    let content = self.registry.read_file(&instruction.repo_url, &root_path, work_branch)?;
    let root_manifest = Manifest::parse(&content, &root_path.to_string_lossy())?;

    let released: Vec<String> = prepared.iter().map(|p| p.original_name.clone()).collect();
    let metapackage = community_edition_metapackage(&root_manifest, &released)?;
    let original_name = metapackage.name().to_string();
    let metapackage = self.rules.apply(metapackage, &instruction.transform)?;

    let path = manifest_path(&self.metapackage_dir);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(root.join(parent))?;
    }
    self.write_and_stage(&instruction.repo_url, root, &path, &metapackage)?;

    Ok(PreparedPackage {
      label: "Community Edition metapackage".to_string(),
      manifest: path,
      original_name,
      name: metapackage.name().to_string(),
    })
  }

  fn write_and_stage(&self, url: &str, root: &Path, relative: &Path, manifest: &Manifest) -> ReleaseResult<()> {
    let target = root.join(relative);
    fs::write(&target, manifest.to_json_string()?).with_context(|| format!("Failed to write {}", target.display()))?;
    self.registry.stage_file(url, relative)
  }
}

/// Instruction indices grouped by the working copy they drive, in first-seen order
fn group_by_working_copy(registry: &RepositoryRegistry, instructions: &[BuildInstruction]) -> Vec<Vec<usize>> {
  let mut groups: Vec<(PathBuf, Vec<usize>)> = Vec::new();
  for (idx, instruction) in instructions.iter().enumerate() {
    let dir = registry.path_for(&instruction.repo_url);
    match groups.iter_mut().find(|(existing, _)| *existing == dir) {
      Some((_, members)) => members.push(idx),
      None => groups.push((dir, vec![idx])),
    }
  }
  groups.into_iter().map(|(_, members)| members).collect()
}

/// Dry run: check out the source ref and report what prep would touch
pub fn plan(registry: &RepositoryRegistry, instruction: &BuildInstruction, metapackage_dir: &str) -> ReleaseResult<ReleasePlan> {
  let url = instruction.repo_url.as_str();
  let source_ref = instruction.git_ref.as_str();
  registry.ensure_checked_out(url, Some(source_ref))?;

  let packages = discover_packages(registry, url, source_ref, instruction)?;
  let meta_packages = discover_meta_dirs(registry, url, source_ref, instruction)?;
  Ok(ReleasePlan {
    component: instruction.name.clone(),
    repo_url: instruction.repo_url.clone(),
    source_ref: instruction.git_ref.clone(),
    packages,
    meta_packages,
    community_edition_metapackage: instruction
      .magento_community_edition_metapackage
      .then(|| manifest_path(metapackage_dir)),
  })
}
