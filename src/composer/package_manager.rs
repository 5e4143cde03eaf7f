//! Composer collaborator: resolve the package versions of an upstream release
//!
//! Only used to build a replace map from an upstream release, never by the
//! manifest pipeline itself.

use super::rules::SAMPLE_DATA_SUGGEST;
use super::version::validate_version_string;
use crate::core::process::{ProcessLimits, StderrPolicy, run_tool};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use tracing::info;

/// Composer mirror used to create reference projects
pub const DEFAULT_REPOSITORY_URL: &str = "https://mirror.mage-os.org";

/// Project skeleton installed to discover an upstream release
pub const PROJECT_PACKAGE: &str = "magento/project-community-edition";

/// Composer prints this on stderr during a successful install
const COMPOSER_INFO: StderrPolicy = StderrPolicy::Informational(&["Generating autoload files"]);

// " - magento/module-bundle-sample-data: Sample Data version: 100.4.*"
static SAMPLE_DATA_LINE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^.*?(?P<package>[a-z0-9_.-]+/[^:\s]+): Sample Data version:.*?(?P<version>\d.*)$").expect("static regex")
});

#[derive(Debug, Deserialize)]
struct ShowOutput {
  #[serde(default)]
  installed: Vec<InstalledPackage>,
}

#[derive(Debug, Deserialize)]
struct InstalledPackage {
  name: String,
  version: String,
}

/// Thin wrapper around the `composer` binary
#[derive(Debug, Clone)]
pub struct Composer {
  work_root: PathBuf,
  repository_url: String,
  limits: ProcessLimits,
}

impl Composer {
  /// Projects are created below `work_root` as `workdir-<version>`
  pub fn new(work_root: impl Into<PathBuf>, limits: ProcessLimits) -> Self {
    Self {
      work_root: work_root.into(),
      repository_url: DEFAULT_REPOSITORY_URL.to_string(),
      limits,
    }
  }

  pub fn with_repository_url(mut self, url: impl Into<String>) -> Self {
    self.repository_url = url.into();
    self
  }

  /// Package name → installed version for a full `version` install, sample data included
  pub fn package_version_map(&self, version: &str) -> Result<BTreeMap<String, String>> {
    validate_version_string(version, "Upstream version")?;
    info!(version, "determining upstream package versions");

    let dir = self.create_project(version)?;
    self.install_sample_data(&dir)?;
    self.installed_packages(&dir)
  }

  /// Create (or reuse) the reference project for `version`
  pub fn create_project(&self, version: &str) -> Result<PathBuf> {
    let dir = self.work_root.join(format!("workdir-{}", version));
    if dir.exists() {
      info!(dir = %dir.display(), "found existing installation");
      return Ok(dir);
    }

    let mut cmd = Command::new("composer");
    cmd
      .args(["create-project", "--ignore-platform-reqs", "--no-interaction", "--repository-url"])
      .arg(&self.repository_url)
      .arg(PROJECT_PACKAGE)
      .arg(&dir)
      .arg(version);
    run_tool(cmd, &self.limits, COMPOSER_INFO).with_context(|| format!("Failed to create project for {}", version))?;
    Ok(dir)
  }

  /// Require every sample-data package the project suggests
  pub fn install_sample_data(&self, dir: &Path) -> Result<()> {
    let mut cmd = Command::new("composer");
    cmd.current_dir(dir).args(["suggests", "--all"]);
    let output = run_tool(cmd, &self.limits, StderrPolicy::Strict(&[]))?;

    let packages = sample_data_requirements(&output);
    if packages.is_empty() {
      return Ok(());
    }

    info!(count = packages.len(), "installing sample data packages");
    let mut cmd = Command::new("composer");
    cmd
      .current_dir(dir)
      .args(["require", "--ignore-platform-reqs", "--no-interaction"])
      .args(&packages);
    run_tool(cmd, &self.limits, COMPOSER_INFO).context("Failed to install sample data packages")?;
    Ok(())
  }

  /// `composer show` of an installed project
  pub fn installed_packages(&self, dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut cmd = Command::new("composer");
    cmd.current_dir(dir).args(["show", "--format=json"]);
    let output = run_tool(cmd, &self.limits, StderrPolicy::Strict(&[]))?;
    parse_installed_packages(&output)
  }
}

/// `package:version` requirements for every sample-data line of `composer suggests --all`
pub fn sample_data_requirements(suggests_output: &str) -> Vec<String> {
  suggests_output
    .lines()
    .filter(|line| line.contains(SAMPLE_DATA_SUGGEST))
    .filter_map(|line| SAMPLE_DATA_LINE.captures(line.trim_end()))
    .map(|caps| format!("{}:{}", &caps["package"], &caps["version"]))
    .collect()
}

/// Name → version map from `composer show --format=json`
pub fn parse_installed_packages(json: &str) -> Result<BTreeMap<String, String>> {
  let output: ShowOutput = serde_json::from_str(json).context("Failed to parse `composer show` output")?;
  Ok(
    output
      .installed
      .into_iter()
      .map(|package| (package.name, package.version))
      .collect(),
  )
}
