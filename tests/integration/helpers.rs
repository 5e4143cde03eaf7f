//! Test helpers for integration tests

use anyhow::{Context, Result};
use mageos_release::core::vcs::RepositoryRegistry;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// A throwaway "remote" repository reached through a file:// URL
pub struct UpstreamRepo {
  _root: TempDir,
  pub path: PathBuf,
}

impl UpstreamRepo {
  /// Create an empty repository on `main`
  pub fn new() -> Result<Self> {
    Self::named("mageos-magento2")
  }

  /// Empty repository whose URL ends in `name`
  pub fn named(name: &str) -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().join(name);
    std::fs::create_dir_all(&path)?;

    git(&path, &["init", "--initial-branch=main"])?;
    git(&path, &["config", "user.name", "Test User"])?;
    git(&path, &["config", "user.email", "test@example.com"])?;

    Ok(Self { _root: root, path })
  }

  /// A repository shaped like a small Magento checkout:
  ///
  /// - `composer.json` (root project)
  /// - `app/code/Magento/ModuleA` → `magento/module-a`
  /// - `app/code/Magento/ModuleB` → `magento/module-b`
  /// - `lib/internal/Magento/Framework` → `magento/framework`
  pub fn magento_like() -> Result<Self> {
    Self::magento_like_named("mageos-magento2")
  }

  pub fn magento_like_named(name: &str) -> Result<Self> {
    let repo = Self::named(name)?;
    repo.write(
      "composer.json",
      r#"{
  "name": "magento/magento2ce",
  "type": "project",
  "version": "2.4.6-dev",
  "require": {
    "php": "~8.1.0||~8.2.0",
    "symfony/console": "~5.4.11"
  },
  "autoload": {
    "psr-4": {
      "Magento\\": "app/code/Magento/"
    }
  }
}
"#,
    )?;
    repo.write(
      "app/code/Magento/ModuleA/composer.json",
      r#"{
  "name": "magento/module-a",
  "description": "N/A",
  "type": "magento2-module",
  "require": {
    "php": "~8.1.0||~8.2.0",
    "magento/framework": "103.0.*",
    "elasticsearch/elasticsearch": "~7.17.0"
  },
  "suggest": {
    "magento/module-a-sample-data": "Sample Data version: 100.4.*"
  }
}
"#,
    )?;
    repo.write(
      "app/code/Magento/ModuleB/composer.json",
      r#"{
  "name": "magento/module-b",
  "require": {
    "magento/module-a": "*"
  }
}
"#,
    )?;
    repo.write("app/code/Magento/README.md", "# Modules\n")?;
    repo.write(
      "lib/internal/Magento/Framework/composer.json",
      r#"{
  "name": "magento/framework",
  "version": "103.0.6",
  "require": {
    "php": "~8.1.0||~8.2.0"
  }
}
"#,
    )?;
    repo.commit("Initial import")?;
    Ok(repo)
  }

  /// A repository whose packages sit at the top level, next to an existing metapackage:
  ///
  /// - `ReCaptchaAdmin` → `magento/module-re-captcha-admin`
  /// - `TwoFactorAuth` → `magento/module-two-factor-auth`
  /// - `_metapackage` → `magento/security-package`
  /// - `.github/workflows/ci.yml`
  pub fn security_package_like() -> Result<Self> {
    let repo = Self::named("mageos-security-package")?;
    repo.write(
      "ReCaptchaAdmin/composer.json",
      r#"{
  "name": "magento/module-re-captcha-admin",
  "type": "magento2-module",
  "require": {
    "magento/framework": "*",
    "magento/module-re-captcha-ui": "1.1.*"
  }
}
"#,
    )?;
    repo.write(
      "TwoFactorAuth/composer.json",
      r#"{
  "name": "magento/module-two-factor-auth",
  "type": "magento2-module",
  "require": {
    "christian-riesen/base32": "^1.3"
  }
}
"#,
    )?;
    repo.write(
      "_metapackage/composer.json",
      r#"{
  "name": "magento/security-package",
  "description": "Magento Security Package",
  "type": "metapackage",
  "version": "1.1.5",
  "require": {
    "magento/module-re-captcha-admin": "1.1.*",
    "magento/module-two-factor-auth": "1.1.*"
  }
}
"#,
    )?;
    repo.write(".github/workflows/ci.yml", "on: push\n")?;
    repo.commit("Initial import")?;
    Ok(repo)
  }

  /// URL the registry clones from
  pub fn url(&self) -> String {
    format!("file://{}", self.path.display())
  }

  /// Write a file (creating parent directories)
  pub fn write(&self, relative: &str, content: &str) -> Result<()> {
    let path = self.path.join(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
  }

  /// Commit everything
  pub fn commit(&self, message: &str) -> Result<String> {
    git(&self.path, &["add", "."])?;
    git(&self.path, &["commit", "-m", message])?;
    let output = git(&self.path, &["rev-parse", "HEAD"])?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  /// Annotated tag created outside of mageos-release
  pub fn foreign_tag(&self, tag: &str, message: &str) -> Result<()> {
    git(&self.path, &["tag", "-a", tag, "-m", message])?;
    Ok(())
  }
}

/// Fresh working-copy cache
pub struct Cache {
  _root: TempDir,
  pub path: PathBuf,
}

impl Cache {
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().join("repositories");
    Ok(Self { _root: root, path })
  }

  pub fn registry(&self) -> RepositoryRegistry {
    RepositoryRegistry::new(&self.path)
  }
}

/// Run git command in a directory
pub fn git(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = Command::new("git")
    .current_dir(cwd)
    .args(args)
    .output()
    .context("Failed to run git command")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!("Git command failed: git {}\n{}", args.join(" "), stderr);
  }

  Ok(output)
}

/// Trimmed stdout of a git command
pub fn git_stdout(cwd: &Path, args: &[&str]) -> Result<String> {
  let output = git(cwd, args)?;
  Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// composer.json of `path` as committed at `rev`
pub fn manifest_at(work_tree: &Path, rev: &str, path: &str) -> Result<serde_json::Value> {
  let content = git_stdout(work_tree, &["show", &format!("{}:{}", rev, path)])?;
  serde_json::from_str(&content).with_context(|| format!("{}:{} is not JSON", rev, path))
}

/// Run the mageos-release binary, failing on a non-zero exit
pub fn run_mageos_release(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = run_mageos_release_raw(cwd, args)?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    anyhow::bail!(
      "mageos-release command failed: mageos-release {}\nstdout: {}\nstderr: {}",
      args.join(" "),
      stdout,
      stderr
    );
  }

  Ok(output)
}

/// Run the mageos-release binary and return whatever it produced
pub fn run_mageos_release_raw(cwd: &Path, args: &[&str]) -> Result<Output> {
  let bin = env!("CARGO_BIN_EXE_mageos-release");
  Command::new(bin)
    .current_dir(cwd)
    .args(args)
    .output()
    .context("Failed to run mageos-release")
}
