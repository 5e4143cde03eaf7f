//! Registry of working copies, one per repository URL
//!
//! The registry owns the cache root. Working copies are cloned on first use,
//! reused afterwards, and never deleted here. All operations are keyed by URL and
//! lazily move the working copy to the requested ref.
//!
//! Operations on one URL must run in sequence: they share the checked-out ref,
//! the index and the current branch. Different URLs own different directories
//! and can be driven from different threads.

use super::RepoFile;
use super::system_git::SystemGit;
use crate::core::error::{GitError, ReleaseResult, ResultExt};
use crate::core::process::ProcessLimits;
use crate::core::security::{validate_branch_is_secure, validate_commit_message_is_secure, validate_ref_is_secure};
use crate::utils::{dir_for_repo_url, trim_dir};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Annotation written on every tag this tool creates
pub const DEFAULT_TAG_MARKER: &str = "Mage-OS Extra Ref";

/// Committer identity configured on working copies without one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitIdentity {
  pub name: String,
  pub email: String,
}

impl Default for GitIdentity {
  fn default() -> Self {
    Self {
      name: "Mage-OS Mirror Repo".to_string(),
      email: "repo@mage-os.org".to_string(),
    }
  }
}

/// Working-copy cache keyed by repository URL
#[derive(Debug, Clone)]
pub struct RepositoryRegistry {
  root: PathBuf,
  limits: ProcessLimits,
  identity: GitIdentity,
  tag_marker: String,
}

impl RepositoryRegistry {
  /// Registry rooted at `root` with default limits, identity and tag marker
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      limits: ProcessLimits::default(),
      identity: GitIdentity::default(),
      tag_marker: DEFAULT_TAG_MARKER.to_string(),
    }
  }

  pub fn with_limits(mut self, limits: ProcessLimits) -> Self {
    self.limits = limits;
    self
  }

  pub fn with_identity(mut self, identity: GitIdentity) -> Self {
    self.identity = identity;
    self
  }

  pub fn with_tag_marker(mut self, marker: impl Into<String>) -> Self {
    self.tag_marker = marker.into();
    self
  }

  /// Cache root
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Marker message identifying tags created by this tool
  pub fn tag_marker(&self) -> &str {
    &self.tag_marker
  }

  /// Working-copy directory for a URL (may not exist yet)
  pub fn path_for(&self, url: &str) -> PathBuf {
    self.root.join(dir_for_repo_url(url))
  }

  /// Clone `url` if needed and make sure `git_ref` is checked out
  ///
  /// The checkout only happens when the current tag, branch and commit id all
  /// differ from `git_ref`, so repeated calls are cheap comparisons.
  pub fn ensure_checked_out(&self, url: &str, git_ref: Option<&str>) -> ReleaseResult<PathBuf> {
    if let Some(git_ref) = git_ref {
      validate_ref_is_secure(git_ref)?;
    }

    let git = self.open_or_clone(url, git_ref)?;

    if let Some(git_ref) = git_ref
      && git.current_tag()? != git_ref
      && git.current_branch()? != git_ref
      && git.current_commit()? != git_ref
    {
      info!(url, git_ref, "checking out");
      git
        .force_checkout(git_ref)
        .with_context(|| format!("Failed to check out {} in {}", git_ref, url))?;
    }

    Ok(git.work_tree().to_path_buf())
  }

  /// Check out `git_ref`, cloning first if needed
  pub fn checkout(&self, url: &str, git_ref: &str) -> ReleaseResult<PathBuf> {
    self.ensure_checked_out(url, Some(git_ref))
  }

  /// Check out `branch`, creating it from HEAD when it does not exist yet
  ///
  /// Landing on an existing branch is allowed so an interrupted run can resume.
  pub fn create_branch(&self, url: &str, branch: &str) -> ReleaseResult<PathBuf> {
    validate_branch_is_secure(branch)?;
    let git = self.open_or_clone(url, None)?;

    if git.local_branch_exists(branch)? {
      info!(url, branch, "checking out branch (already existed)");
      git.force_checkout(branch)?;
    } else {
      info!(url, branch, "checking out branch (creating new branch)");
      git.checkout_new_branch(branch)?;
    }

    Ok(git.work_tree().to_path_buf())
  }

  /// Switch to `switch_to`, then delete `branch`
  ///
  /// Returns `false` without failing when the branch does not exist.
  pub fn delete_branch(&self, url: &str, branch: &str, switch_to: &str, force: bool) -> ReleaseResult<bool> {
    validate_branch_is_secure(branch)?;
    validate_branch_is_secure(switch_to)?;

    self.ensure_checked_out(url, Some(switch_to))?;
    let git = self.open(url)?;

    if !git.local_branch_exists(branch)? {
      warn!(url, branch, "cannot delete branch, it doesn't exist");
      return Ok(false);
    }
    if git.current_branch()? == branch {
      return Err(
        GitError::BranchError {
          message: format!("'{}' is still checked out after switching to '{}'", branch, switch_to),
        }
        .into(),
      );
    }

    git.delete_branch(branch, force)?;
    info!(url, branch, force, "deleted branch");
    Ok(true)
  }

  /// Create an annotated tag `tag` at `git_ref`
  ///
  /// An existing tag is accepted only when its message is the tool's marker;
  /// any other existing tag is a [`GitError::TagConflict`] carrying `details`.
  pub fn create_tag_for_ref(&self, url: &str, git_ref: &str, tag: &str, details: Option<&str>) -> ReleaseResult<()> {
    validate_ref_is_secure(git_ref)?;
    validate_ref_is_secure(tag)?;
    let git = self.open_or_clone(url, None)?;

    match git.tag_message(tag)? {
      None => {
        self.ensure_identity(&git)?;
        git.create_annotated_tag(tag, git_ref, &self.tag_marker)?;
        info!(url, tag, git_ref, "created tag");
        Ok(())
      }
      Some(message) if message.contains(&self.tag_marker) => {
        debug!(url, tag, "tag already exists and is managed by mageos-release");
        Ok(())
      }
      Some(_) => Err(
        GitError::TagConflict {
          tag: tag.to_string(),
          details: details
            .map(str::to_string)
            .unwrap_or_else(|| format!("Tag {} already exists on repo {}", tag, url)),
        }
        .into(),
      ),
    }
  }

  /// Stage a file relative to the working-copy root
  pub fn stage_file(&self, url: &str, relative_path: &Path) -> ReleaseResult<()> {
    self.open(url)?.add(relative_path)
  }

  /// Commit staged changes with the bot identity (if none is configured)
  ///
  /// Returns `false` when nothing is staged, which happens when a previous run
  /// already committed identical manifests.
  pub fn commit(&self, url: &str, message: &str) -> ReleaseResult<bool> {
    validate_commit_message_is_secure(message)?;
    let git = self.open(url)?;

    if !git.has_staged_changes()? {
      warn!(url, "nothing staged, skipping commit");
      return Ok(false);
    }

    self.ensure_identity(&git)?;
    git.commit(message)?;
    Ok(true)
  }

  /// Names of the immediate subdirectories of `dir` at `git_ref`, sorted
  ///
  /// Read from the tree of `git_ref`; empty when `dir` does not exist there.
  pub fn list_package_directories(&self, url: &str, dir: &str, git_ref: &str) -> ReleaseResult<Vec<String>> {
    self.ensure_checked_out(url, Some(git_ref))?;
    let mut names = self
      .open(url)?
      .list_tree_dirs(git_ref, trim_dir(dir))
      .with_context(|| format!("Failed to list {} at {}", dir, git_ref))?;
    names.sort();
    Ok(names)
  }

  /// All files below `dir` at `git_ref`, minus `.git` and the excludes
  ///
  /// An exclude ending in `/` drops everything under that prefix; any other
  /// exclude drops that exact path. Paths are relative to the working-copy root.
  pub fn list_files(&self, url: &str, dir: &str, git_ref: &str, excludes: &[String]) -> ReleaseResult<Vec<RepoFile>> {
    let root = self.ensure_checked_out(url, Some(git_ref))?;
    let base = root.join(trim_dir(dir));
    if !base.exists() {
      return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    collect_files(&root, &base, &mut paths)?;
    paths.sort();

    let mut files = Vec::new();
    for relative in paths {
      let git_path = relative.to_string_lossy().replace('\\', "/");
      let excluded = excludes.iter().filter(|e| !e.is_empty()).any(|exclude| {
        if exclude.ends_with('/') {
          git_path.starts_with(exclude.as_str())
        } else {
          git_path == *exclude
        }
      });
      if excluded {
        continue;
      }

      let full_path = root.join(&relative);
      files.push(RepoFile {
        content: fs::read(&full_path).with_context(|| format!("Failed to read {}", full_path.display()))?,
        is_executable: is_executable(&full_path)?,
        path: relative,
      });
    }
    Ok(files)
  }

  /// Contents of a file at `git_ref`
  pub fn read_file(&self, url: &str, relative_path: &Path, git_ref: &str) -> ReleaseResult<String> {
    let root = self.ensure_checked_out(url, Some(git_ref))?;
    let full_path = root.join(relative_path);
    fs::read_to_string(&full_path).with_context(|| format!("Failed to read {} at {}", full_path.display(), git_ref))
  }

  /// Time of the last commit touching `relative_path` as of `git_ref`
  pub fn last_commit_time_for_file(&self, url: &str, relative_path: &Path, git_ref: &str) -> ReleaseResult<DateTime<Utc>> {
    self.ensure_checked_out(url, Some(git_ref))?;
    let seconds = self.open(url)?.last_commit_timestamp(relative_path)?;
    Utc
      .timestamp_opt(seconds, 0)
      .single()
      .ok_or_else(|| format!("Invalid commit timestamp {} for {}", seconds, relative_path.display()).into())
  }

  /// All tags of the working copy
  pub fn list_tags(&self, url: &str) -> ReleaseResult<Vec<String>> {
    self.open_or_clone(url, None)?.list_tags()
  }

  /// Fast-forward `git_ref` from origin
  pub fn pull(&self, url: &str, git_ref: &str) -> ReleaseResult<()> {
    self.ensure_checked_out(url, Some(git_ref))?;
    self.open(url)?.pull_ff_only(git_ref)
  }

  /// Whether `path` is the top level of its git repository
  pub fn is_dir_top_level(&self, path: &Path) -> ReleaseResult<bool> {
    let git = SystemGit::open(path, self.limits)?;
    let top = git.show_toplevel()?;
    Ok(fs::canonicalize(&top)? == fs::canonicalize(path)?)
  }

  fn open(&self, url: &str) -> ReleaseResult<SystemGit> {
    SystemGit::open(&self.path_for(url), self.limits)
  }

  fn open_or_clone(&self, url: &str, git_ref: Option<&str>) -> ReleaseResult<SystemGit> {
    let dir = self.path_for(url);
    if dir.exists() {
      return SystemGit::open(&dir, self.limits);
    }

    info!(
      url,
      git_ref = git_ref.unwrap_or("all branches"),
      dir = %dir.display(),
      "creating shallow clone"
    );
    SystemGit::clone_shallow(url, &dir, self.limits)
  }

  fn ensure_identity(&self, git: &SystemGit) -> ReleaseResult<()> {
    if !git.has_local_identity()? {
      git.set_identity(&self.identity.name, &self.identity.email)?;
    }
    Ok(())
  }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> ReleaseResult<()> {
  if dir.is_file() {
    out.push(dir.strip_prefix(root).map_err(|e| e.to_string())?.to_path_buf());
    return Ok(());
  }
  for entry in fs::read_dir(dir)? {
    let entry = entry?;
    let path = entry.path();
    if entry.file_name() == ".git" {
      continue;
    }
    if entry.file_type()?.is_dir() {
      collect_files(root, &path, out)?;
    } else {
      out.push(path.strip_prefix(root).map_err(|e| e.to_string())?.to_path_buf());
    }
  }
  Ok(())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> ReleaseResult<bool> {
  use std::os::unix::fs::PermissionsExt;
  Ok(fs::metadata(path)?.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> ReleaseResult<bool> {
  Ok(false)
}
