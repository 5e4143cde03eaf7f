//! System git backend for one working copy
//!
//! Every call is a plain argument vector handed to the `git` binary: no shell,
//! isolated environment, bounded output. Values that originate from config or
//! CLI input are validated one level up, in the registry.

use crate::core::error::{GitError, ReleaseResult, ResultExt};
use crate::core::process::{ProcessLimits, StderrPolicy, run_tool};
use crate::utils::path_to_git_format;
use std::path::{Path, PathBuf};
use std::process::Command;

/// How many commits a fresh clone fetches
///
/// Enough history to resolve recent tags, branches and commit ids.
pub const CLONE_DEPTH: u32 = 15;

/// stderr lines git prints on success that carry no failure signal
const GIT_INFORMATIONAL: &[&str] = &["hint:", "warning: in the working copy of", "warning: redirecting to"];

const GIT_STDERR: StderrPolicy = StderrPolicy::Strict(GIT_INFORMATIONAL);

/// Git backend using the system git binary
pub struct SystemGit {
  /// Working tree root
  pub(crate) work_tree: PathBuf,

  limits: ProcessLimits,
}

impl SystemGit {
  /// Open an existing working copy
  pub fn open(path: &Path, limits: ProcessLimits) -> ReleaseResult<Self> {
    if !path.join(".git").exists() {
      return Err(
        GitError::RepoNotFound {
          path: path.to_path_buf(),
        }
        .into(),
      );
    }
    Ok(Self {
      work_tree: path.to_path_buf(),
      limits,
    })
  }

  /// Shallow clone `url` into `dir` with all branches
  pub fn clone_shallow(url: &str, dir: &Path, limits: ProcessLimits) -> ReleaseResult<Self> {
    if let Some(parent) = dir.parent() {
      std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut cmd = isolated_git();
    cmd
      .arg("clone")
      .arg(format!("--depth={}", CLONE_DEPTH))
      .args(["--quiet", "--no-single-branch", "--", url])
      .arg(dir);
    run_tool(cmd, &limits, GIT_STDERR).with_context(|| format!("Failed to clone {}", url))?;

    Self::open(dir, limits)
  }

  /// Working tree root
  pub fn work_tree(&self) -> &Path {
    &self.work_tree
  }

  /// Nearest tag description, falling back to the abbreviated commit
  pub fn current_tag(&self) -> ReleaseResult<String> {
    Ok(self.run(&["describe", "--tags", "--always"])?.trim().to_string())
  }

  /// Checked-out branch name, empty when HEAD is detached
  pub fn current_branch(&self) -> ReleaseResult<String> {
    Ok(self.run(&["branch", "--show-current"])?.trim().to_string())
  }

  /// Full SHA of HEAD
  pub fn current_commit(&self) -> ReleaseResult<String> {
    Ok(self.run(&["log", "-1", "--pretty=%H"])?.trim().to_string())
  }

  /// Force checkout of a ref, discarding local modifications
  pub fn force_checkout(&self, git_ref: &str) -> ReleaseResult<()> {
    self.run(&["checkout", "--force", "--quiet", git_ref])?;
    Ok(())
  }

  /// Create a branch at HEAD and check it out
  pub fn checkout_new_branch(&self, branch: &str) -> ReleaseResult<()> {
    self.run(&["checkout", "--force", "--quiet", "-b", branch])?;
    Ok(())
  }

  /// Whether a local branch of that exact name exists
  pub fn local_branch_exists(&self, branch: &str) -> ReleaseResult<bool> {
    let out = self.run(&["branch", "--list", branch])?;
    Ok(
      out
        .lines()
        .map(|line| line.trim_start_matches(['*', '+', ' ']).trim())
        .any(|name| name == branch),
    )
  }

  /// Delete a local branch; `force` also drops unmerged work
  pub fn delete_branch(&self, branch: &str, force: bool) -> ReleaseResult<()> {
    let flag = if force { "-D" } else { "-d" };
    self.run(&["branch", flag, branch])?;
    Ok(())
  }

  /// Annotation (or commit message, for lightweight tags) of an existing tag
  pub fn tag_message(&self, tag: &str) -> ReleaseResult<Option<String>> {
    let refname = format!("refs/tags/{}", tag);
    let out = self.run(&["for-each-ref", "--format=%(refname)%00%(contents)", &refname])?;
    Ok(
      out
        .split_once('\0')
        .filter(|(name, _)| name.trim() == refname)
        .map(|(_, contents)| contents.trim().to_string()),
    )
  }

  /// Create an annotated tag pointing at `target`
  pub fn create_annotated_tag(&self, tag: &str, target: &str, message: &str) -> ReleaseResult<()> {
    self.run(&["tag", "-a", tag, target, "-m", message])?;
    Ok(())
  }

  /// Names of the directories directly below `dir` in the tree of `git_ref`
  ///
  /// Reads the committed tree, so `.git` and untracked directories never show up.
  /// Empty when `dir` is not in that tree.
  pub fn list_tree_dirs(&self, git_ref: &str, dir: &str) -> ReleaseResult<Vec<String>> {
    let prefix = if dir.is_empty() { String::new() } else { format!("{}/", dir) };
    let mut args = vec!["ls-tree", "-d", "--name-only", git_ref];
    if !prefix.is_empty() {
      args.extend(["--", prefix.as_str()]);
    }
    let out = self.run(&args)?;
    Ok(
      out
        .lines()
        .filter_map(|line| line.strip_prefix(prefix.as_str()))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect(),
    )
  }

  /// All tag names
  pub fn list_tags(&self) -> ReleaseResult<Vec<String>> {
    Ok(
      self
        .run(&["tag", "--list"])?
        .lines()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect(),
    )
  }

  /// Whether user.name is configured in this working copy's own config
  pub fn has_local_identity(&self) -> ReleaseResult<bool> {
    let name = self.run(&["config", "--local", "--default", "", "--get", "user.name"])?;
    Ok(!name.trim().is_empty())
  }

  /// Set the committer identity for this working copy
  pub fn set_identity(&self, name: &str, email: &str) -> ReleaseResult<()> {
    self.run(&["config", "--local", "user.name", name])?;
    self.run(&["config", "--local", "user.email", email])?;
    Ok(())
  }

  /// Stage a path relative to the working tree
  pub fn add(&self, path: &Path) -> ReleaseResult<()> {
    let path = path_to_git_format(path);
    self.run(&["add", "--", &path])?;
    Ok(())
  }

  /// Whether the index differs from HEAD
  pub fn has_staged_changes(&self) -> ReleaseResult<bool> {
    Ok(!self.run(&["diff", "--cached", "--name-only"])?.trim().is_empty())
  }

  /// Commit the index
  pub fn commit(&self, message: &str) -> ReleaseResult<()> {
    self.run(&["commit", "--quiet", "-m", message])?;
    Ok(())
  }

  /// Fast-forward the current branch from origin
  pub fn pull_ff_only(&self, git_ref: &str) -> ReleaseResult<()> {
    self.run(&["pull", "--ff-only", "--quiet", "origin", git_ref])?;
    Ok(())
  }

  /// Unix timestamp of the last commit touching `path`
  pub fn last_commit_timestamp(&self, path: &Path) -> ReleaseResult<i64> {
    let path = path_to_git_format(path);
    let out = self.run(&["log", "-1", "--pretty=format:%at", "--", &path])?;
    Ok(out.trim().parse::<i64>()?)
  }

  /// Absolute path of the top level of the repository containing the work tree
  pub fn show_toplevel(&self) -> ReleaseResult<PathBuf> {
    Ok(PathBuf::from(self.run(&["rev-parse", "--show-toplevel"])?.trim()))
  }

  fn run(&self, args: &[&str]) -> ReleaseResult<String> {
    let mut cmd = self.git_cmd();
    cmd.args(args);
    run_tool(cmd, &self.limits, GIT_STDERR)
  }

  /// Create a git command bound to this working copy
  pub(crate) fn git_cmd(&self) -> Command {
    let mut cmd = isolated_git();
    cmd.arg("-C").arg(&self.work_tree);
    cmd
  }
}

/// Create a safe git command with isolated environment
///
/// - Clears environment variables
/// - Whitelists only PATH and HOME
/// - Adds safe configuration overrides
fn isolated_git() -> Command {
  let mut cmd = Command::new("git");

  cmd.env_clear();
  if let Ok(path) = std::env::var("PATH") {
    cmd.env("PATH", path);
  }
  if let Ok(home) = std::env::var("HOME") {
    cmd.env("HOME", home);
  }

  cmd.arg("-c").arg("advice.detachedHead=false");
  cmd.arg("-c").arg("core.quotePath=false");
  cmd.arg("-c").arg("init.defaultBranch=main");

  cmd
}
