//! Utility functions for repository URLs and git-facing paths

use std::path::Path;

/// Directory name of the working copy for a repository URL
///
/// Strips a trailing `.git` (any case) and a trailing `/`, then keeps the last
/// path segment: `https://github.com/mage-os/mageos-magento2.git` becomes
/// `mageos-magento2`.
pub fn dir_for_repo_url(url: &str) -> String {
  let mut url = url;
  if let Some(split) = url.len().checked_sub(4)
    && url.get(split..).is_some_and(|tail| tail.eq_ignore_ascii_case(".git"))
  {
    url = &url[..split];
  }
  let url = url.strip_suffix('/').unwrap_or(url);
  match url.rfind('/') {
    Some(pos) => url[pos + 1..].to_string(),
    None => url.to_string(),
  }
}

/// Remove one trailing `/` from a directory string
pub fn trim_dir(dir: &str) -> &str {
  dir.strip_suffix('/').unwrap_or(dir)
}

/// Convert a path to Git format (always forward slashes)
pub fn path_to_git_format(path: &Path) -> String {
  #[cfg(target_os = "windows")]
  {
    path.to_string_lossy().replace('\\', "/")
  }
  #[cfg(not(target_os = "windows"))]
  {
    path.to_string_lossy().to_string()
  }
}
