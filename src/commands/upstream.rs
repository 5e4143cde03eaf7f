use std::env;
use std::path::PathBuf;

use crate::core::config::BuildConfig;
use crate::core::error::ReleaseResult;

/// Resolve and print the package versions of an upstream release
pub fn run_upstream_versions(version: String, config: Option<PathBuf>, timeout: Option<u64>, json: bool) -> ReleaseResult<()> {
  let current_dir = env::current_dir()?;
  // The config only contributes process limits here, so it is optional
  let config = match config {
    Some(path) => BuildConfig::load(Some(&path), &current_dir)?,
    None if BuildConfig::find_config_path(&current_dir).is_some() => BuildConfig::load(None, &current_dir)?,
    None => BuildConfig::default(),
  };

  let composer = config.composer(super::limits_with_timeout(&config, timeout));
  let versions = composer.package_version_map(&version)?;

  if json {
    println!("{}", serde_json::to_string_pretty(&versions)?);
  } else {
    let width = versions.keys().map(String::len).max().unwrap_or(0);
    for (name, version) in &versions {
      println!("{:width$}  {}", name, version, width = width);
    }
  }
  Ok(())
}
