use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::composer::rules::{ReleaseRules, ReplaceVersionMap};
use crate::composer::version::validate_version_string;
use crate::core::config::BuildConfig;
use crate::core::error::{ReleaseError, ReleaseResult, ResultExt, print_error};
use crate::release::prep::{PrepOutcome, ReleasePrep};
use serde_json::json;

/// Arguments of `mageos-release prep`
#[derive(Debug, Clone, Default)]
pub struct PrepArgs {
  pub version: String,
  pub components: Vec<String>,
  pub config: Option<PathBuf>,
  pub replace_versions: Option<PathBuf>,
  pub upstream_release: Option<String>,
  pub parallel: bool,
  pub timeout: Option<u64>,
  pub json: bool,
}

/// Run the prep command
pub fn run_prep(args: PrepArgs) -> ReleaseResult<()> {
  let current_dir = env::current_dir()?;
  let config = BuildConfig::load(args.config.as_deref(), &current_dir)?;
  let limits = super::limits_with_timeout(&config, args.timeout);

  // Everything that can be rejected is checked before the first clone
  let rules = release_rules(&config, &args)?;
  let instructions = config.instructions(&args.components)?;

  let registry = config.registry(&current_dir, limits);
  let prep = ReleasePrep::new(&registry, rules)
    .with_commit_message(config.commit_message(&args.version))
    .with_metapackage_dir(config.release.metapackage_dir.clone())
    .with_progress(!args.json && !args.parallel);

  if !args.json {
    println!(
      "Prepping release {} for {} repositor{}",
      args.version,
      instructions.len(),
      if instructions.len() == 1 { "y" } else { "ies" }
    );
  }

  let results = prep.prep_all(&instructions, args.parallel);

  if args.json {
    let report = results
      .iter()
      .zip(&instructions)
      .map(|(result, instruction)| match result {
        Ok(outcome) => serde_json::to_value(outcome),
        Err(e) => Ok(json!({
          "component": instruction.name,
          "repo_url": instruction.repo_url,
          "error": e.to_string(),
        })),
      })
      .collect::<Result<Vec<_>, _>>()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
  } else {
    println!();
    for (result, instruction) in results.iter().zip(&instructions) {
      match result {
        Ok(outcome) => println!("✅ {}", describe_outcome(outcome)),
        Err(_) => println!("❌ {}: failed", instruction.name),
      }
    }
  }

  let total = results.len();
  let mut errors = results.into_iter().filter_map(Result::err);
  let Some(first) = errors.next() else {
    return Ok(());
  };
  let rest: Vec<ReleaseError> = errors.collect();
  for error in &rest {
    print_error(error);
  }
  Err(first.context(format!("{} of {} repositories failed", rest.len() + 1, total)))
}

fn describe_outcome(outcome: &PrepOutcome) -> String {
  format!(
    "{}: tagged {} ({} package{}{})",
    outcome.component,
    outcome.release_version,
    outcome.packages.len(),
    if outcome.packages.len() == 1 { "" } else { "s" },
    if outcome.committed { "" } else { ", already committed" }
  )
}

/// Rules for the run; the version is checked before any replace source is read or composer runs
fn release_rules(config: &BuildConfig, args: &PrepArgs) -> ReleaseResult<ReleaseRules> {
  validate_version_string(&args.version, "Release version")?;
  let replace = build_replace_map(config, args)?;
  ReleaseRules::new(&args.version, config.vendor_rename(), replace)
}

/// Config map, then the `--replace-versions` file, then the upstream release; later sources win
fn build_replace_map(config: &BuildConfig, args: &PrepArgs) -> ReleaseResult<ReplaceVersionMap> {
  let mut replace = config.replace_versions.clone();

  if let Some(path) = &args.replace_versions {
    replace.extend(load_replace_versions(path)?);
  }

  if let Some(upstream) = &args.upstream_release {
    let limits = super::limits_with_timeout(config, args.timeout);
    let composer = config.composer(limits);
    let upstream_versions = composer
      .package_version_map(upstream)
      .map_err(ReleaseError::from)
      .with_context(|| format!("Failed to resolve upstream release {}", upstream))?;
    replace.extend(upstream_versions);
  }

  Ok(replace)
}

/// Read a `{"package": "constraint"}` JSON file
pub fn load_replace_versions(path: &Path) -> ReleaseResult<ReplaceVersionMap> {
  let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
  serde_json::from_str(&content).with_context(|| format!("{} is not a JSON object of package versions", path.display()))
}
