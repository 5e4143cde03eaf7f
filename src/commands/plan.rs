use std::env;
use std::path::PathBuf;

use crate::core::config::BuildConfig;
use crate::core::error::{ReleaseResult, ResultExt};
use crate::release::prep::{ReleasePlan, plan};

/// Run the plan command: check out each source ref and list its packages
pub fn run_plan(components: Vec<String>, config: Option<PathBuf>, json: bool) -> ReleaseResult<()> {
  let current_dir = env::current_dir()?;
  let config = BuildConfig::load(config.as_deref(), &current_dir)?;
  let instructions = config.instructions(&components)?;
  let registry = config.registry(&current_dir, config.process.limits());

  let mut plans = Vec::with_capacity(instructions.len());
  for instruction in &instructions {
    let plan = plan(&registry, instruction, &config.release.metapackage_dir)
      .with_context(|| format!("Failed to plan component '{}'", instruction.name))?;
    plans.push(plan);
  }

  if json {
    println!("{}", serde_json::to_string_pretty(&plans)?);
    return Ok(());
  }

  for plan in &plans {
    print_plan(plan);
  }
  Ok(())
}

fn print_plan(plan: &ReleasePlan) {
  println!("\n📦 {} ({} @ {})", plan.component, plan.repo_url, plan.source_ref);
  if plan.packages.is_empty() && plan.meta_packages.is_empty() && plan.community_edition_metapackage.is_none() {
    println!("   no packages configured");
    return;
  }
  for package in &plan.packages {
    println!("   - {} [{}]", package.label, package.dir);
  }
  for package in &plan.meta_packages {
    println!("   - {} [{}] (metapackage)", package.label, package.dir);
  }
  if let Some(path) = &plan.community_edition_metapackage {
    println!("   - community edition metapackage → {}", path.display());
  }
}
