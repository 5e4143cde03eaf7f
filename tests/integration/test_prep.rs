//! End-to-end release prep against throwaway repositories

use crate::helpers::{Cache, UpstreamRepo, git, git_stdout, manifest_at};
use anyhow::Result;
use mageos_release::composer::manifest::DependencySection;
use mageos_release::composer::rewrite::RewriteRule;
use mageos_release::composer::rules::{ReleaseRules, ReplaceVersionMap, VendorRename};
use mageos_release::core::config::{BuildInstruction, PackageDirGroup, PackageIndividual};
use mageos_release::core::error::{GitError, ReleaseError, ValidationError};
use mageos_release::release::prep::{ReleasePrep, RepoState, plan, work_branch_name};

fn instruction(repo: &UpstreamRepo) -> BuildInstruction {
  let mut instruction = BuildInstruction::new("magento2", repo.url(), "main");
  instruction.package_dirs.push(PackageDirGroup {
    label: "Magento Base Modules".to_string(),
    dir: "app/code/Magento".to_string(),
    excludes: vec!["ModuleB/".to_string()],
  });
  instruction
}

fn rules(version: &str, replace: &[(&str, &str)]) -> ReleaseRules {
  let replace: ReplaceVersionMap = replace.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
  ReleaseRules::new(version, VendorRename::default(), replace).unwrap()
}

#[test]
fn test_prep_release_end_to_end() -> Result<()> {
  let repo = UpstreamRepo::magento_like()?;
  let cache = Cache::new()?;
  let registry = cache.registry();
  let source_head = git_stdout(&repo.path, &["rev-parse", "HEAD"])?;

  let prep = ReleasePrep::new(&registry, rules("2.4.6", &[("magento/module-a", "<2.4.6")]));
  let outcome = prep.prep_release(&instruction(&repo))?;

  assert_eq!(outcome.state, RepoState::WorkBranchDeleted);
  assert!(outcome.committed);
  assert_eq!(outcome.packages.len(), 1);
  assert_eq!(outcome.packages[0].label, "magento/module-a (part of Magento Base Modules)");
  assert_eq!(outcome.packages[0].name, "mage-os/module-a");

  let work_tree = registry.path_for(&repo.url());

  // Back on the source ref, work branch gone, tag present
  assert_eq!(git_stdout(&work_tree, &["branch", "--show-current"])?, "main");
  assert_eq!(git_stdout(&work_tree, &["rev-parse", "HEAD"])?, source_head);
  assert!(git_stdout(&work_tree, &["branch", "--list", &work_branch_name("2.4.6")])?.is_empty());
  assert_eq!(git_stdout(&work_tree, &["tag", "--list", "2.4.6"])?, "2.4.6");
  assert_eq!(
    git_stdout(&work_tree, &["log", "-1", "--pretty=%s", "2.4.6"])?,
    "Release 2.4.6"
  );

  // ModuleA rewritten at the tag
  let module_a = manifest_at(&work_tree, "2.4.6", "app/code/Magento/ModuleA/composer.json")?;
  assert_eq!(module_a["name"], "mage-os/module-a");
  assert_eq!(module_a["version"], "2.4.6");
  assert_eq!(module_a["replace"]["magento/module-a"], "<2.4.6");
  assert_eq!(module_a["require"]["mage-os/framework"], "2.4.6");
  assert_eq!(module_a["require"]["php"], "~8.1.0||~8.2.0");
  assert_eq!(module_a["suggest"]["mage-os/module-a-sample-data"], "Sample Data version: 2.4.6");
  assert!(module_a["require"].get("magento/framework").is_none());

  // Key order of the original manifest survives
  let keys: Vec<_> = module_a.as_object().unwrap().keys().cloned().collect();
  assert_eq!(keys, ["name", "description", "type", "require", "suggest", "version", "replace"]);

  // ModuleB excluded: untouched at the tag
  let module_b = manifest_at(&work_tree, "2.4.6", "app/code/Magento/ModuleB/composer.json")?;
  assert_eq!(module_b["name"], "magento/module-b");
  assert_eq!(module_b["require"]["magento/module-a"], "*");

  Ok(())
}

#[test]
fn test_missing_manifest_fails_before_commit() -> Result<()> {
  let repo = UpstreamRepo::magento_like()?;
  repo.write("app/code/Magento/ModuleC/registration.php", "<?php\n")?;
  repo.commit("Add ModuleC without composer.json")?;

  let cache = Cache::new()?;
  let registry = cache.registry();
  let prep = ReleasePrep::new(&registry, rules("2.4.6", &[]));

  let err = prep.prep_release(&instruction(&repo)).unwrap_err();
  assert!(matches!(
    err.root_cause(),
    ReleaseError::Validation(ValidationError::MissingManifest { .. })
  ));
  assert!(err.to_string().contains("stopped after state: on work branch"), "{}", err);
  assert!(err.to_string().contains("ModuleC doesn't contain a composer.json"), "{}", err);

  let work_tree = registry.path_for(&repo.url());
  let work_branch = work_branch_name("2.4.6");
  assert_eq!(
    git_stdout(&work_tree, &["rev-parse", &work_branch])?,
    git_stdout(&work_tree, &["rev-parse", "main"])?,
    "no commit may be made on the work branch"
  );
  assert!(git_stdout(&work_tree, &["tag", "--list"])?.is_empty());
  assert!(git_stdout(&work_tree, &["diff", "--cached", "--name-only"])?.is_empty());

  Ok(())
}

#[test]
fn test_rerun_of_finished_release_succeeds() -> Result<()> {
  let repo = UpstreamRepo::magento_like()?;
  let cache = Cache::new()?;
  let registry = cache.registry();
  let prep = ReleasePrep::new(&registry, rules("2.4.6", &[]));

  prep.prep_release(&instruction(&repo))?;
  let work_tree = registry.path_for(&repo.url());
  let tagged = git_stdout(&work_tree, &["rev-parse", "2.4.6^{commit}"])?;

  let second = prep.prep_release(&instruction(&repo))?;
  assert_eq!(second.state, RepoState::WorkBranchDeleted);
  assert_eq!(git_stdout(&work_tree, &["rev-parse", "2.4.6^{commit}"])?, tagged);
  assert_eq!(git_stdout(&work_tree, &["branch", "--show-current"])?, "main");

  Ok(())
}

#[test]
fn test_foreign_tag_conflicts_and_run_resumes_after_removal() -> Result<()> {
  let repo = UpstreamRepo::magento_like()?;
  repo.foreign_tag("2.4.6", "Upstream release 2.4.6")?;

  let cache = Cache::new()?;
  let registry = cache.registry();
  let prep = ReleasePrep::new(&registry, rules("2.4.6", &[]));

  let err = prep.prep_release(&instruction(&repo)).unwrap_err();
  assert!(matches!(err.root_cause(), ReleaseError::Git(GitError::TagConflict { .. })));
  assert!(err.to_string().contains("stopped after state: committed"), "{}", err);
  assert_eq!(err.exit_code().as_i32(), 3);

  // The committed work branch survives; remove the foreign tag and resume
  let work_tree = registry.path_for(&repo.url());
  let work_branch = work_branch_name("2.4.6");
  let committed = git_stdout(&work_tree, &["rev-parse", &work_branch])?;
  git(&work_tree, &["tag", "-d", "2.4.6"])?;

  let outcome = prep.prep_release(&instruction(&repo))?;
  assert_eq!(outcome.state, RepoState::WorkBranchDeleted);
  assert!(!outcome.committed, "manifests were already committed by the first run");
  assert_eq!(git_stdout(&work_tree, &["rev-parse", "2.4.6^{commit}"])?, committed);

  Ok(())
}

#[test]
fn test_individual_packages_and_custom_rules() -> Result<()> {
  let repo = UpstreamRepo::magento_like()?;
  let cache = Cache::new()?;
  let registry = cache.registry();

  let mut instruction = instruction(&repo);
  instruction.package_individual.push(PackageIndividual {
    label: "Magento Framework".to_string(),
    dir: "lib/internal/Magento/Framework".to_string(),
  });
  instruction.transform.insert(
    "magento/module-a".to_string(),
    vec![RewriteRule::DropDependency {
      section: DependencySection::Require,
      package: "elasticsearch/elasticsearch".to_string(),
      when_present: None,
    }],
  );

  let prep = ReleasePrep::new(&registry, rules("1.0.0", &[])).with_commit_message("Mage-OS Release 1.0.0");
  let outcome = prep.prep_release(&instruction)?;

  let labels: Vec<_> = outcome.packages.iter().map(|p| p.label.as_str()).collect();
  assert_eq!(labels, ["magento/module-a (part of Magento Base Modules)", "Magento Framework"]);

  let work_tree = registry.path_for(&repo.url());
  assert_eq!(git_stdout(&work_tree, &["log", "-1", "--pretty=%s", "1.0.0"])?, "Mage-OS Release 1.0.0");

  let module_a = manifest_at(&work_tree, "1.0.0", "app/code/Magento/ModuleA/composer.json")?;
  assert!(module_a["require"].get("elasticsearch/elasticsearch").is_none());

  let framework = manifest_at(&work_tree, "1.0.0", "lib/internal/Magento/Framework/composer.json")?;
  assert_eq!(framework["name"], "mage-os/framework");
  assert_eq!(framework["version"], "1.0.0");

  Ok(())
}

#[test]
fn test_community_edition_metapackage() -> Result<()> {
  let repo = UpstreamRepo::magento_like()?;
  let cache = Cache::new()?;
  let registry = cache.registry();

  let mut instruction = instruction(&repo);
  instruction.magento_community_edition_metapackage = true;

  let prep = ReleasePrep::new(&registry, rules("1.0.0", &[("magento/product-community-edition", "2.4.6")]));
  let outcome = prep.prep_release(&instruction)?;
  assert_eq!(outcome.packages.len(), 2);

  let work_tree = registry.path_for(&repo.url());
  let meta = manifest_at(&work_tree, "1.0.0", "_metapackage/composer.json")?;
  assert_eq!(meta["name"], "mage-os/product-community-edition");
  assert_eq!(meta["type"], "metapackage");
  assert_eq!(meta["version"], "1.0.0");
  assert_eq!(meta["require"]["mage-os/module-a"], "1.0.0");
  assert_eq!(meta["require"]["symfony/console"], "~5.4.11");
  assert_eq!(meta["replace"]["magento/product-community-edition"], "2.4.6");
  assert!(meta.get("autoload").is_none());

  Ok(())
}

#[test]
fn test_prep_all_isolates_failures() -> Result<()> {
  let broken = UpstreamRepo::magento_like_named("broken")?;
  broken.write("app/code/Magento/ModuleC/registration.php", "<?php\n")?;
  broken.commit("Add ModuleC without composer.json")?;
  let healthy = UpstreamRepo::magento_like_named("healthy")?;

  let cache = Cache::new()?;
  let registry = cache.registry();
  let prep = ReleasePrep::new(&registry, rules("2.4.6", &[]));

  let mut first = instruction(&broken);
  first.name = "broken".to_string();
  let mut second = instruction(&healthy);
  second.name = "healthy".to_string();

  for parallel in [false, true] {
    let results = prep.prep_all(&[first.clone(), second.clone()], parallel);
    assert_eq!(results.len(), 2);
    assert!(results[0].is_err(), "parallel={}", parallel);
    let outcome = results[1].as_ref().expect("healthy repository must succeed");
    assert_eq!(outcome.component, "healthy");
    assert_eq!(outcome.state, RepoState::WorkBranchDeleted);
  }

  Ok(())
}

#[test]
fn test_plan_does_not_touch_branches() -> Result<()> {
  let repo = UpstreamRepo::magento_like()?;
  let cache = Cache::new()?;
  let registry = cache.registry();

  let mut instruction = instruction(&repo);
  instruction.magento_community_edition_metapackage = true;
  let plan = plan(&registry, &instruction, "_metapackage")?;

  assert_eq!(plan.packages.len(), 1);
  assert_eq!(plan.packages[0].dir, "app/code/Magento/ModuleA");
  assert_eq!(
    plan.community_edition_metapackage.as_deref(),
    Some(std::path::Path::new("_metapackage/composer.json"))
  );

  let work_tree = registry.path_for(&repo.url());
  assert_eq!(git_stdout(&work_tree, &["branch", "--list", "--format=%(refname:short)"])?, "main");
  assert!(git_stdout(&work_tree, &["tag", "--list"])?.is_empty());

  Ok(())
}

fn security_package_instruction(repo: &UpstreamRepo) -> BuildInstruction {
  let mut instruction = BuildInstruction::new("security-package", repo.url(), "main");
  instruction.package_dirs.push(PackageDirGroup {
    label: "Security Package".to_string(),
    dir: String::new(),
    excludes: vec![".github/".to_string(), "_metapackage/".to_string()],
  });
  instruction.package_meta_from_dirs.push(PackageIndividual {
    label: "Security Package Metapackage".to_string(),
    dir: "_metapackage".to_string(),
  });
  instruction
}

#[test]
fn test_root_level_group_with_existing_metapackage() -> Result<()> {
  let repo = UpstreamRepo::security_package_like()?;
  let cache = Cache::new()?;
  let registry = cache.registry();

  // Leftovers in the working copy are not repository content
  let work_tree = registry.ensure_checked_out(&repo.url(), Some("main"))?;
  std::fs::create_dir_all(work_tree.join("Leftover"))?;
  std::fs::write(work_tree.join("Leftover/notes.txt"), "scratch\n")?;

  let prep = ReleasePrep::new(&registry, rules("1.0.0", &[("magento/security-package", "1.1.5")]));
  let outcome = prep.prep_release(&security_package_instruction(&repo))?;

  let labels: Vec<_> = outcome.packages.iter().map(|p| p.label.as_str()).collect();
  assert_eq!(
    labels,
    [
      "magento/module-re-captcha-admin (part of Security Package)",
      "magento/module-two-factor-auth (part of Security Package)",
      "Security Package Metapackage",
    ]
  );

  let meta = manifest_at(&work_tree, "1.0.0", "_metapackage/composer.json")?;
  assert_eq!(meta["name"], "mage-os/security-package");
  assert_eq!(meta["type"], "metapackage");
  assert_eq!(meta["version"], "1.0.0");
  assert_eq!(meta["require"]["mage-os/module-re-captcha-admin"], "1.0.0");
  assert_eq!(meta["require"]["mage-os/module-two-factor-auth"], "1.0.0");
  assert_eq!(meta["replace"]["magento/security-package"], "1.1.5");

  let admin = manifest_at(&work_tree, "1.0.0", "ReCaptchaAdmin/composer.json")?;
  assert_eq!(admin["name"], "mage-os/module-re-captcha-admin");
  assert_eq!(admin["require"]["mage-os/module-re-captcha-ui"], "1.0.0");

  let two_factor = manifest_at(&work_tree, "1.0.0", "TwoFactorAuth/composer.json")?;
  assert_eq!(two_factor["require"]["christian-riesen/base32"], "^1.3");

  Ok(())
}

#[test]
fn test_metapackage_dir_without_manifest_fails() -> Result<()> {
  let repo = UpstreamRepo::security_package_like()?;
  let cache = Cache::new()?;
  let registry = cache.registry();

  let mut instruction = security_package_instruction(&repo);
  instruction.package_meta_from_dirs[0].dir = "Missing".to_string();

  let prep = ReleasePrep::new(&registry, rules("1.0.0", &[]));
  let err = prep.prep_release(&instruction).unwrap_err();
  assert!(matches!(
    err.root_cause(),
    ReleaseError::Validation(ValidationError::MissingManifest { .. })
  ));
  assert!(err.to_string().contains("Missing doesn't contain a composer.json"), "{}", err);

  let work_tree = registry.path_for(&repo.url());
  assert!(git_stdout(&work_tree, &["tag", "--list"])?.is_empty());
  assert!(git_stdout(&work_tree, &["diff", "--cached", "--name-only"])?.is_empty());

  Ok(())
}

#[test]
fn test_parallel_runs_serialize_urls_sharing_a_working_copy() -> Result<()> {
  let repo = UpstreamRepo::magento_like()?;
  let cache = Cache::new()?;
  let registry = cache.registry();

  let mut first = instruction(&repo);
  first.name = "first".to_string();
  let mut second = instruction(&repo);
  second.name = "second".to_string();
  second.repo_url = format!("{}/", repo.url());
  assert_eq!(registry.path_for(&first.repo_url), registry.path_for(&second.repo_url));

  let prep = ReleasePrep::new(&registry, rules("2.4.6", &[]));
  let results = prep.prep_all(&[first, second], true);

  for result in &results {
    let outcome = result.as_ref().expect("both runs share one working copy in sequence");
    assert_eq!(outcome.state, RepoState::WorkBranchDeleted);
  }

  let work_tree = registry.path_for(&repo.url());
  assert_eq!(git_stdout(&work_tree, &["tag", "--list"])?, "2.4.6");
  assert_eq!(git_stdout(&work_tree, &["branch", "--show-current"])?, "main");
  assert!(git_stdout(&work_tree, &["branch", "--list", &work_branch_name("2.4.6")])?.is_empty());

  Ok(())
}
