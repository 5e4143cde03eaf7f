use crate::composer::package_manager::{Composer, DEFAULT_REPOSITORY_URL};
use crate::composer::rewrite::RewriteRule;
use crate::composer::rules::{ReplaceVersionMap, VendorRename};
use crate::core::error::{ConfigError, ReleaseError, ReleaseResult, ResultExt};
use crate::core::process::{DEFAULT_MAX_OUTPUT_BYTES, ProcessLimits};
use crate::core::security::{validate_commit_message_is_secure, validate_ref_is_secure};
use crate::core::vcs::registry::{DEFAULT_TAG_MARKER, GitIdentity, RepositoryRegistry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Build configuration for mageos-release
/// Searched in order: release.toml, .release.toml, .config/release.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
  #[serde(default)]
  pub release: ReleaseSettings,
  #[serde(default)]
  pub identity: GitIdentity,
  #[serde(default)]
  pub process: ProcessSettings,
  /// Static replace map, merged under `--replace-versions` and `--upstream-release`
  #[serde(default)]
  pub replace_versions: ReplaceVersionMap,
  /// Base layout per component name
  #[serde(default)]
  pub packages: BTreeMap<String, ComponentEntry>,
  /// Components to release, in order; keys here win over `packages`
  #[serde(default)]
  pub components: Vec<ComponentEntry>,
}

/// Release-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseSettings {
  /// Working-copy root (default: "repositories")
  #[serde(default = "default_cache_dir")]
  pub cache_dir: PathBuf,

  #[serde(default = "default_vendor_from")]
  pub vendor_from: String,

  #[serde(default = "default_vendor_to")]
  pub vendor_to: String,

  /// Annotation identifying tags owned by this tool
  #[serde(default = "default_tag_marker")]
  pub tag_marker: String,

  /// `{version}` is replaced with the release version
  #[serde(default = "default_commit_message")]
  pub commit_message: String,

  /// Where the community edition metapackage is written, relative to the repo root
  #[serde(default = "default_metapackage_dir")]
  pub metapackage_dir: String,

  /// Composer repository used to resolve upstream release versions
  #[serde(default = "default_upstream_repository_url")]
  pub upstream_repository_url: String,
}

fn default_cache_dir() -> PathBuf {
  PathBuf::from("repositories")
}

fn default_vendor_from() -> String {
  VendorRename::default().from
}

fn default_vendor_to() -> String {
  VendorRename::default().to
}

fn default_tag_marker() -> String {
  DEFAULT_TAG_MARKER.to_string()
}

fn default_commit_message() -> String {
  "Release {version}".to_string()
}

fn default_metapackage_dir() -> String {
  "_metapackage".to_string()
}

fn default_upstream_repository_url() -> String {
  DEFAULT_REPOSITORY_URL.to_string()
}

impl Default for ReleaseSettings {
  fn default() -> Self {
    Self {
      cache_dir: default_cache_dir(),
      vendor_from: default_vendor_from(),
      vendor_to: default_vendor_to(),
      tag_marker: default_tag_marker(),
      commit_message: default_commit_message(),
      metapackage_dir: default_metapackage_dir(),
      upstream_repository_url: default_upstream_repository_url(),
    }
  }
}

/// External process limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSettings {
  #[serde(default = "default_max_output_bytes")]
  pub max_output_bytes: usize,
  #[serde(default)]
  pub timeout_secs: Option<u64>,
}

fn default_max_output_bytes() -> usize {
  DEFAULT_MAX_OUTPUT_BYTES
}

impl Default for ProcessSettings {
  fn default() -> Self {
    Self {
      max_output_bytes: default_max_output_bytes(),
      timeout_secs: None,
    }
  }
}

impl ProcessSettings {
  pub fn limits(&self) -> ProcessLimits {
    ProcessLimits {
      max_output_bytes: self.max_output_bytes,
      timeout: self.timeout_secs.map(Duration::from_secs),
    }
  }
}

/// A scanned directory whose immediate children are packages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDirGroup {
  pub label: String,
  pub dir: String,
  /// Children to skip, written with a trailing slash (`ModuleB/`)
  #[serde(default)]
  pub excludes: Vec<String>,
}

/// A single package directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIndividual {
  pub label: String,
  pub dir: String,
}

/// Component layout as written in the config; every key is optional so that
/// base entries and overrides can be merged key by key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentEntry {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub repo_url: Option<String>,
  #[serde(default, rename = "ref")]
  pub git_ref: Option<String>,
  #[serde(default)]
  pub transform: Option<BTreeMap<String, Vec<RewriteRule>>>,
  #[serde(default)]
  pub package_dirs: Option<Vec<PackageDirGroup>>,
  #[serde(default)]
  pub package_individual: Option<Vec<PackageIndividual>>,
  #[serde(default)]
  pub package_meta_from_dirs: Option<Vec<PackageIndividual>>,
  #[serde(default)]
  pub magento_community_edition_metapackage: Option<bool>,
}

impl ComponentEntry {
  /// Per-key merge, `over` wins where it sets a key
  pub fn merged(&self, over: &ComponentEntry) -> ComponentEntry {
    ComponentEntry {
      name: over.name.clone().or_else(|| self.name.clone()),
      repo_url: over.repo_url.clone().or_else(|| self.repo_url.clone()),
      git_ref: over.git_ref.clone().or_else(|| self.git_ref.clone()),
      transform: over.transform.clone().or_else(|| self.transform.clone()),
      package_dirs: over.package_dirs.clone().or_else(|| self.package_dirs.clone()),
      package_individual: over
        .package_individual
        .clone()
        .or_else(|| self.package_individual.clone()),
      package_meta_from_dirs: over
        .package_meta_from_dirs
        .clone()
        .or_else(|| self.package_meta_from_dirs.clone()),
      magento_community_edition_metapackage: over
        .magento_community_edition_metapackage
        .or(self.magento_community_edition_metapackage),
    }
  }
}

/// Everything the orchestrator needs to release one repository
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildInstruction {
  pub name: String,
  pub repo_url: String,
  #[serde(rename = "ref")]
  pub git_ref: String,
  /// Custom rewrite rules keyed by pre-rename package name
  pub transform: BTreeMap<String, Vec<RewriteRule>>,
  pub package_dirs: Vec<PackageDirGroup>,
  pub package_individual: Vec<PackageIndividual>,
  pub package_meta_from_dirs: Vec<PackageIndividual>,
  pub magento_community_edition_metapackage: bool,
}

impl BuildInstruction {
  /// Instruction with no packages; mostly for tests and ad-hoc runs
  pub fn new(name: impl Into<String>, repo_url: impl Into<String>, git_ref: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      repo_url: repo_url.into(),
      git_ref: git_ref.into(),
      transform: BTreeMap::new(),
      package_dirs: Vec::new(),
      package_individual: Vec::new(),
      package_meta_from_dirs: Vec::new(),
      magento_community_edition_metapackage: false,
    }
  }

  fn from_entry(name: &str, entry: ComponentEntry) -> ReleaseResult<Self> {
    let repo_url = entry.repo_url.ok_or_else(|| ConfigError::MissingField {
      field: format!("repo_url for component '{}'", name),
    })?;
    let git_ref = entry.git_ref.ok_or_else(|| ConfigError::MissingField {
      field: format!("ref for component '{}'", name),
    })?;
    validate_ref_is_secure(&git_ref).with_context(|| format!("Invalid ref for component '{}'", name))?;

    Ok(Self {
      name: name.to_string(),
      repo_url,
      git_ref,
      transform: entry.transform.unwrap_or_default(),
      package_dirs: entry.package_dirs.unwrap_or_default(),
      package_individual: entry.package_individual.unwrap_or_default(),
      package_meta_from_dirs: entry.package_meta_from_dirs.unwrap_or_default(),
      magento_community_edition_metapackage: entry.magento_community_edition_metapackage.unwrap_or(false),
    })
  }
}

impl BuildConfig {
  /// Find config file in search order: release.toml, .release.toml, .config/release.toml
  pub fn find_config_path(path: &Path) -> Option<PathBuf> {
    let candidates = vec![
      path.join("release.toml"),
      path.join(".release.toml"),
      path.join(".config").join("release.toml"),
    ];

    candidates.into_iter().find(|p| p.exists())
  }

  /// Load `explicit`, or search `search_root` when no path is given
  pub fn load(explicit: Option<&Path>, search_root: &Path) -> ReleaseResult<Self> {
    let config_path = match explicit {
      Some(path) => path.to_path_buf(),
      None => Self::find_config_path(search_root).ok_or_else(|| {
        ReleaseError::Config(ConfigError::NotFound {
          search_root: search_root.to_path_buf(),
        })
      })?,
    };

    let content = fs::read_to_string(&config_path)
      .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
    let config = Self::parse(&content).with_context(|| format!("Invalid config in {}", config_path.display()))?;
    tracing::debug!(path = %config_path.display(), components = config.components.len(), "loaded build config");
    Ok(config)
  }

  /// Parse and validate TOML
  pub fn parse(content: &str) -> ReleaseResult<Self> {
    let config: BuildConfig = toml_edit::de::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  /// Check settings and every component
  pub fn validate(&self) -> ReleaseResult<()> {
    for (field, vendor) in [
      ("release.vendor_from", &self.release.vendor_from),
      ("release.vendor_to", &self.release.vendor_to),
    ] {
      if vendor.is_empty() || vendor.contains('/') {
        return Err(
          ConfigError::Invalid {
            field: field.to_string(),
            reason: format!("\"{}\" is not a vendor name", vendor),
          }
          .into(),
        );
      }
    }

    if self.release.tag_marker.trim().is_empty() {
      return Err(
        ConfigError::Invalid {
          field: "release.tag_marker".to_string(),
          reason: "must not be empty".to_string(),
        }
        .into(),
      );
    }

    if self.release.metapackage_dir.trim().is_empty() {
      return Err(
        ConfigError::Invalid {
          field: "release.metapackage_dir".to_string(),
          reason: "must not be empty".to_string(),
        }
        .into(),
      );
    }

    if !self.release.commit_message.contains("{version}") {
      return Err(ReleaseError::with_help(
        format!(
          "Commit message \"{}\" does not mention the version",
          self.release.commit_message
        ),
        "Include {version} in [release] commit_message, e.g. \"Release {version}\"",
      ));
    }
    validate_commit_message_is_secure(&self.release.commit_message.replace("{version}", "0.0.0"))?;

    if self.process.max_output_bytes == 0 {
      return Err(
        ConfigError::Invalid {
          field: "process.max_output_bytes".to_string(),
          reason: "must be greater than zero".to_string(),
        }
        .into(),
      );
    }

    let mut seen = BTreeSet::new();
    for component in &self.components {
      let name = component.name.as_deref().unwrap_or_default();
      if name.is_empty() {
        return Err(
          ConfigError::MissingField {
            field: "name for [[components]] entry".to_string(),
          }
          .into(),
        );
      }
      if !seen.insert(name) {
        return Err(ReleaseError::with_help(
          format!("Component '{}' is declared twice", name),
          "Each [[components]] entry must have a unique name",
        ));
      }
      self.instruction(name)?;
    }

    Ok(())
  }

  /// The merged instruction of one component
  pub fn instruction(&self, name: &str) -> ReleaseResult<BuildInstruction> {
    let over = self
      .components
      .iter()
      .find(|c| c.name.as_deref() == Some(name))
      .ok_or_else(|| ConfigError::ComponentNotFound { name: name.to_string() })?;
    let entry = match self.packages.get(name) {
      Some(base) => base.merged(over),
      None => over.clone(),
    };
    BuildInstruction::from_entry(name, entry)
  }

  /// Instructions for `only` (in the given order), or every component when empty
  pub fn instructions(&self, only: &[String]) -> ReleaseResult<Vec<BuildInstruction>> {
    if only.is_empty() {
      return self
        .components
        .iter()
        .filter_map(|c| c.name.as_deref())
        .map(|name| self.instruction(name))
        .collect();
    }
    only.iter().map(|name| self.instruction(name)).collect()
  }

  /// Commit message for a release
  pub fn commit_message(&self, version: &str) -> String {
    self.release.commit_message.replace("{version}", version)
  }

  pub fn vendor_rename(&self) -> VendorRename {
    VendorRename {
      from: self.release.vendor_from.clone(),
      to: self.release.vendor_to.clone(),
    }
  }

  /// Composer collaborator working in the system temp dir
  pub fn composer(&self, limits: ProcessLimits) -> Composer {
    Composer::new(std::env::temp_dir(), limits).with_repository_url(self.release.upstream_repository_url.clone())
  }

  /// Registry over the configured cache dir, limits, identity and tag marker
  ///
  /// A relative cache dir is resolved against `base`.
  pub fn registry(&self, base: &Path, limits: ProcessLimits) -> RepositoryRegistry {
    RepositoryRegistry::new(base.join(&self.release.cache_dir))
      .with_limits(limits)
      .with_identity(self.identity.clone())
      .with_tag_marker(self.release.tag_marker.clone())
  }
}
