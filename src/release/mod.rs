//! Release preparation
//!
//! - **discovery**: which directories of a repository are packages
//! - **prep**: the per-repository state machine (work branch, rewrite, commit, tag)
//!
//! # Example release.toml
//!
//! ```toml
//! [[components]]
//! name = "magento2"
//! repo_url = "https://github.com/mage-os/mageos-magento2.git"
//! ref = "2.4-develop"
//! package_dirs = [{ label = "Magento Base Modules", dir = "app/code/Magento", excludes = ["Elasticsearch7/"] }]
//! package_individual = [{ label = "Magento Framework", dir = "lib/internal/Magento/Framework" }]
//! magento_community_edition_metapackage = true
//! ```

pub mod discovery;
pub mod prep;

pub use discovery::{DiscoveredPackage, discover_dir_group, discover_packages};
pub use prep::{PrepOutcome, ReleasePlan, ReleasePrep, RepoState, plan, work_branch_name};
