//! composer.json handling: model, release rewrite rules, metapackages, and the composer binary

pub mod manifest;
pub mod metapackage;
pub mod package_manager;
pub mod rewrite;
pub mod rules;
pub mod version;

pub use manifest::{DependencySection, Manifest};
pub use rewrite::{RewriteRule, apply_transforms};
pub use rules::{ReleaseRules, ReplaceVersionMap, VendorRename};
pub use version::validate_version_string;
