//! Progress indicators for package preparation
//!
//! Uses `linya`, which draws to stderr and stays out of the way of `--json`
//! output on stdout.

use linya::{Bar, Progress};

/// One bar counting prepared packages of a repository
pub struct PackageProgress {
  progress: Progress,
  bar: Bar,
}

impl PackageProgress {
  pub fn new(total: usize, label: impl Into<String>) -> Self {
    let mut progress = Progress::new();
    let bar = progress.bar(total, label.into());
    Self { progress, bar }
  }

  /// Increment progress by 1
  pub fn inc(&mut self) {
    self.progress.inc_and_draw(&self.bar, 1);
  }
}
