//! Error types for mageos-release with contextual messages and exit codes
//!
//! Every failure mode is fatal for the repository it happens in. Nothing here is
//! retried automatically: errors either point at a configuration defect or at an
//! authoritative failure of git/composer, and the working copy may already carry
//! partial state.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Exit codes for mageos-release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid args, missing files)
  User = 1,
  /// System error (git, composer, I/O)
  System = 2,
  /// Validation failure (unsafe input, bad versions, tag conflicts)
  Validation = 3,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for mageos-release
#[derive(Debug)]
pub enum ReleaseError {
  /// Configuration errors
  Config(ConfigError),

  /// Git state errors (tags, branches, repositories)
  Git(GitError),

  /// Validation errors (unsafe refs, versions, manifests)
  Validation(ValidationError),

  /// External tool failures (git or composer process)
  Tool(ToolError),

  /// I/O errors
  Io(io::Error),

  /// A structured error annotated with where it happened
  Context { context: String, source: Box<ReleaseError> },

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

impl ReleaseError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    ReleaseError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    ReleaseError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  /// Add context to an existing error
  ///
  /// Plain messages accumulate context lines; structured errors are wrapped so
  /// callers can still reach the original variant through [`Self::root_cause`].
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      ReleaseError::Message { message, context, help } => ReleaseError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      other => ReleaseError::Context {
        context: ctx_str,
        source: Box::new(other),
      },
    }
  }

  /// The innermost error, skipping context wrappers
  pub fn root_cause(&self) -> &ReleaseError {
    match self {
      ReleaseError::Context { source, .. } => source.root_cause(),
      other => other,
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      ReleaseError::Config(_) => ExitCode::User,
      ReleaseError::Git(GitError::TagConflict { .. }) => ExitCode::Validation,
      ReleaseError::Git(_) => ExitCode::System,
      ReleaseError::Validation(_) => ExitCode::Validation,
      ReleaseError::Tool(_) => ExitCode::System,
      ReleaseError::Io(_) => ExitCode::System,
      ReleaseError::Context { source, .. } => source.exit_code(),
      ReleaseError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      ReleaseError::Config(e) => e.help_message(),
      ReleaseError::Git(e) => e.help_message(),
      ReleaseError::Validation(e) => e.help_message(),
      ReleaseError::Tool(e) => e.help_message(),
      ReleaseError::Context { source, .. } => source.help_message(),
      ReleaseError::Message { help, .. } => help.clone(),
      ReleaseError::Io(_) => None,
    }
  }
}

impl fmt::Display for ReleaseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReleaseError::Config(e) => write!(f, "{}", e),
      ReleaseError::Git(e) => write!(f, "{}", e),
      ReleaseError::Validation(e) => write!(f, "{}", e),
      ReleaseError::Tool(e) => write!(f, "{}", e),
      ReleaseError::Io(e) => write!(f, "I/O error: {}", e),
      ReleaseError::Context { context, source } => write!(f, "{}\n{}", context, source),
      ReleaseError::Message { message, context, .. } => {
        write!(f, "{}", message)?;
        if let Some(ctx) = context {
          write!(f, "\n{}", ctx)?;
        }
        Ok(())
      }
    }
  }
}

impl std::error::Error for ReleaseError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      ReleaseError::Io(e) => Some(e),
      ReleaseError::Context { source, .. } => Some(source.as_ref()),
      _ => None,
    }
  }
}

impl From<io::Error> for ReleaseError {
  fn from(err: io::Error) -> Self {
    ReleaseError::Io(err)
  }
}

impl From<String> for ReleaseError {
  fn from(msg: String) -> Self {
    ReleaseError::message(msg)
  }
}

impl From<&str> for ReleaseError {
  fn from(msg: &str) -> Self {
    ReleaseError::message(msg)
  }
}

impl From<ValidationError> for ReleaseError {
  fn from(err: ValidationError) -> Self {
    ReleaseError::Validation(err)
  }
}

impl From<ToolError> for ReleaseError {
  fn from(err: ToolError) -> Self {
    ReleaseError::Tool(err)
  }
}

impl From<GitError> for ReleaseError {
  fn from(err: GitError) -> Self {
    ReleaseError::Git(err)
  }
}

impl From<ConfigError> for ReleaseError {
  fn from(err: ConfigError) -> Self {
    ReleaseError::Config(err)
  }
}

impl From<toml_edit::de::Error> for ReleaseError {
  fn from(err: toml_edit::de::Error) -> Self {
    ReleaseError::message(format!("TOML deserialization error: {}", err))
  }
}

impl From<serde_json::Error> for ReleaseError {
  fn from(err: serde_json::Error) -> Self {
    ReleaseError::message(format!("JSON error: {}", err))
  }
}

impl From<std::string::FromUtf8Error> for ReleaseError {
  fn from(err: std::string::FromUtf8Error) -> Self {
    ReleaseError::message(format!("UTF-8 conversion error: {}", err))
  }
}

impl From<std::num::ParseIntError> for ReleaseError {
  fn from(err: std::num::ParseIntError) -> Self {
    ReleaseError::message(format!("Parse error: {}", err))
  }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
  /// No build configuration file found
  NotFound { search_root: PathBuf },

  /// Missing required field
  MissingField { field: String },

  /// Component not found in configuration
  ComponentNotFound { name: String },

  /// A configured value is malformed
  Invalid { field: String, reason: String },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::NotFound { .. } => {
        Some("Pass --config <file> or create release.toml (see build-config.example.toml).".to_string())
      }
      ConfigError::ComponentNotFound { name } => Some(format!(
        "Run `mageos-release plan` to list configured components. Is '{}' declared under [[components]]?",
        name
      )),
      _ => None,
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::NotFound { search_root } => {
        write!(
          f,
          "No build configuration found.\nSearched release.toml, .release.toml and .config/release.toml in {}",
          search_root.display()
        )
      }
      ConfigError::MissingField { field } => {
        write!(f, "Missing required field in config: {}", field)
      }
      ConfigError::ComponentNotFound { name } => {
        write!(f, "Component '{}' not found in configuration", name)
      }
      ConfigError::Invalid { field, reason } => {
        write!(f, "Invalid config value for {}: {}", field, reason)
      }
    }
  }
}

/// Git state errors
#[derive(Debug)]
pub enum GitError {
  /// Working copy missing or not a repository
  RepoNotFound { path: PathBuf },

  /// A tag of that name exists and was not created by this tool
  TagConflict { tag: String, details: String },

  /// Branch operation failed
  BranchError { message: String },
}

impl GitError {
  fn help_message(&self) -> Option<String> {
    match self {
      GitError::TagConflict { tag, .. } => Some(format!(
        "Tag '{}' was created outside of mageos-release. Inspect it with `git show {}` and remove it manually if it is stale.",
        tag, tag
      )),
      GitError::RepoNotFound { path } => Some(format!(
        "Delete the directory so it can be cloned again, or check the cache path: {}",
        path.display()
      )),
      GitError::BranchError { .. } => None,
    }
  }
}

impl fmt::Display for GitError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GitError::RepoNotFound { path } => {
        write!(f, "Git repository not found at: {}", path.display())
      }
      GitError::TagConflict { details, .. } => write!(f, "{}", details),
      GitError::BranchError { message } => {
        write!(f, "Branch operation failed: {}", message)
      }
    }
  }
}

/// Validation errors
#[derive(Debug)]
pub enum ValidationError {
  /// A ref or branch name could smuggle flags or substitutions into a command
  UnsafeRef { kind: &'static str, value: String },

  /// A free-form argument (commit message) failed the safety predicate
  UnsafeInput { value: String },

  /// Version string is not X.Y[.Z][-suffix]
  InvalidVersion { what: String, version: String },

  /// A package directory lacks its composer.json
  MissingManifest { path: PathBuf },

  /// A manifest could not be parsed or violates its invariants
  InvalidManifest { source_path: String, reason: String },
}

impl ValidationError {
  fn help_message(&self) -> Option<String> {
    match self {
      ValidationError::MissingManifest { .. } => {
        Some("Add the directory to the excludes of its package_dirs group in the build config.".to_string())
      }
      ValidationError::InvalidVersion { .. } => {
        Some("Versions look like 2.4, 2.4-p2, 2.4.6 or 1.2.3-alpha (lowercase suffix).".to_string())
      }
      _ => None,
    }
  }
}

impl fmt::Display for ValidationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ValidationError::UnsafeRef { kind, value } => {
        write!(f, "Rejecting the {} \"{}\" as potentially insecure", kind, value)
      }
      ValidationError::UnsafeInput { value } => {
        write!(f, "Rejecting the commit message \"{}\" as potentially insecure", value)
      }
      ValidationError::InvalidVersion { what, version } => {
        write!(f, "{} \"{}\" is not a valid version (X.Y.Z[-suffix]).", what, version)
      }
      ValidationError::MissingManifest { path } => {
        write!(
          f,
          "{} doesn't contain a composer.json! Please add to excludes in config.",
          path.display()
        )
      }
      ValidationError::InvalidManifest { source_path, reason } => {
        write!(f, "Invalid manifest {}: {}", source_path, reason)
      }
    }
  }
}

/// External process failures
#[derive(Debug)]
pub enum ToolError {
  /// The binary could not be started
  Spawn { command: String, reason: String },

  /// Non-zero exit, or output on stderr that is not a known informational message
  Failed {
    command: String,
    status: Option<i32>,
    stderr: String,
  },

  /// stdout or stderr exceeded the configured buffer
  OutputTooLarge { command: String, limit: usize },

  /// The process ran past its timeout and was killed
  TimedOut { command: String, timeout: Duration },
}

impl ToolError {
  fn help_message(&self) -> Option<String> {
    match self {
      ToolError::Spawn { command, .. } => Some(format!(
        "Make sure `{}` is installed and on PATH.",
        command.split_whitespace().next().unwrap_or(command)
      )),
      ToolError::OutputTooLarge { .. } => Some("Raise [process] max_output_bytes in the build config.".to_string()),
      ToolError::TimedOut { .. } => Some("Raise [process] timeout_secs or pass a larger --timeout.".to_string()),
      ToolError::Failed { .. } => None,
    }
  }
}

impl fmt::Display for ToolError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ToolError::Spawn { command, reason } => write!(f, "Failed to execute {}: {}", command, reason),
      ToolError::Failed { command, status, stderr } => match status {
        Some(code) if *code != 0 => write!(f, "Command failed (exit {}): {}\n{}", code, command, stderr.trim_end()),
        _ => write!(f, "Command reported errors: {}\n{}", command, stderr.trim_end()),
      },
      ToolError::OutputTooLarge { command, limit } => {
        write!(f, "Output of {} exceeded the {} byte buffer", command, limit)
      }
      ToolError::TimedOut { command, timeout } => {
        write!(f, "{} did not finish within {}s", command, timeout.as_secs())
      }
    }
  }
}

/// Result type alias for mageos-release
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> ReleaseResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> ReleaseResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<ReleaseError>,
{
  fn context(self, ctx: impl Into<String>) -> ReleaseResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> ReleaseResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &ReleaseError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}

impl From<anyhow::Error> for ReleaseError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<ReleaseError>() {
      Ok(inner) => inner,
      Err(other) => ReleaseError::message(format!("{:#}", other)),
    }
  }
}
