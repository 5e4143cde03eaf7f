use clap::{Parser, Subcommand};
use mageos_release::commands;
use mageos_release::core::error::{ReleaseError, print_error};
use mageos_release::logging;
use std::path::PathBuf;

/// Prepare Mage-OS releases across repositories: rewrite composer.json, commit, tag
#[derive(Parser)]
#[command(name = "mageos-release")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(styles = get_styles())]
struct Cli {
  /// Log progress of every stage (RUST_LOG overrides)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Prepare, commit and tag a release in every configured repository
  Prep {
    /// Release version (X.Y[.Z][-suffix])
    #[arg(id = "release_version", value_name = "VERSION")]
    version: String,
    /// Only release these components (repeatable; default: all)
    #[arg(short, long = "component")]
    components: Vec<String>,
    /// Build configuration file (default: release.toml, .release.toml, .config/release.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON file mapping upstream package names to replace constraints
    #[arg(long, value_name = "FILE.json")]
    replace_versions: Option<PathBuf>,
    /// Resolve replace constraints from this upstream release via composer
    #[arg(long, value_name = "VERSION")]
    upstream_release: Option<String>,
    /// Prepare different repositories concurrently
    #[arg(long)]
    parallel: bool,
    /// Kill any git/composer invocation running longer than this
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Output results in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Show the packages each repository would release (no branches, commits or tags)
  Plan {
    /// Only plan these components (repeatable; default: all)
    #[arg(short, long = "component")]
    components: Vec<String>,
    /// Build configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output plan in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Print the package versions composer installs for an upstream release
  UpstreamVersions {
    /// Upstream release version
    #[arg(id = "upstream_version", value_name = "VERSION")]
    version: String,
    /// Build configuration file (only [process] is used)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Kill composer invocations running longer than this
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Output versions in JSON format
    #[arg(long)]
    json: bool,
  },
}

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .usage(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
    .invalid(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .error(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .valid(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

fn main() {
  let cli = Cli::parse();
  logging::init(cli.verbose);

  let result = match cli.command {
    Commands::Prep {
      version,
      components,
      config,
      replace_versions,
      upstream_release,
      parallel,
      timeout,
      json,
    } => commands::run_prep(commands::PrepArgs {
      version,
      components,
      config,
      replace_versions,
      upstream_release,
      parallel,
      timeout,
      json,
    }),
    Commands::Plan {
      components,
      config,
      json,
    } => commands::run_plan(components, config, json),
    Commands::UpstreamVersions {
      version,
      config,
      timeout,
      json,
    } => commands::run_upstream_versions(version, config, timeout, json),
  };

  if let Err(err) = result {
    handle_error(err);
  }
}

fn handle_error(err: ReleaseError) -> ! {
  print_error(&err);
  std::process::exit(err.exit_code().as_i32());
}
