mod cmd;
mod output;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kiln_lib::consts::{JOBS_ENV, MANIFEST_FILENAME};
use kiln_lib::context::BuildConfig;
use kiln_lib::pipeline::BuildOptions;

use crate::output::{OutputFormat, print_error};

/// kiln - incremental build orchestrator
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Args)]
struct ManifestArg {
  /// Path to the manifest
  #[arg(short = 'f', long = "file", default_value = MANIFEST_FILENAME)]
  file: PathBuf,
}

#[derive(Args)]
struct ConfigArgs {
  /// Build every stage in release configuration
  #[arg(long, conflicts_with = "debug")]
  release: bool,

  /// Build every stage in debug configuration
  #[arg(long)]
  debug: bool,
}

impl ConfigArgs {
  fn config(&self) -> Option<BuildConfig> {
    if self.release {
      Some(BuildConfig::Release)
    } else if self.debug {
      Some(BuildConfig::Debug)
    } else {
      None
    }
  }
}

#[derive(Subcommand)]
enum Commands {
  /// Acquire resources and run every stale stage
  Build {
    #[command(flatten)]
    manifest: ManifestArg,

    #[command(flatten)]
    config: ConfigArgs,

    /// Maximum parallel workers per stage
    #[arg(short, long, env = JOBS_ENV)]
    jobs: Option<usize>,

    /// Shell used to run commands
    #[arg(long)]
    shell: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Show which targets are stale and why, without running anything
  Stale {
    #[command(flatten)]
    manifest: ManifestArg,

    #[command(flatten)]
    config: ConfigArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Delete the build-output directory
  Clean {
    #[command(flatten)]
    manifest: ManifestArg,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&e.to_string());
      ExitCode::FAILURE
    }
  }
}

fn init_logging(verbose: bool) {
  let default = if verbose {
    "kiln=debug,kiln_lib=debug"
  } else {
    "kiln=info,kiln_lib=info"
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_ansi(std::io::stderr().is_terminal())
    .with_target(verbose)
    .without_time()
    .init();
}

fn run(cli: Cli) -> Result<()> {
  match cli.command {
    Commands::Build {
      manifest,
      config,
      jobs,
      shell,
      output,
    } => {
      let options = BuildOptions {
        config: config.config(),
        jobs,
        shell,
      };
      cmd::cmd_build(&manifest.file, &options, output)
    }
    Commands::Stale {
      manifest,
      config,
      output,
    } => {
      let options = BuildOptions {
        config: config.config(),
        ..Default::default()
      };
      cmd::cmd_stale(&manifest.file, &options, output)
    }
    Commands::Clean { manifest } => cmd::cmd_clean(&manifest.file),
  }
}
