//! Tapwright CLI - build Rust tools and publish them to a Homebrew tap.

use clap::{ArgAction, Args, Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tw_core::{Arch, Context, LogLevel, Paths, UploadType};

mod commands;
mod display;

#[derive(Parser)]
#[command(name = "tw")]
#[command(about = "Tapwright - build, release and publish command-line tools through a Homebrew tap")]
#[command(version)]
struct Cli {
    /// Root directory for tapwright data (default: ~/.tapwright)
    #[arg(long, env = "TAPWRIGHT_ROOT", global = true)]
    root: Option<PathBuf>,

    /// More diagnostics on stderr (repeat for trace output)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build release binaries and archive them
    Build(BuildArgs),

    /// Manage Homebrew taps and publish releases to them
    Brew {
        #[command(subcommand)]
        action: BrewAction,
    },
}

/// Options shared by `build` and `brew publish`.
#[derive(Args, Clone, Debug)]
pub struct TargetArgs {
    /// Target architecture (repeatable; default: host)
    #[arg(long = "arch", value_name = "ARCH")]
    pub archs: Vec<Arch>,

    /// Build for every supported architecture
    #[arg(long, conflicts_with = "archs")]
    pub universal: bool,

    /// Clear the build output directory first
    #[arg(long)]
    pub clean: bool,

    /// Extra argument passed to the build (repeatable)
    #[arg(long = "build-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub build_args: Vec<String>,

    /// Binary target to build (default: the package name)
    #[arg(long)]
    pub bin: Option<String>,
}

impl TargetArgs {
    pub fn targets(&self) -> Vec<Arch> {
        if self.universal {
            Arch::all().to_vec()
        } else {
            self.archs.clone()
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct BuildArgs {
    /// Project directory
    #[arg(default_value = ".")]
    pub project: PathBuf,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Upload type to package for (binary or tarball)
    #[arg(long, default_value = "binary")]
    pub upload_type: UploadType,

    /// Output directory (default: <root>/build/<name>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Copy the artifacts into this directory after building
    #[arg(long)]
    pub copy_to: Option<PathBuf>,

    /// Print the output directory when done
    #[arg(long)]
    pub reveal: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum BrewAction {
    /// Register an existing tap working copy and its formulas
    ImportTap {
        /// Path to the tap (e.g. ./homebrew-tools)
        path: PathBuf,
    },

    /// List registered taps and their formulas
    TapList {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Create a new tap repository and register it
    CreateTap {
        /// Tap name, with or without the homebrew- prefix
        name: String,

        /// Directory to create the tap in
        #[arg(long, default_value = ".")]
        parent: PathBuf,

        /// Create the remote repository as private
        #[arg(long)]
        private: bool,
    },

    /// Forget a tap and its formulas (files are left on disk)
    RemoveTap {
        /// Tap name
        name: String,
    },

    /// Remove a formula from a tap
    RemoveFormula {
        /// Tap name
        tap: String,

        /// Formula name
        formula: String,
    },

    /// Build, release, and update the tap's formula
    Publish(PublishArgs),
}

#[derive(Args, Clone, Debug)]
pub struct PublishArgs {
    /// Project directory
    #[arg(default_value = ".")]
    pub project: PathBuf,

    /// Tap to publish into
    #[arg(long)]
    pub tap: String,

    /// Version to release, or major/minor/patch to bump the previous release
    #[arg(long = "version", value_name = "VERSION")]
    pub release_version: String,

    /// Formula name (default: the binary name)
    #[arg(long)]
    pub name: Option<String>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Upload type (default: the formula's current one, else binary)
    #[arg(long)]
    pub upload_type: Option<UploadType>,

    /// Release notes text
    #[arg(long, group = "notes_source")]
    pub notes: Option<String>,

    /// Read release notes from a file (opened in $EDITOR if empty)
    #[arg(long, group = "notes_source")]
    pub notes_file: Option<PathBuf>,

    /// Write release notes in $EDITOR
    #[arg(long, group = "notes_source")]
    pub edit_notes: bool,

    /// Formula description
    #[arg(long)]
    pub description: Option<String>,

    /// Formula homepage (default: the project's GitHub page)
    #[arg(long)]
    pub homepage: Option<String>,

    /// License identifier, e.g. MIT
    #[arg(long)]
    pub license: Option<String>,

    /// Formula test command; "default" runs `<name> --version`
    #[arg(long)]
    pub test_command: Option<String>,

    /// Tap commit message (default: "Update <name> to <version>")
    #[arg(short, long)]
    pub message: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_level = LogLevel::from_flags(cli.verbose, cli.quiet);
    init_tracing(log_level);

    if let Err(e) = run(cli, log_level).await {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(1);
    }
}

/// Diagnostics go to stderr; `TW_LOG` overrides the level from the flags.
fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_env("TW_LOG")
        .unwrap_or_else(|_| EnvFilter::new(level.filter_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli, log_level: LogLevel) -> Result<(), tw_core::Error> {
    let root = cli.root.unwrap_or_else(Paths::default_root);
    tracing::debug!(root = %root.display(), "using data root");
    let ctx = Context::new(root, log_level);

    match cli.command {
        Commands::Build(args) => commands::build::run(&ctx, args).await,
        Commands::Brew { action } => commands::brew::run(&ctx, action).await,
    }
}
