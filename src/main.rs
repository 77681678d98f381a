use anyhow::Result;
use clap::Parser;
use novamod::commands::{self, config::Config};
use novamod::plugin::HookCheck;
use std::path::PathBuf;

/// novamod - module registry for Composer projects
///
/// Keeps vendor/novamod/modules.php in sync with the installed module
/// packages and the project's modules/ directory.
///
/// Examples:
///   novamod rebuild              # Regenerate the whole registry
///   novamod install acme/blog    # Register one installed package
#[derive(Parser, Debug)]
#[command(author, version = env!("NOVAMOD_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root directory (defaults to the working directory; also via NOVAMOD_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "NOVAMOD_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub project_root: Option<PathBuf>,

    /// Vendor directory (overrides composer.json config.vendor-dir)
    #[arg(
        long = "vendor-dir",
        env = "COMPOSER_VENDOR_DIR",
        value_name = "PATH",
        global = true
    )]
    pub vendor_dir: Option<PathBuf>,

    /// Show diagnostic output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Regenerate the registry from all installed packages
    Rebuild,

    /// Register an installed module package
    Install(PackageArgs),

    /// Re-register an updated module package
    Update(UpdateArgs),

    /// Unregister a module package
    Uninstall(PackageArgs),

    /// Add, replace, or remove a single registry entry
    Apply(ApplyArgs),

    /// List registered modules
    List,

    /// Check that composer.json rebuilds the registry after autoload dumps
    Check,
}

#[derive(clap::Args, Debug)]
pub struct PackageArgs {
    /// Package name as in installed.json, e.g. "acme/blog"
    #[arg(value_name = "VENDOR/PACKAGE")]
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    /// Package name as in installed.json, e.g. "acme/blog"
    #[arg(value_name = "VENDOR/PACKAGE")]
    pub name: String,

    /// JSON file with the package definition before the update
    #[arg(long, value_name = "FILE")]
    pub previous: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ApplyArgs {
    /// Module identifier, e.g. "Blog/Core"
    pub identifier: String,

    /// Module directory; omit to remove the entry
    #[arg(long)]
    pub path: Option<String>,

    /// Module version (defaults to 0.0.0)
    #[arg(long = "module-version", value_name = "VERSION")]
    pub version: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let runtime = novamod::runtime::RealRuntime;
    let config = Config::new(&runtime, cli.project_root, cli.vendor_dir)?;
    let hook_check = HookCheck::new();

    match cli.command {
        Commands::Rebuild => commands::rebuild(runtime, config, &hook_check)?,
        Commands::Install(args) => commands::install(runtime, &args.name, config, &hook_check)?,
        Commands::Update(args) => {
            commands::update(runtime, &args.name, args.previous, config, &hook_check)?
        }
        Commands::Uninstall(args) => {
            commands::uninstall(runtime, &args.name, config, &hook_check)?
        }
        Commands::Apply(args) => commands::apply(
            runtime,
            &args.identifier,
            args.path,
            args.version,
            config,
            &hook_check,
        )?,
        Commands::List => commands::list(runtime, config, &hook_check)?,
        Commands::Check => commands::check(config)?,
    }
    Ok(())
}
