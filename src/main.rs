use anyhow::Result;
use clap::Parser;
use dify_installer::{commands, commands::Config, platform::Target, runtime::RealRuntime};
use std::path::PathBuf;

/// dify-installer - install the Dify plugin CLI
///
/// Picks the build of `dify` matching this machine, downloads it, checks its
/// SHA-256 when one is pinned, installs it as `dify` and runs `dify --version`.
///
/// If the GITHUB_TOKEN environment variable is set, it is sent with downloads.
///
/// Examples:
///   dify-installer install                        # built-in formula, this host
///   dify-installer install --formula ./dify.json  # a local formula file
///   dify-installer resolve --all                  # list every variant
#[derive(Parser, Debug)]
#[command(author, version = env!("DIFY_INSTALLER_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// State directory holding install receipts (also via DIFY_INSTALLER_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "DIFY_INSTALLER_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub root: Option<PathBuf>,

    /// Formula file to use instead of the built-in one (also via DIFY_FORMULA)
    #[arg(
        long = "formula",
        short = 'f',
        env = "DIFY_FORMULA",
        value_name = "FILE",
        global = true
    )]
    pub formula: Option<PathBuf>,

    /// Directory to install the executable into (also via DIFY_BIN_DIR)
    #[arg(long = "bin-dir", env = "DIFY_BIN_DIR", value_name = "DIR", global = true)]
    pub bin_dir: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Download, verify, install and test the executable
    Install(InstallArgs),

    /// Print the download URL and checksum that would be used
    Resolve(ResolveArgs),

    /// Run the post-install check against the installed executable
    Test(PlatformArgs),

    /// Show the formula and installation status
    Show,

    /// Remove the installed executable and its receipt
    Uninstall,
}

#[derive(clap::Args, Debug)]
pub struct PlatformArgs {
    /// Operating system to install for (darwin, linux, windows)
    #[arg(long, value_name = "OS")]
    pub os: Option<String>,

    /// CPU architecture to install for (amd64, arm64)
    #[arg(long, value_name = "ARCH")]
    pub arch: Option<String>,
}

impl PlatformArgs {
    fn target(&self) -> Target {
        Target::detect_with(self.os.clone(), self.arch.clone())
    }
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    #[command(flatten)]
    pub platform: PlatformArgs,

    /// Reinstall even if this version is already installed
    #[arg(long)]
    pub force: bool,

    /// Do not run the post-install check
    #[arg(long)]
    pub skip_test: bool,
}

#[derive(clap::Args, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub platform: PlatformArgs,

    /// List every variant instead of the one for this platform
    #[arg(long)]
    pub all: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = RealRuntime;
    let formula = cli.formula.as_deref();

    match cli.command {
        Commands::Install(args) => {
            let config = Config::new(runtime, cli.root, cli.bin_dir)?;
            commands::install(
                config,
                formula,
                &args.platform.target(),
                args.force,
                args.skip_test,
            )
            .await?
        }
        Commands::Resolve(args) => {
            commands::resolve(&runtime, formula, &args.platform.target(), args.all)?
        }
        Commands::Test(args) => {
            let config = Config::new(runtime, cli.root, cli.bin_dir)?;
            commands::test(config, formula, &args.target())?
        }
        Commands::Show => {
            let config = Config::new(runtime, cli.root, cli.bin_dir)?;
            commands::show(&config, formula)?
        }
        Commands::Uninstall => {
            let config = Config::new(runtime, cli.root, cli.bin_dir)?;
            commands::uninstall(config, formula)?
        }
    }
    Ok(())
}
