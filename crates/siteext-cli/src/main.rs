use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use siteext_core::{parse_package_version, Package};
use siteext_manager::{ManagerConfig, SiteExtensionManager};
use siteext_repository::PackageRepository;
use tracing_subscriber::EnvFilter;

mod completion;
mod render;

use render::{
    format_doctor_lines, format_info_lines, format_installed_lines, format_search_results,
    format_update_lines, render_section_header, render_status_line, resolve_output_style,
    OutputStyle,
};

#[derive(Parser, Debug)]
#[command(name = "siteext")]
#[command(about = "Manage the site extensions of a hosted web site", long_about = None)]
struct Cli {
    /// TOML file with `remote_source` and `site_root` settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Base URL of the remote package feed
    #[arg(long, global = true)]
    source: Option<String>,
    /// Site root; `SiteExtensions` below it holds installed packages
    #[arg(long, global = true)]
    site_root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search the remote feed, or installed extensions with --installed
    Search {
        terms: Option<String>,
        #[arg(long)]
        installed: bool,
    },
    /// List installed extensions, optionally filtered by terms
    List {
        terms: Option<String>,
    },
    /// List installed extensions with a newer stable version available
    Updates {
        terms: Option<String>,
    },
    /// Show remote versions and the installed copy of an extension
    Info {
        id: String,
    },
    /// Install an extension from the remote feed, replacing any other version
    Install {
        id: String,
        /// Exact version to install; defaults to the newest stable version
        #[arg(long)]
        version: Option<String>,
    },
    /// Update an installed extension to the newest stable version
    Update {
        id: String,
    },
    /// Remove an installed extension
    Uninstall {
        id: String,
    },
    /// Print the resolved configuration and site paths
    Doctor,
    /// Generate a shell completion script
    Completions {
        shell: Shell,
    },
}

fn main() -> Result<()> {
    init_tracing();
    run_cli(Cli::parse())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SITEEXT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<ManagerConfig> {
    let mut config = match &cli.config {
        Some(path) => ManagerConfig::load(path)?,
        None => ManagerConfig::default(),
    };
    if let Some(source) = &cli.source {
        config = config
            .with_remote_source(source)
            .context("invalid --source")?;
    }
    if let Some(site_root) = &cli.site_root {
        config = config.with_site_root(site_root);
    }
    Ok(config)
}

fn run_cli(cli: Cli) -> Result<()> {
    let style = resolve_output_style(io::stdout().is_terminal());

    if let Commands::Completions { shell } = &cli.command {
        return completion::write_completions_script(*shell, &mut io::stdout());
    }

    let config = load_config(&cli)?;
    tracing::debug!(?config, "loaded configuration");
    if matches!(cli.command, Commands::Doctor) {
        print_lines(&format_doctor_lines(&config));
        return Ok(());
    }

    let manager = SiteExtensionManager::new(&config)?;
    match cli.command {
        Commands::Search { terms, installed } => {
            let query = if installed {
                manager.search_local(terms.as_deref())
            } else {
                manager.search_remote(terms.as_deref())
            };
            let packages = query.run()?;
            print_lines(&format_search_results(
                &packages,
                terms.as_deref().unwrap_or_default(),
            ));
        }
        Commands::List { terms } => {
            let packages = manager.search_local(terms.as_deref()).run()?;
            print_section(style, "Installed");
            print_lines(&format_installed_lines(&packages));
        }
        Commands::Updates { terms } => {
            let mut updates = Vec::new();
            for available in manager.list_packages_with_updates(terms.as_deref())? {
                let installed = manager
                    .find_installed_package(available.id())?
                    .map(|package| package.version().clone());
                updates.push((installed, available));
            }
            print_section(style, "Updates");
            print_lines(&format_update_lines(&updates));
        }
        Commands::Info { id } => {
            let versions = manager.source_repository().find_package_versions(&id)?;
            let installed = manager.find_installed_package(&id)?;
            print_lines(&format_info_lines(&id, &versions, installed.as_ref()));
        }
        Commands::Install { id, version } => {
            let version = version
                .as_deref()
                .map(parse_package_version)
                .transpose()?;
            let Some(package) = manager.find_remote_package(&id, version.as_ref())? else {
                anyhow::bail!(
                    "package '{id}' was not found in {}",
                    manager.source_repository().source()
                );
            };
            match install_package(&manager, &package)? {
                InstallOutcome::AlreadyInstalled => {
                    print_status(style, "warn", &format!("{package} is already installed"));
                }
                InstallOutcome::Installed => {
                    print_status(style, "ok", &format!("installed {package}"));
                }
                InstallOutcome::Replaced(previous) => print_status(
                    style,
                    "ok",
                    &format!("replaced {previous} with {package}"),
                ),
            }
        }
        Commands::Update { id } => {
            let Some(installed) = manager.find_installed_package(&id)? else {
                anyhow::bail!("package '{id}' is not installed");
            };
            match manager.get_available_update(&installed)? {
                Some(available) => {
                    manager.update(&available)?;
                    print_status(
                        style,
                        "ok",
                        &format!(
                            "updated {} {} -> {}",
                            available.id(),
                            installed.version(),
                            available.version()
                        ),
                    );
                }
                None => print_status(style, "ok", &format!("{installed} is up to date")),
            }
        }
        Commands::Uninstall { id } => match manager.find_installed_package(&id)? {
            Some(installed) => {
                manager.uninstall(&installed)?;
                print_status(style, "ok", &format!("uninstalled {installed}"));
            }
            None => print_status(style, "warn", &format!("{id} is not installed")),
        },
        Commands::Doctor | Commands::Completions { .. } => {}
    }

    Ok(())
}

#[derive(Debug, PartialEq)]
enum InstallOutcome {
    Installed,
    AlreadyInstalled,
    /// Another version was installed and has been removed first.
    Replaced(Package),
}

/// Installs `package`, replacing any other installed version of the same id
/// so no files of the old version survive.
fn install_package(manager: &SiteExtensionManager, package: &Package) -> Result<InstallOutcome> {
    match manager.find_installed_package(package.id())? {
        Some(installed) if installed.version() == package.version() => {
            Ok(InstallOutcome::AlreadyInstalled)
        }
        Some(installed) => {
            manager.update(package)?;
            Ok(InstallOutcome::Replaced(installed))
        }
        None => {
            manager.install(package)?;
            Ok(InstallOutcome::Installed)
        }
    }
}

fn print_status(style: OutputStyle, status: &str, message: &str) {
    println!("{}", render_status_line(style, status, message));
}

fn print_section(style: OutputStyle, title: &str) {
    if let Some(header) = render_section_header(style, title) {
        println!("{header}");
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}
