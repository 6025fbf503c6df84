// src/main.rs

use anyhow::Result;
use charon::compat::Compatibility;
use charon::manager::{InstallManager, InstallOutcome, InstallState, Launcher};
use charon::registry::{self, CatalogHandle, HttpTransport, PackageDescriptor, RegistryConfig};
use charon::vfs::DiskStore;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "charon")]
#[command(author, version, about = "App store installation engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the remote catalog
    List {
        /// Only show packages in this category
        #[arg(short, long)]
        category: Option<String>,
        /// Custom catalog host
        #[arg(long)]
        host: Option<String>,
        /// Use the development host (localhost)
        #[arg(long)]
        dev: bool,
        /// Running platform version
        #[arg(long, default_value_t = 1.0)]
        platform_version: f64,
    },
    /// Show one catalog entry in detail
    Show {
        /// Package id (e.g. "games/chess")
        id: String,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        dev: bool,
        #[arg(long, default_value_t = 1.0)]
        platform_version: f64,
    },
    /// Install a package, or open it when already installed and up to date
    Install {
        /// Package id (e.g. "games/chess")
        id: String,
        /// Store root directory (default: /var/lib/charon)
        #[arg(short, long, default_value = "/var/lib/charon")]
        root: String,
        /// Reinstall even when already present
        #[arg(short, long)]
        force: bool,
        /// Confirm installing a package flagged as incompatible
        #[arg(short, long)]
        yes: bool,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        dev: bool,
        #[arg(long, default_value_t = 1.0)]
        platform_version: f64,
    },
    /// Check whether an installed package has an update available
    Check {
        /// Package id (e.g. "games/chess")
        id: String,
        /// Store root directory (default: /var/lib/charon)
        #[arg(short, long, default_value = "/var/lib/charon")]
        root: String,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        dev: bool,
        #[arg(long, default_value_t = 1.0)]
        platform_version: f64,
    },
    /// Remove an installed package
    Uninstall {
        /// Package id (e.g. "games/chess")
        id: String,
        /// Store root directory (default: /var/lib/charon)
        #[arg(short, long, default_value = "/var/lib/charon")]
        root: String,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        dev: bool,
        #[arg(long, default_value_t = 1.0)]
        platform_version: f64,
    },
    /// List installed packages from the local manifest
    Installed {
        /// Store root directory (default: /var/lib/charon)
        #[arg(short, long, default_value = "/var/lib/charon")]
        root: String,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        dev: bool,
        #[arg(long, default_value_t = 1.0)]
        platform_version: f64,
    },
}

/// Hands installed package source to the host runtime
///
/// Execution of package code is the host's responsibility; the CLI only
/// reports the handoff.
struct HostLauncher;

impl Launcher for HostLauncher {
    fn launch(&self, source: &str, sandboxed: bool) -> charon::Result<()> {
        info!(
            "Handing {} bytes of package source to the host (sandboxed: {})",
            source.len(),
            sandboxed
        );
        Ok(())
    }
}

fn open_catalog(host: &Option<String>, dev: bool) -> Result<CatalogHandle> {
    let config = match host {
        Some(host) => RegistryConfig::custom(host.clone()),
        None if dev => RegistryConfig::development(),
        None => RegistryConfig::production(),
    };

    let transport = Arc::new(HttpTransport::new()?);
    Ok(registry::connect(transport, config)?)
}

fn build_manager(root: &str, catalog: CatalogHandle, platform_version: f64) -> InstallManager {
    let store = Arc::new(DiskStore::new(root));
    InstallManager::new(store, catalog, Arc::new(HostLauncher), platform_version)
}

/// Find one descriptor by id in the catalog
fn find_package(catalog: &CatalogHandle, id: &str) -> Result<PackageDescriptor> {
    catalog
        .list()?
        .into_iter()
        .find(|d| d.id == id)
        .ok_or_else(|| anyhow::anyhow!("Package '{}' is not in the catalog", id))
}

fn verdict_label(compatibility: Compatibility) -> &'static str {
    match compatibility {
        Compatibility::Compatible => "compatible",
        Compatibility::PossiblyIncompatible => "may be incompatible",
        Compatibility::Incompatible => "not compatible",
    }
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::List {
            category,
            host,
            dev,
            platform_version,
        }) => {
            let catalog = open_catalog(&host, dev)?;
            let packages = match category {
                Some(category) => catalog.list_category(&category)?,
                None => catalog.list()?,
            };

            if packages.is_empty() {
                println!("No packages found.");
            } else {
                for package in &packages {
                    let verdict =
                        charon::compat::resolve(package.compatible_with, platform_version);
                    println!(
                        "  {} - {} by {} [{}] ({})",
                        package.id,
                        package.name,
                        package.author,
                        package.category,
                        verdict_label(verdict.compatibility)
                    );
                }
                println!("\nTotal: {} package(s)", packages.len());
            }

            Ok(())
        }
        Some(Commands::Show {
            id,
            host,
            dev,
            platform_version,
        }) => {
            let catalog = open_catalog(&host, dev)?;
            let package = find_package(&catalog, &id)?;
            let verdict = charon::compat::resolve(package.compatible_with, platform_version);

            println!("{} by {}", package.name, package.author);
            println!("  {}", package.short_description);
            println!("  {}", package.description);
            println!("  Category: {}", package.category);
            println!(
                "  Compatibility: {} ({})",
                verdict_label(verdict.compatibility),
                verdict.reason
            );
            println!("  Banner: {}", catalog.asset_url(&package.id, package.banner_or_icon()));

            if let Some(latest) = package.versions.first() {
                let date = chrono::DateTime::parse_from_rfc3339(&latest.date)
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|_| latest.date.clone());
                println!("  Latest version: {} ({})", latest.version, date);
                if !package.latest_version_info.is_empty() {
                    println!("  What's new: {}", package.latest_version_info);
                }
            }
            if package.versions.len() > 1 {
                println!("  Older versions:");
                for entry in &package.versions[1..] {
                    println!("    {} ({})", entry.version, entry.date);
                }
            }

            Ok(())
        }
        Some(Commands::Install {
            id,
            root,
            force,
            yes,
            host,
            dev,
            platform_version,
        }) => {
            let catalog = open_catalog(&host, dev)?;
            let package = find_package(&catalog, &id)?;
            let manager = build_manager(&root, catalog, platform_version);

            let verdict = manager.compatibility(&package);
            let state = manager.check_update(&package)?;

            // Fresh installs of non-compatible packages need explicit
            // confirmation; updates of an already-accepted package do not
            if state == InstallState::NotInstalled && !verdict.is_compatible() && !yes {
                println!(
                    "'{}' is {} with this platform: {}",
                    package.name,
                    verdict_label(verdict.compatibility),
                    verdict.reason
                );
                anyhow::bail!("Re-run with --yes to install anyway");
            }

            let outcome = match state {
                InstallState::NotInstalled | InstallState::UpdateAvailable => {
                    manager.install(&package, true)?
                }
                InstallState::UpToDate => manager.install(&package, force)?,
            };

            match outcome {
                InstallOutcome::Installed => println!("Installed {} ({})", package.name, id),
                InstallOutcome::Opened => println!("{} is up to date; opened it", package.name),
            }

            Ok(())
        }
        Some(Commands::Check {
            id,
            root,
            host,
            dev,
            platform_version,
        }) => {
            let catalog = open_catalog(&host, dev)?;
            let package = find_package(&catalog, &id)?;
            let manager = build_manager(&root, catalog, platform_version);

            match manager.check_update(&package)? {
                InstallState::NotInstalled => println!("{}: not installed", id),
                InstallState::UpToDate => println!("{}: up to date", id),
                InstallState::UpdateAvailable => println!("{}: update available", id),
            }

            Ok(())
        }
        Some(Commands::Uninstall {
            id,
            root,
            host,
            dev,
            platform_version,
        }) => {
            let catalog = open_catalog(&host, dev)?;
            let manager = build_manager(&root, catalog, platform_version);

            manager.uninstall(&charon::index::safe_key(&id))?;
            println!("Uninstalled {}", id);

            Ok(())
        }
        Some(Commands::Installed {
            root,
            host,
            dev,
            platform_version,
        }) => {
            let catalog = open_catalog(&host, dev)?;
            let manager = build_manager(&root, catalog, platform_version);

            let index = manager.installed()?;
            if index.is_empty() {
                println!("No packages installed.");
            } else {
                for (key, record) in &index {
                    println!(
                        "  {} - {} by {} (installed as {})",
                        record.descriptor.id, record.descriptor.name, record.descriptor.author, key
                    );
                }
                println!("\nTotal: {} package(s)", index.len());
            }

            Ok(())
        }
        None => {
            // No command provided, show help
            println!("Charon App Store Engine v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'charon --help' for usage information");
            Ok(())
        }
    }
}
