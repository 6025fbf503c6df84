// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn host_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("host")
            .long("host")
            .value_name("URL")
            .help("Custom catalog host"),
    )
    .arg(
        Arg::new("dev")
            .long("dev")
            .action(clap::ArgAction::SetTrue)
            .help("Use the development host (localhost)"),
    )
    .arg(
        Arg::new("platform_version")
            .long("platform-version")
            .value_name("VERSION")
            .default_value("1.0")
            .help("Running platform version"),
    )
}

fn root_arg(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("root")
            .short('r')
            .long("root")
            .value_name("PATH")
            .default_value("/var/lib/charon")
            .help("Store root directory"),
    )
}

fn build_cli() -> Command {
    Command::new("charon")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Charon Contributors")
        .about("App store installation engine")
        .subcommand_required(false)
        .subcommand(host_args(
            Command::new("list").about("List the remote catalog").arg(
                Arg::new("category")
                    .short('c')
                    .long("category")
                    .help("Only show packages in this category"),
            ),
        ))
        .subcommand(host_args(
            Command::new("show")
                .about("Show one catalog entry in detail")
                .arg(Arg::new("id").required(true).help("Package id")),
        ))
        .subcommand(root_arg(host_args(
            Command::new("install")
                .about("Install a package, or open it when already installed and up to date")
                .arg(Arg::new("id").required(true).help("Package id"))
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(clap::ArgAction::SetTrue)
                        .help("Reinstall even when already present"),
                )
                .arg(
                    Arg::new("yes")
                        .short('y')
                        .long("yes")
                        .action(clap::ArgAction::SetTrue)
                        .help("Confirm installing a package flagged as incompatible"),
                ),
        )))
        .subcommand(root_arg(host_args(
            Command::new("check")
                .about("Check whether an installed package has an update available")
                .arg(Arg::new("id").required(true).help("Package id")),
        )))
        .subcommand(root_arg(host_args(
            Command::new("uninstall")
                .about("Remove an installed package")
                .arg(Arg::new("id").required(true).help("Package id")),
        )))
        .subcommand(root_arg(host_args(
            Command::new("installed").about("List installed packages from the local manifest"),
        )))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("charon.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
